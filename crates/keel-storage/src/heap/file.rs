//! Heap relation files: append-only record storage over the buffer manager.

use crate::bufmgr::BufferManager;
use crate::heap::page::HeapPage;
use crate::heap::scan::HeapScan;
use crate::rid::RecordId;
use bytes::Bytes;
use keel_common::{KeelError, Result};
use std::sync::Arc;

/// A named heap relation of variable-length records.
///
/// Records are appended to the last page until it fills, then a new page is
/// allocated. Every page access pins through the buffer manager and unpins
/// on all exits.
pub struct HeapFile {
    bufmgr: Arc<BufferManager>,
    file_id: u32,
    name: String,
}

impl HeapFile {
    /// Creates a new, empty heap relation.
    pub fn create(bufmgr: Arc<BufferManager>, name: &str) -> Result<Self> {
        let file_id = bufmgr.store().create(name)?;
        Ok(Self {
            bufmgr,
            file_id,
            name: name.to_string(),
        })
    }

    /// Opens an existing heap relation.
    pub fn open(bufmgr: Arc<BufferManager>, name: &str) -> Result<Self> {
        let file_id = bufmgr.store().open(name)?;
        Ok(Self {
            bufmgr,
            file_id,
            name: name.to_string(),
        })
    }

    /// Returns the store file id of this relation.
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of pages in the relation.
    pub fn num_pages(&self) -> Result<u32> {
        self.bufmgr.store().num_pages(self.file_id)
    }

    /// Appends a record and returns its id.
    pub fn append(&self, record: &[u8]) -> Result<RecordId> {
        if record.len() > HeapPage::MAX_RECORD_SIZE {
            return Err(KeelError::RecordTooLarge {
                size: record.len(),
                max: HeapPage::MAX_RECORD_SIZE,
            });
        }

        // Try the last page first
        let num_pages = self.num_pages()?;
        if num_pages > 0 {
            let page_no = num_pages;
            let frame = self.bufmgr.read_page(self.file_id, page_no)?;
            let slot = {
                let mut data = frame.write_data();
                HeapPage::insert_record(&mut **data, record)
            };
            match slot {
                Some(slot_no) => {
                    self.bufmgr.unpin_page(self.file_id, page_no, true)?;
                    return Ok(RecordId::new(page_no, slot_no));
                }
                None => self.bufmgr.unpin_page(self.file_id, page_no, false)?,
            }
        }

        // Last page full (or file empty): start a fresh one
        let (page_no, frame) = self.bufmgr.alloc_page(self.file_id)?;
        let slot = {
            let mut data = frame.write_data();
            HeapPage::insert_record(&mut **data, record)
        };
        match slot {
            Some(slot_no) => {
                self.bufmgr.unpin_page(self.file_id, page_no, true)?;
                Ok(RecordId::new(page_no, slot_no))
            }
            None => {
                self.bufmgr.unpin_page(self.file_id, page_no, false)?;
                Err(KeelError::RecordTooLarge {
                    size: record.len(),
                    max: HeapPage::MAX_RECORD_SIZE,
                })
            }
        }
    }

    /// Fetches the record with the given id.
    pub fn record(&self, rid: RecordId) -> Result<Bytes> {
        if rid.is_empty() || rid.page_no > self.num_pages()? {
            return Err(KeelError::RecordNotFound {
                rid: rid.to_string(),
            });
        }

        let frame = self.bufmgr.read_page(self.file_id, rid.page_no)?;
        let record = {
            let data = frame.read_data();
            HeapPage::record(&**data, rid.slot_no).map(Bytes::copy_from_slice)
        };
        self.bufmgr.unpin_page(self.file_id, rid.page_no, false)?;

        record.ok_or(KeelError::RecordNotFound {
            rid: rid.to_string(),
        })
    }

    /// Starts a forward scan over every record in the relation.
    pub fn scan(&self) -> Result<HeapScan> {
        HeapScan::new(Arc::clone(&self.bufmgr), self.file_id)
    }

    /// Flushes the relation's dirty pages to disk.
    pub fn flush(&self) -> Result<usize> {
        self.bufmgr.flush_file(self.file_id)
    }
}
