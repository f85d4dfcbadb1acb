//! Forward scan over every record of a heap relation.

use crate::bufmgr::BufferManager;
use crate::heap::page::HeapPage;
use crate::rid::RecordId;
use bytes::Bytes;
use keel_common::page::PageNo;
use keel_common::Result;
use std::sync::Arc;

/// Iterates the records of a heap relation in (page, slot) order.
///
/// End of file is the `Ok(None)` return of [`HeapScan::next_record`]. Each
/// call pins at most one page and unpins it before returning, so the scan
/// holds no buffer resources between calls.
pub struct HeapScan {
    bufmgr: Arc<BufferManager>,
    file_id: u32,
    /// Page count captured when the scan started.
    num_pages: u32,
    current_page: PageNo,
    next_slot: u16,
}

impl HeapScan {
    /// Creates a scan positioned before the first record.
    pub fn new(bufmgr: Arc<BufferManager>, file_id: u32) -> Result<Self> {
        let num_pages = bufmgr.store().num_pages(file_id)?;
        Ok(Self {
            bufmgr,
            file_id,
            num_pages,
            current_page: 1,
            next_slot: 0,
        })
    }

    /// Returns the next record, or `None` once the relation is exhausted.
    pub fn next_record(&mut self) -> Result<Option<(RecordId, Bytes)>> {
        while self.current_page <= self.num_pages {
            let frame = self.bufmgr.read_page(self.file_id, self.current_page)?;
            let found = {
                let data = frame.read_data();
                let slot_count = HeapPage::slot_count(&**data);
                let mut found = None;
                while self.next_slot < slot_count {
                    let slot_no = self.next_slot;
                    self.next_slot += 1;
                    if let Some(record) = HeapPage::record(&**data, slot_no) {
                        found = Some((
                            RecordId::new(self.current_page, slot_no),
                            Bytes::copy_from_slice(record),
                        ));
                        break;
                    }
                }
                found
            };
            self.bufmgr
                .unpin_page(self.file_id, self.current_page, false)?;

            if found.is_some() {
                return Ok(found);
            }
            self.current_page += 1;
            self.next_slot = 0;
        }
        Ok(None)
    }
}
