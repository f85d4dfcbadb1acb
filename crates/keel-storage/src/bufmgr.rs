//! Buffer manager: the pool composed with the file store.
//!
//! The pool itself performs no I/O; this layer fills cache misses from the
//! store, writes back pages the pool evicts, and enforces the pin protocol
//! errors (`PageNotCached`, `PageNotPinned`) that callers rely on.

use crate::store::FileStore;
use keel_buffer::{BufferFrame, BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
use keel_common::page::{PageId, PageNo};
use keel_common::{KeelError, Result};
use std::sync::Arc;

/// Pin-granting page cache over the file store.
pub struct BufferManager {
    pool: BufferPool,
    store: Arc<FileStore>,
}

impl BufferManager {
    /// Creates a buffer manager over the given store.
    ///
    /// The pool is sized from the store's `StorageConfig`
    /// (`buffer_pool_frames`), so the one config drives both layers.
    pub fn new(store: Arc<FileStore>) -> Self {
        let config = BufferPoolConfig {
            num_frames: store.config().buffer_pool_frames,
        };
        Self {
            pool: BufferPool::new(config),
            store,
        }
    }

    /// Returns the underlying file store.
    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    fn write_back(&self, evicted: Option<EvictedPage>) -> Result<()> {
        if let Some(page) = evicted {
            self.store
                .write_page(page.page_id.file_id, page.page_id.page_no, &*page.data)?;
        }
        Ok(())
    }

    /// Pins a page and returns its frame, reading it from disk on a miss.
    pub fn read_page(&self, file_id: u32, page_no: PageNo) -> Result<&BufferFrame> {
        let page_id = PageId::new(file_id, page_no);
        if let Some(frame) = self.pool.fetch_page(page_id) {
            return Ok(frame);
        }

        let bytes = self.store.read_page(file_id, page_no)?;
        let (frame, evicted) = self.pool.install_page(page_id, Some(&bytes))?;
        if let Err(e) = self.write_back(evicted) {
            self.pool.unpin(page_id, false);
            return Err(e);
        }
        Ok(frame)
    }

    /// Allocates a fresh page at the end of the file and pins it, zeroed.
    pub fn alloc_page(&self, file_id: u32) -> Result<(PageNo, &BufferFrame)> {
        let page_no = self.store.allocate_page(file_id)?;
        let page_id = PageId::new(file_id, page_no);

        let (frame, evicted) = self.pool.install_page(page_id, None)?;
        if let Err(e) = self.write_back(evicted) {
            self.pool.unpin(page_id, false);
            return Err(e);
        }
        Ok((page_no, frame))
    }

    /// Releases one pin on a page, ORing in the dirty bit.
    ///
    /// `PageNotCached` if the page is not resident, `PageNotPinned` if its
    /// pin count is already zero.
    pub fn unpin_page(&self, file_id: u32, page_no: PageNo, dirty: bool) -> Result<()> {
        let page_id = PageId::new(file_id, page_no);
        let frame = self
            .pool
            .frame(page_id)
            .ok_or(KeelError::PageNotCached { page_no })?;
        if frame.pin_count() == 0 {
            return Err(KeelError::PageNotPinned { page_no });
        }
        if dirty {
            frame.set_dirty(true);
        }
        frame.unpin();
        Ok(())
    }

    /// Writes every dirty resident page of a file and syncs it.
    ///
    /// Returns the number of pages written.
    pub fn flush_file(&self, file_id: u32) -> Result<usize> {
        let flushed = self.pool.flush_file(file_id, |page_id, data| {
            self.store.write_page(page_id.file_id, page_id.page_no, data)
        })?;
        self.store.sync(file_id)?;
        Ok(flushed)
    }

    /// Counts resident pages of a file that are currently pinned.
    pub fn pinned_pages(&self, file_id: u32) -> usize {
        self.pool.pinned_pages(file_id)
    }

    /// Returns buffer pool statistics.
    pub fn pool_stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }
}
