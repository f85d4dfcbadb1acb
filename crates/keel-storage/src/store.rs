//! Paged file store: named files of fixed-size pages.

use keel_common::page::{PageNo, PAGE_SIZE};
use keel_common::{KeelError, Result, StorageConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Manages named page files under a data directory.
///
/// Every file is a sequence of `PAGE_SIZE` pages numbered from 1; page 0 is
/// never allocated. Open handles are cached and keyed by a store-assigned
/// file id, so opening the same name twice yields the same id.
pub struct FileStore {
    config: StorageConfig,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    files: HashMap<u32, FileHandle>,
    ids_by_name: HashMap<String, u32>,
    next_file_id: u32,
}

/// Handle for an open page file.
struct FileHandle {
    file: File,
    name: String,
    /// Number of pages currently in the file.
    num_pages: u32,
}

impl FileStore {
    /// Creates a file store rooted at the configured data directory.
    pub fn new(config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            config,
            inner: Mutex::new(StoreInner {
                files: HashMap::new(),
                ids_by_name: HashMap::new(),
                next_file_id: 0,
            }),
        })
    }

    /// Returns the storage configuration this store was built from.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    /// Returns true if a file with this name exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn register(&self, inner: &mut StoreInner, file: File, name: &str) -> Result<u32> {
        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let file_id = inner.next_file_id;
        inner.next_file_id += 1;
        inner.files.insert(
            file_id,
            FileHandle {
                file,
                name: name.to_string(),
                num_pages,
            },
        );
        inner.ids_by_name.insert(name.to_string(), file_id);
        Ok(file_id)
    }

    /// Creates a new, empty page file. Fails if the name already exists.
    pub fn create(&self, name: &str) -> Result<u32> {
        let path = self.file_path(name);
        if path.exists() {
            return Err(KeelError::FileExists {
                name: name.to_string(),
            });
        }

        let mut inner = self.inner.lock();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        self.register(&mut inner, file, name)
    }

    /// Opens an existing page file. Fails with `FileNotFound` if absent.
    pub fn open(&self, name: &str) -> Result<u32> {
        let mut inner = self.inner.lock();
        if let Some(&file_id) = inner.ids_by_name.get(name) {
            return Ok(file_id);
        }

        let path = self.file_path(name);
        if !path.exists() {
            return Err(KeelError::FileNotFound {
                name: name.to_string(),
            });
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        self.register(&mut inner, file, name)
    }

    /// Syncs and closes an open file.
    pub fn close(&self, file_id: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.files.remove(&file_id) {
            inner.ids_by_name.remove(&handle.name);
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Deletes a file, closing it first if open.
    pub fn delete(&self, name: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if let Some(file_id) = inner.ids_by_name.remove(name) {
                inner.files.remove(&file_id);
            }
        }
        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn with_handle<T>(
        &self,
        file_id: u32,
        f: impl FnOnce(&mut FileHandle) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(&file_id)
            .ok_or(KeelError::FileNotOpen { file_id })?;
        f(handle)
    }

    /// Reads one page. Page numbers are 1-based.
    pub fn read_page(&self, file_id: u32, page_no: PageNo) -> Result<[u8; PAGE_SIZE]> {
        self.with_handle(file_id, |handle| {
            if page_no == 0 || page_no > handle.num_pages {
                return Err(KeelError::PageOutOfBounds { file_id, page_no });
            }
            let offset = (page_no as u64 - 1) * PAGE_SIZE as u64;
            handle.file.seek(SeekFrom::Start(offset))?;

            let mut buffer = [0u8; PAGE_SIZE];
            handle.file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
    }

    /// Writes one previously allocated page.
    pub fn write_page(&self, file_id: u32, page_no: PageNo, data: &[u8]) -> Result<()> {
        let fsync = self.config.fsync_enabled;
        self.with_handle(file_id, |handle| {
            if page_no == 0 || page_no > handle.num_pages {
                return Err(KeelError::PageOutOfBounds { file_id, page_no });
            }
            let offset = (page_no as u64 - 1) * PAGE_SIZE as u64;
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.write_all(&data[..PAGE_SIZE.min(data.len())])?;
            if fsync {
                handle.file.sync_all()?;
            }
            Ok(())
        })
    }

    /// Extends the file by one zeroed page and returns its page number.
    pub fn allocate_page(&self, file_id: u32) -> Result<PageNo> {
        let fsync = self.config.fsync_enabled;
        self.with_handle(file_id, |handle| {
            let page_no = handle.num_pages + 1;
            let offset = (page_no as u64 - 1) * PAGE_SIZE as u64;
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.write_all(&[0u8; PAGE_SIZE])?;
            if fsync {
                handle.file.sync_all()?;
            }
            handle.num_pages = page_no;
            Ok(page_no)
        })
    }

    /// Returns the header page number of a non-empty file.
    pub fn first_page_no(&self, file_id: u32) -> Result<PageNo> {
        self.with_handle(file_id, |handle| {
            if handle.num_pages == 0 {
                return Err(KeelError::PageOutOfBounds { file_id, page_no: 1 });
            }
            Ok(1)
        })
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file_id: u32) -> Result<u32> {
        self.with_handle(file_id, |handle| Ok(handle.num_pages))
    }

    /// Flushes a file's OS buffers to disk.
    pub fn sync(&self, file_id: u32) -> Result<()> {
        self.with_handle(file_id, |handle| {
            handle.file.sync_all()?;
            Ok(())
        })
    }

    /// Syncs and closes all open files.
    pub fn close_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ids_by_name.clear();
        for (_, handle) in inner.files.drain() {
            handle.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
            ..Default::default()
        };
        (FileStore::new(config).unwrap(), dir)
    }

    #[test]
    fn test_create_open_same_id() {
        let (store, _dir) = test_store();

        let id = store.create("rel").unwrap();
        assert_eq!(store.open("rel").unwrap(), id);
        assert!(store.exists("rel"));
    }

    #[test]
    fn test_create_existing_fails() {
        let (store, _dir) = test_store();
        store.create("rel").unwrap();
        assert!(matches!(
            store.create("rel"),
            Err(KeelError::FileExists { .. })
        ));
    }

    #[test]
    fn test_open_missing_fails() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.open("nope"),
            Err(KeelError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_allocate_and_rw_pages() {
        let (store, _dir) = test_store();
        let id = store.create("rel").unwrap();

        assert_eq!(store.allocate_page(id).unwrap(), 1);
        assert_eq!(store.allocate_page(id).unwrap(), 2);
        assert_eq!(store.num_pages(id).unwrap(), 2);

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xEF;
        store.write_page(id, 2, &data).unwrap();

        let read = store.read_page(id, 2).unwrap();
        assert_eq!(read[0], 0xAB);
        assert_eq!(read[PAGE_SIZE - 1], 0xEF);

        // Freshly allocated pages come back zeroed
        assert!(store.read_page(id, 1).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_bounds() {
        let (store, _dir) = test_store();
        let id = store.create("rel").unwrap();
        store.allocate_page(id).unwrap();

        assert!(matches!(
            store.read_page(id, 0),
            Err(KeelError::PageOutOfBounds { .. })
        ));
        assert!(matches!(
            store.read_page(id, 2),
            Err(KeelError::PageOutOfBounds { .. })
        ));
        assert!(matches!(
            store.write_page(id, 2, &[0u8; PAGE_SIZE]),
            Err(KeelError::PageOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_first_page_no() {
        let (store, _dir) = test_store();
        let id = store.create("rel").unwrap();

        assert!(store.first_page_no(id).is_err());
        store.allocate_page(id).unwrap();
        assert_eq!(store.first_page_no(id).unwrap(), 1);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: true,
            ..Default::default()
        };

        {
            let store = FileStore::new(config.clone()).unwrap();
            let id = store.create("rel").unwrap();
            let page_no = store.allocate_page(id).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[7] = 0x42;
            store.write_page(id, page_no, &data).unwrap();
            store.close(id).unwrap();
        }

        let store = FileStore::new(config).unwrap();
        let id = store.open("rel").unwrap();
        assert_eq!(store.num_pages(id).unwrap(), 1);
        assert_eq!(store.read_page(id, 1).unwrap()[7], 0x42);
    }

    #[test]
    fn test_close_invalidates_id() {
        let (store, _dir) = test_store();
        let id = store.create("rel").unwrap();
        store.close(id).unwrap();

        assert!(matches!(
            store.num_pages(id),
            Err(KeelError::FileNotOpen { .. })
        ));

        // Reopening assigns a fresh id
        let id2 = store.open("rel").unwrap();
        assert_ne!(id, id2);
    }

    #[test]
    fn test_delete() {
        let (store, _dir) = test_store();
        store.create("rel").unwrap();
        store.delete("rel").unwrap();
        assert!(!store.exists("rel"));
        assert!(store.open("rel").is_err());
    }
}
