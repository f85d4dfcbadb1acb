//! Configuration structures for KeelDB storage.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration shared by the file store and the buffer manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data and index files.
    pub data_dir: PathBuf,
    /// Buffer pool size in number of page frames.
    pub buffer_pool_frames: usize,
    /// Enable fsync after writes for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_pool_frames: 1024, // 8 MB with 8 KB pages
            fsync_enabled: true,
        }
    }
}
