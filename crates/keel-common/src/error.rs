//! Error types for KeelDB.

use thiserror::Error;

/// Result type alias using KeelError.
pub type Result<T> = std::result::Result<T, KeelError>;

/// Errors that can occur in KeelDB operations.
#[derive(Debug, Error)]
pub enum KeelError {
    // I/O and file store errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {name}")]
    FileNotFound { name: String },

    #[error("File already exists: {name}")]
    FileExists { name: String },

    #[error("File {file_id} is not open")]
    FileNotOpen { file_id: u32 },

    #[error("Page {page_no} does not exist in file {file_id}")]
    PageOutOfBounds { file_id: u32, page_no: u32 },

    #[error("Name too long: '{name}' ({max} bytes max)")]
    NameTooLong { name: String, max: usize },

    // Buffer manager errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Page {page_no} is not in the buffer pool")]
    PageNotCached { page_no: u32 },

    #[error("Page {page_no} is not pinned")]
    PageNotPinned { page_no: u32 },

    // Heap file errors
    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Record not found: {rid}")]
    RecordNotFound { rid: String },

    // Index errors
    #[error("Index metadata mismatch: {0}")]
    BadIndexInfo(String),

    #[error("Invalid scan operators: lower bound takes GT/GTE, upper bound takes LT/LTE")]
    BadOpcodes,

    #[error("Invalid scan range: lower bound exceeds upper bound")]
    BadScanRange,

    #[error("No key in the index satisfies the scan bounds")]
    NoSuchKeyFound,

    #[error("No scan has been initialized")]
    ScanNotInitialized,

    #[error("Index scan has reached the end")]
    IndexScanCompleted,

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
