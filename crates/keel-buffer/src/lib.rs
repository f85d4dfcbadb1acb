//! Buffer pool for KeelDB.
//!
//! A fixed array of page frames fronted by a lock-free page table, with pin
//! counting and clock replacement. The pool never touches disk: cache misses
//! hand the caller a slot to fill, and evicting a dirty frame hands the
//! caller its bytes to write back.

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use page_table::PageTable;
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
pub use replacer::ClockReplacer;
