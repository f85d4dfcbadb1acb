//! Page table mapping resident page IDs to buffer frames.

use crate::frame::FrameId;
use keel_common::page::PageId;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Sentinel value for empty slots.
const EMPTY_KEY: u64 = u64::MAX;

/// Sentinel value for deleted slots (tombstone).
const TOMBSTONE_KEY: u64 = u64::MAX - 1;

/// Sentinel frame value for empty slots.
const EMPTY_FRAME: u32 = u32::MAX;

/// Open-addressing hash table from PageId to FrameId.
///
/// Keys and values live in parallel atomic arrays probed linearly, so reads
/// never take a lock. Removal leaves a tombstone to keep probe chains intact.
/// Sized at twice the frame count, the table never fills.
pub struct PageTable {
    keys: Box<[AtomicU64]>,
    values: Box<[AtomicU32]>,
    /// Bitmask for table indexing (capacity - 1).
    mask: usize,
}

impl PageTable {
    /// Creates a page table with room for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        // Next power of 2, 2x capacity for ~50% load factor
        let capacity = (num_frames * 2).next_power_of_two().max(64);

        let keys: Box<[AtomicU64]> = (0..capacity).map(|_| AtomicU64::new(EMPTY_KEY)).collect();
        let values: Box<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(EMPTY_FRAME)).collect();

        Self {
            keys,
            values,
            mask: capacity - 1,
        }
    }

    #[inline(always)]
    fn slot_of(&self, key: u64) -> usize {
        // Fibonacci-style multiply for distribution
        let hash = key.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        (hash as usize) & self.mask
    }

    /// Looks up a page ID and returns its frame ID if resident.
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        let key = page_id.as_u64();
        let mut idx = self.slot_of(key);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == key {
                return Some(FrameId(self.values[idx].load(Ordering::Acquire)));
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Inserts or updates a mapping. Returns false if the table is full.
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) -> bool {
        let key = page_id.as_u64();
        let mut idx = self.slot_of(key);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY || stored == TOMBSTONE_KEY {
                self.values[idx].store(frame_id.0, Ordering::Release);
                self.keys[idx].store(key, Ordering::Release);
                return true;
            }
            if stored == key {
                self.values[idx].store(frame_id.0, Ordering::Release);
                return true;
            }
            idx = (idx + 1) & self.mask;
        }
        false
    }

    /// Removes a mapping. Returns the frame ID if it was present.
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        let key = page_id.as_u64();
        let mut idx = self.slot_of(key);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == key {
                let frame_id = self.values[idx].load(Ordering::Acquire);
                self.keys[idx].store(TOMBSTONE_KEY, Ordering::Release);
                return Some(FrameId(frame_id));
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Returns true if the page ID is in the table.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.get(page_id).is_some()
    }

    /// Returns the number of live entries in the table.
    pub fn len(&self) -> usize {
        self.keys
            .iter()
            .filter(|slot| {
                let key = slot.load(Ordering::Relaxed);
                key != EMPTY_KEY && key != TOMBSTONE_KEY
            })
            .count()
    }

    /// Returns true if the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all live entries. Returns early if `f` returns false.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageId, FrameId) -> bool,
    {
        for (idx, slot) in self.keys.iter().enumerate() {
            let key = slot.load(Ordering::Relaxed);
            if key != EMPTY_KEY && key != TOMBSTONE_KEY {
                let frame_id = FrameId(self.values[idx].load(Ordering::Relaxed));
                if !f(PageId::from_u64(key), frame_id) {
                    return;
                }
            }
        }
    }
}
