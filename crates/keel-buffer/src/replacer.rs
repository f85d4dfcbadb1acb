//! Clock page replacement for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock (second-chance) replacement over the pool's frames.
///
/// Each frame has a reference bit set on access. The clock hand sweeps the
/// frame array; a frame with its bit set gets a second chance (the bit is
/// cleared), a frame with its bit clear that the caller's predicate accepts
/// becomes the victim. The predicate is how the pool excludes pinned and
/// empty frames without the replacer tracking pin state itself.
pub struct ClockReplacer {
    num_frames: usize,
    /// Reference bits for each frame (atomic for lock-free access recording).
    reference_bits: Vec<AtomicBool>,
    /// Current clock hand position.
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a clock replacer covering the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: (0..num_frames).map(|_| AtomicBool::new(false)).collect(),
            clock_hand: Mutex::new(0),
        }
    }

    /// Records that the given frame was accessed, granting it a second chance.
    #[inline]
    pub fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    /// Forgets a frame's access history (used when a frame is recycled).
    #[inline]
    pub fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }

    /// Selects a victim frame among those the predicate accepts.
    ///
    /// Returns None if no candidate frame is acceptable.
    pub fn evict<F>(&self, can_evict: F) -> Option<FrameId>
    where
        F: Fn(FrameId) -> bool,
    {
        if self.num_frames == 0 {
            return None;
        }

        let mut hand = self.clock_hand.lock();

        // Two full rotations: the first may only clear reference bits.
        for _ in 0..(2 * self.num_frames) {
            let frame_id = FrameId(*hand as u32);
            let candidate = can_evict(frame_id);

            if candidate && !self.reference_bits[*hand].load(Ordering::Relaxed) {
                *hand = (*hand + 1) % self.num_frames;
                return Some(frame_id);
            }
            if candidate {
                self.reference_bits[*hand].store(false, Ordering::Relaxed);
            }
            *hand = (*hand + 1) % self.num_frames;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_none_acceptable() {
        let replacer = ClockReplacer::new(4);
        assert_eq!(replacer.evict(|_| false), None);
    }

    #[test]
    fn test_evict_single_candidate() {
        let replacer = ClockReplacer::new(4);
        let victim = replacer.evict(|f| f == FrameId(2));
        assert_eq!(victim, Some(FrameId(2)));
    }

    #[test]
    fn test_second_chance() {
        let replacer = ClockReplacer::new(3);

        // Frame 0 was recently accessed, frames 1 and 2 were not
        replacer.record_access(FrameId(0));

        let victim = replacer.evict(|_| true);
        assert_eq!(victim, Some(FrameId(1)));
    }

    #[test]
    fn test_all_referenced_still_evicts() {
        let replacer = ClockReplacer::new(3);
        for i in 0..3 {
            replacer.record_access(FrameId(i));
        }

        // Second rotation finds a victim after bits are cleared
        assert!(replacer.evict(|_| true).is_some());
    }

    #[test]
    fn test_remove_clears_history() {
        let replacer = ClockReplacer::new(2);
        replacer.record_access(FrameId(0));
        replacer.remove(FrameId(0));

        let victim = replacer.evict(|f| f == FrameId(0));
        assert_eq!(victim, Some(FrameId(0)));
    }

    #[test]
    fn test_hand_advances_between_evictions() {
        let replacer = ClockReplacer::new(4);
        let first = replacer.evict(|_| true).unwrap();
        let second = replacer.evict(|_| true).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_out_of_bounds_access_ignored() {
        let replacer = ClockReplacer::new(2);
        replacer.record_access(FrameId(100));
        replacer.remove(FrameId(100));
    }
}
