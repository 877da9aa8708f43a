use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::FrameId;

/// LRU replacement policy over unpinned frames.
///
/// Frames are kept in recency order: the front holds the most recently
/// unpinned frame and the back the least recently unpinned one, which is the
/// eviction victim. Only frames whose pin count has dropped to zero are
/// members; pinning a frame removes it from consideration.
pub struct LruReplacer {
    /// Maximum number of frames the replacer can track (the pool size)
    max_frames: usize,
    /// Recency list, front = most recently unpinned
    frames: Mutex<VecDeque<FrameId>>,
}

impl LruReplacer {
    /// Creates a new replacer able to track up to `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            max_frames: num_frames,
            frames: Mutex::new(VecDeque::with_capacity(num_frames)),
        }
    }

    /// Removes and returns the least recently unpinned frame.
    /// Returns None when no frame is evictable.
    pub fn victim(&self) -> Option<FrameId> {
        self.frames.lock().pop_back()
    }

    /// Removes the frame from the replacer. Called when a client starts
    /// using a frame; a no-op when the frame is not tracked.
    pub fn pin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        if let Some(pos) = frames.iter().position(|&f| f == frame_id) {
            frames.remove(pos);
        }
    }

    /// Inserts the frame at the front of the recency list. Called when a
    /// frame's pin count drops to zero. A no-op when already tracked; when
    /// at capacity, the victim at the back is dropped first.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        if frames.iter().any(|&f| f == frame_id) {
            return;
        }
        if frames.len() == self.max_frames {
            frames.pop_back();
        }
        frames.push_front(frame_id);
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.frames.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_empty() {
        let replacer = LruReplacer::new(10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(3));
        assert_eq!(replacer.size(), 3);

        // The earliest unpinned frame is evicted first
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_removes() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(3));

        replacer.pin(FrameId::new(2));
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    }

    #[test]
    fn test_lru_replacer_pin_absent_is_noop() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(1));
        replacer.pin(FrameId::new(7));
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_lru_replacer_unpin_twice_keeps_position() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        // Frame 1 is already tracked; its recency must not change
        replacer.unpin(FrameId::new(1));

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_replacer_capacity_evicts_tail() {
        let replacer = LruReplacer::new(3);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(3));

        // At capacity: unpinning a fourth frame drops the oldest
        replacer.unpin(FrameId::new(4));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
        assert_eq!(replacer.victim(), Some(FrameId::new(4)));
    }
}
