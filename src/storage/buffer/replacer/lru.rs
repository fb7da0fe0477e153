use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// Strict LRU page replacement policy.
///
/// Unpinned frames are kept in unpin order: the front of the map is the frame
/// that has gone unused the longest and is the next eviction victim. Pinned
/// frames are not tracked at all.
pub struct LruReplacer {
    frames: Mutex<LinkedHashMap<FrameId, ()>>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(LinkedHashMap::with_capacity(capacity)),
            capacity,
        }
    }

    /// Evict the least recently unpinned frame, if any
    pub fn victim(&self) -> Option<FrameId> {
        self.frames.lock().pop_front().map(|(frame_id, ())| frame_id)
    }

    /// Remove a frame from the eviction candidates; no-op if it is not one
    pub fn pin(&self, frame_id: FrameId) {
        self.frames.lock().remove(&frame_id);
    }

    /// Make a frame an eviction candidate; no-op if it already is one
    pub fn unpin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        if !frames.contains_key(&frame_id) {
            frames.insert(frame_id, ());
            debug_assert!(frames.len() <= self.capacity);
        }
    }

    /// Number of frames currently eligible for eviction
    pub fn size(&self) -> usize {
        self.frames.lock().len()
    }
}
