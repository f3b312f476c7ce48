use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

#[derive(Debug, Default)]
struct AccessHistory {
    /// Last k access timestamps, oldest first
    accesses: VecDeque<Timestamp>,
    evictable: bool,
}

impl AccessHistory {
    /// Eviction rank: frames with fewer than k accesses (infinite backward
    /// k-distance) come first, then the oldest k-th most recent access wins.
    fn rank(&self, k: usize) -> (bool, Timestamp) {
        let has_k = self.accesses.len() >= k;
        let oldest = self.accesses.front().copied().unwrap_or(0);
        (has_k, oldest)
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    now: Timestamp,
    frames: HashMap<FrameId, AccessHistory>,
    evictable: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the evictable frame with the largest backward k-distance. Frames
/// seen fewer than k times have infinite distance; ties among them go to the
/// earliest recorded access.
pub struct LruKReplacer {
    k: usize,
    capacity: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        assert!(k > 0, "LRU-K needs k >= 1");
        Self {
            k,
            capacity,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    /// Picks a victim, forgetting its history. `None` if nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.evictable == 0 {
            return None;
        }

        let victim = state
            .frames
            .iter()
            .filter(|(_, history)| history.evictable)
            .min_by_key(|(_, history)| history.rank(self.k))
            .map(|(frame_id, _)| *frame_id)?;

        state.frames.remove(&victim);
        state.evictable -= 1;
        Some(victim)
    }

    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }

        let mut state = self.state.lock();
        let now = state.now;
        state.now += 1;

        let history = state.frames.entry(frame_id).or_default();
        history.accesses.push_back(now);
        if history.accesses.len() > self.k {
            history.accesses.pop_front();
        }
    }

    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }

        let mut state = self.state.lock();
        let history = state.frames.entry(frame_id).or_default();
        if history.evictable == evictable {
            return;
        }
        history.evictable = evictable;

        if evictable {
            state.evictable += 1;
        } else {
            state.evictable -= 1;
        }
    }

    /// Drops a frame's history, e.g. when its page is deleted.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(history) = state.frames.remove(&frame_id) {
            if history.evictable {
                state.evictable -= 1;
            }
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_k_prefers_infinite_distance() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_largest_k_distance() {
        let replacer = LruKReplacer::new(2, 10);

        for frame in 0..3 {
            replacer.record_access(FrameId::new(frame));
            replacer.record_access(FrameId::new(frame));
            replacer.set_evictable(FrameId::new(frame), true);
        }
        // Two fresh touches push frame 0's k-th most recent access to the front
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_pinned_frames_are_skipped() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_remove() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(4));
        replacer.set_evictable(FrameId::new(4), true);
        replacer.remove(FrameId::new(4));

        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }
}
