// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use ahash::AHashMap;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Short-window repeat suppression over a bounded LRU of identifiers
///
/// Eviction is by access order only; it has nothing to do with the debounce
/// window.
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    capacity: usize,
    last_seen: AHashMap<String, (Instant, u64)>,
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl DedupCache {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            last_seen: AHashMap::with_capacity(capacity.min(4096)),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    fn touch(&mut self, identifier: &str) {
        self.tick += 1;
        let tick = self.tick;
        if let Some((_, t)) = self.last_seen.get_mut(identifier) {
            self.recency.remove(t);
            *t = tick;
            self.recency.insert(tick, identifier.to_string());
        }
    }

    /// True if `identifier` was recorded less than one window before `now`
    pub fn should_suppress(&mut self, identifier: &str, now: Instant) -> bool {
        let Some((seen, _)) = self.last_seen.get(identifier).copied() else {
            return false;
        };
        self.touch(identifier);
        now.saturating_duration_since(seen) < self.window
    }

    /// Record a sighting, evicting the least recently used entry if full
    pub fn record(&mut self, identifier: &str, now: Instant) {
        if let Some((seen, _)) = self.last_seen.get_mut(identifier) {
            *seen = now;
            self.touch(identifier);
            return;
        }

        self.tick += 1;
        self.last_seen.insert(identifier.to_string(), (now, self.tick));
        self.recency.insert(self.tick, identifier.to_string());

        while self.last_seen.len() > self.capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.last_seen.remove(&oldest);
        }
    }

    /// Suppress-or-record in one step
    ///
    /// # Returns
    /// `true` if the sighting is new enough to pass
    pub fn admit(&mut self, identifier: &str, now: Instant) -> bool {
        if self.should_suppress(identifier, now) {
            return false;
        }
        self.record(identifier, now);
        true
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
        self.recency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "E2801160600002084D4BB3A1";
    const B: &str = "E2801160600002084D4BB3A2";
    const C: &str = "E2801160600002084D4BB3A3";

    #[test]
    fn test_repeat_within_window_suppressed() {
        let mut cache = DedupCache::new(Duration::from_millis(4), 16);
        let t0 = Instant::now();
        assert!(cache.admit(A, t0));
        assert!(!cache.admit(A, t0 + Duration::from_millis(2)));
        // window measured from the last admitted sighting
        assert!(cache.admit(A, t0 + Duration::from_millis(4)));
        assert!(cache.admit(B, t0 + Duration::from_millis(4)));
    }

    #[test]
    fn test_lru_eviction_respects_access_order() {
        let mut cache = DedupCache::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        cache.record(A, t0);
        cache.record(B, t0);
        // touching A makes B the eviction candidate
        assert!(cache.should_suppress(A, t0));
        cache.record(C, t0);

        assert_eq!(cache.len(), 2);
        assert!(cache.should_suppress(A, t0));
        assert!(!cache.should_suppress(B, t0));
        assert!(cache.should_suppress(C, t0));
    }

    #[test]
    fn test_clear() {
        let mut cache = DedupCache::new(Duration::from_millis(4), 8);
        cache.record(A, Instant::now());
        cache.clear();
        assert!(cache.is_empty());
    }
}
