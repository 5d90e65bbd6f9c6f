// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ordered backlog of observations awaiting delivery.
//!
//! Bounded FIFO. When a push takes it over capacity the oldest half of the
//! capacity is discarded in one step, so overflow costs one drain rather than
//! one eviction per observation.

use crate::observation::TagObservation;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug)]
pub struct Backlog {
    queue: Mutex<VecDeque<TagObservation>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(2),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an observation
    ///
    /// # Returns
    /// Queue depth after the push (and after any overflow trim)
    pub fn push(&self, obs: TagObservation) -> usize {
        let mut queue = self.queue.lock();
        queue.push_back(obs);
        if queue.len() > self.capacity {
            let discard = self.capacity / 2;
            queue.drain(..discard);
            let total = self.dropped.fetch_add(discard as u64, Ordering::Relaxed) + discard as u64;
            warn!(
                "[UHF-BACKLOG] Overflow at {} - discarded {} oldest (total dropped {})",
                self.capacity, discard, total
            );
        }
        queue.len()
    }

    /// Remove up to `max` observations from the front
    pub fn take(&self, max: usize) -> Vec<TagObservation> {
        let mut queue = self.queue.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn drain_all(&self) -> Vec<TagObservation> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Observations discarded by overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Instant;

    fn obs(i: usize) -> TagObservation {
        TagObservation::new(&format!("E28011606000020800{:06X}", i), None, -70, Instant::now()).unwrap()
    }

    #[test]
    fn test_take_preserves_fifo() {
        let backlog = Backlog::new(16);
        for i in 0..5 {
            backlog.push(obs(i));
        }
        let first = backlog.take(3);
        assert_eq!(first[0].identifier(), obs(0).identifier());
        assert_eq!(first[2].identifier(), obs(2).identifier());
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.take(10).len(), 2);
        assert!(backlog.is_empty());
    }

    #[test]
    fn test_overflow_discards_oldest_half() {
        let backlog = Backlog::new(10);
        for i in 0..10 {
            assert_eq!(backlog.push(obs(i)), i + 1);
        }
        assert_eq!(backlog.push(obs(10)), 6);
        assert_eq!(backlog.dropped(), 5);
        let rest = backlog.drain_all();
        assert_eq!(rest[0].identifier(), obs(5).identifier());
        assert_eq!(rest[5].identifier(), obs(10).identifier());
    }

    proptest! {
        #[test]
        fn prop_overflow_keeps_newest_in_order(capacity in 2usize..64, extra in 1usize..64) {
            let backlog = Backlog::new(capacity);
            let total = capacity + extra;
            for i in 0..total {
                backlog.push(obs(i));
            }
            let kept = backlog.drain_all();
            prop_assert!(kept.len() <= capacity);
            // survivors are the newest contiguous run, oldest first
            let first = total - kept.len();
            for (offset, o) in kept.iter().enumerate() {
                let expected = obs(first + offset);
                prop_assert_eq!(o.identifier(), expected.identifier());
            }
            prop_assert_eq!(backlog.dropped() as usize, total - kept.len());
        }
    }
}
