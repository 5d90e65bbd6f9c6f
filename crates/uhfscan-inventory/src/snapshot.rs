// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Snapshot ("full scan") burst mode.
//!
//! A timer opens a collection window once per burst period. While a window is
//! open every accepted observation lands in a unique set keyed by identifier
//! (last writer wins, first-sighting order kept). At the deadline the set is
//! flushed as one batch.

use crate::observation::TagObservation;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uhfscan_config::SnapshotConfig;

/// Burst period for a requested scan rate, in milliseconds
pub fn burst_period_ms(scan_hz: Option<f64>, cfg: &SnapshotConfig) -> u64 {
    let hz = scan_hz.filter(|h| h.is_finite()).unwrap_or(cfg.default_hz);
    let hz = hz.clamp(cfg.min_hz, cfg.max_hz);
    let period = (1000.0 / hz).round() as u64;
    period.clamp(cfg.min_period_ms, cfg.max_period_ms)
}

/// Default window length for a burst period, in milliseconds
pub fn window_len_ms(period_ms: u64, cfg: &SnapshotConfig) -> u64 {
    let scaled = (period_ms as f64 * cfg.window_ratio) as u64;
    scaled.max(cfg.min_window_ms)
}

#[derive(Debug, Default)]
struct SnapshotWindow {
    deadline: Option<Instant>,
    order: Vec<String>,
    entries: AHashMap<String, TagObservation>,
}

impl SnapshotWindow {
    fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    fn reset(&mut self) {
        self.deadline = None;
        self.order.clear();
        self.entries.clear();
    }
}

pub struct SnapshotController {
    enabled: AtomicBool,
    period_ms: AtomicU64,
    min_window: Duration,
    window: Mutex<SnapshotWindow>,
}

impl SnapshotController {
    pub fn new(cfg: &SnapshotConfig) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            period_ms: AtomicU64::new(burst_period_ms(None, cfg)),
            min_window: Duration::from_millis(cfg.min_window_ms),
            window: Mutex::new(SnapshotWindow::default()),
        }
    }

    pub fn enable(&self, period_ms: u64) {
        self.period_ms.store(period_ms, Ordering::Relaxed);
        self.enabled.store(true, Ordering::Release);
    }

    /// Disable burst mode and discard any open window
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.window.lock().reset();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::Relaxed))
    }

    pub fn is_active(&self) -> bool {
        self.window.lock().is_active()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.window.lock().deadline
    }

    /// Open a window unless one is already open
    ///
    /// The length is raised to the configured minimum.
    pub fn begin_window(&self, len: Duration, now: Instant) -> bool {
        let mut window = self.window.lock();
        if window.is_active() {
            return false;
        }
        window.reset();
        window.deadline = Some(now + len.max(self.min_window));
        true
    }

    /// Capture `obs` if a window is open; otherwise hand it back
    pub fn offer(&self, obs: TagObservation) -> Option<TagObservation> {
        let mut window = self.window.lock();
        if !window.is_active() {
            return Some(obs);
        }
        let id = obs.identifier().to_string();
        if window.entries.insert(id.clone(), obs).is_none() {
            window.order.push(id);
        }
        None
    }

    /// Close the window if its deadline has passed
    ///
    /// # Returns
    /// The captured set in first-sighting order, or `None` if nothing was due
    pub fn flush_if_due(&self, now: Instant) -> Option<Vec<TagObservation>> {
        let mut window = self.window.lock();
        match window.deadline {
            Some(deadline) if now >= deadline => {
                let order = std::mem::take(&mut window.order);
                let mut entries = std::mem::take(&mut window.entries);
                window.reset();
                Some(order.into_iter().filter_map(|id| entries.remove(&id)).collect())
            }
            _ => None,
        }
    }

    pub fn captured(&self) -> usize {
        self.window.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(id: &str, rssi: i32) -> TagObservation {
        TagObservation::new(id, Some(rssi), -70, Instant::now()).unwrap()
    }

    const A: &str = "E2801160600002084D4BB3A1";
    const B: &str = "E2801160600002084D4BB3A2";

    #[test]
    fn test_period_clamping() {
        let cfg = SnapshotConfig::default();
        assert_eq!(burst_period_ms(Some(2.0), &cfg), 500);
        assert_eq!(burst_period_ms(None, &cfg), 1000);
        assert_eq!(burst_period_ms(Some(0.1), &cfg), 1000);
        // 4.5 Hz -> 222 ms; 10 Hz is clamped to 4.5 Hz first
        assert_eq!(burst_period_ms(Some(10.0), &cfg), 222);
        assert_eq!(burst_period_ms(Some(f64::NAN), &cfg), 1000);
    }

    #[test]
    fn test_window_length() {
        let cfg = SnapshotConfig::default();
        assert_eq!(window_len_ms(500, &cfg), 430);
        assert_eq!(window_len_ms(200, &cfg), 180);
    }

    #[test]
    fn test_unique_set_last_writer_wins_in_first_order() {
        let snap = SnapshotController::new(&SnapshotConfig::default());
        let t0 = Instant::now();
        assert!(snap.begin_window(Duration::from_millis(300), t0));
        assert!(!snap.begin_window(Duration::from_millis(300), t0));

        assert!(snap.offer(obs(B, -60)).is_none());
        assert!(snap.offer(obs(A, -60)).is_none());
        assert!(snap.offer(obs(B, -40)).is_none());
        assert_eq!(snap.captured(), 2);

        assert!(snap.flush_if_due(t0 + Duration::from_millis(100)).is_none());
        let batch = snap.flush_if_due(t0 + Duration::from_millis(300)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].identifier(), B);
        assert_eq!(batch[0].signal_raw(), -40);
        assert_eq!(batch[1].identifier(), A);
        assert!(!snap.is_active());
    }

    #[test]
    fn test_offer_without_window_returns_observation() {
        let snap = SnapshotController::new(&SnapshotConfig::default());
        assert!(snap.offer(obs(A, -50)).is_some());
    }

    #[test]
    fn test_short_window_raised_to_minimum() {
        let snap = SnapshotController::new(&SnapshotConfig::default());
        let t0 = Instant::now();
        snap.begin_window(Duration::from_millis(10), t0);
        assert_eq!(snap.deadline(), Some(t0 + Duration::from_millis(180)));
        snap.disable();
        assert!(!snap.is_active());
    }
}
