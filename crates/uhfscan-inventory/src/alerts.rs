// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uhfscan_config::AlertConfig;

/// User-facing feedback channel for delivered batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Beep,
    Vibrate,
}

/// Device that actually beeps or vibrates
pub trait AlertSink: Send + Sync {
    fn beep(&self);
    fn vibrate(&self, duration: Duration);
}

struct Channel {
    enabled: AtomicBool,
    min_gap: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl Channel {
    fn new(min_gap: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            min_gap,
            last_fired: Mutex::new(None),
        }
    }

    /// Claim the channel if enabled and the gap has elapsed
    fn claim(&self, now: Instant) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return false;
        }
        let mut last = self.last_fired.lock();
        if let Some(t) = *last {
            if now.saturating_duration_since(t) < self.min_gap {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

/// Paces alerts; both channels start disabled
pub struct AlertGate {
    beep: Channel,
    vibrate: Channel,
    vibrate_duration: Duration,
    sink: Mutex<Option<Arc<dyn AlertSink>>>,
}

impl AlertGate {
    pub fn new(cfg: &AlertConfig) -> Self {
        Self {
            beep: Channel::new(Duration::from_millis(cfg.beep_gap_ms)),
            vibrate: Channel::new(Duration::from_millis(cfg.vibrate_gap_ms)),
            vibrate_duration: Duration::from_millis(cfg.vibrate_duration_ms),
            sink: Mutex::new(None),
        }
    }

    fn channel(&self, kind: AlertKind) -> &Channel {
        match kind {
            AlertKind::Beep => &self.beep,
            AlertKind::Vibrate => &self.vibrate,
        }
    }

    pub fn set_enabled(&self, kind: AlertKind, enabled: bool) {
        self.channel(kind).enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self, kind: AlertKind) -> bool {
        self.channel(kind).enabled.load(Ordering::Relaxed)
    }

    pub fn attach_sink(&self, sink: Arc<dyn AlertSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// Signal that a non-empty batch reached the consumer
    pub fn notify_batch(&self) {
        self.notify_batch_at(Instant::now());
    }

    pub(crate) fn notify_batch_at(&self, now: Instant) {
        let Some(sink) = self.sink.lock().clone() else {
            return;
        };
        if self.vibrate.claim(now) {
            sink.vibrate(self.vibrate_duration);
        }
        if self.beep.claim(now) {
            sink.beep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        beeps: AtomicUsize,
        vibrations: AtomicUsize,
    }

    impl AlertSink for Counting {
        fn beep(&self) {
            self.beeps.fetch_add(1, Ordering::SeqCst);
        }
        fn vibrate(&self, _duration: Duration) {
            self.vibrations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_disabled_by_default() {
        let gate = AlertGate::new(&AlertConfig::default());
        let sink = Arc::new(Counting::default());
        gate.attach_sink(sink.clone());
        gate.notify_batch();
        assert_eq!(sink.beeps.load(Ordering::SeqCst), 0);
        assert!(!gate.is_enabled(AlertKind::Beep));
    }

    #[test]
    fn test_gaps_enforced_per_channel() {
        let gate = AlertGate::new(&AlertConfig::default());
        let sink = Arc::new(Counting::default());
        gate.attach_sink(sink.clone());
        gate.set_enabled(AlertKind::Beep, true);
        gate.set_enabled(AlertKind::Vibrate, true);

        let t0 = Instant::now();
        gate.notify_batch_at(t0);
        gate.notify_batch_at(t0 + Duration::from_millis(100));
        gate.notify_batch_at(t0 + Duration::from_millis(210));

        // beep gap 200 ms, vibrate gap 240 ms
        assert_eq!(sink.beeps.load(Ordering::SeqCst), 2);
        assert_eq!(sink.vibrations.load(Ordering::SeqCst), 1);
    }
}
