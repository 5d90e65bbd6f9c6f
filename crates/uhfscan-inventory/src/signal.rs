// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Session shutdown signal with interruptible sleeps.
//!
//! Every session thread sleeps on `recv_timeout` of a shared receiver whose
//! only sender is held by the signal. Triggering drops the sender, which
//! disconnects the channel and wakes all sleepers at once.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub struct ShutdownSignal {
    trigger: Mutex<Option<Sender<()>>>,
    listener: Receiver<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            trigger: Mutex::new(Some(tx)),
            listener: rx,
        }
    }

    /// Wake every sleeper; idempotent
    pub fn trigger(&self) {
        self.trigger.lock().take();
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.listener.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable sleeping side of a [`ShutdownSignal`]
#[derive(Clone)]
pub struct ShutdownListener {
    rx: Receiver<()>,
}

impl ShutdownListener {
    /// Sleep for `duration` unless shut down first
    ///
    /// # Returns
    /// `false` if the sleep was interrupted
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_triggered();
        }
        matches!(self.rx.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }

    /// Sleep until `deadline` unless shut down first
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        self.sleep(deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_completes_without_trigger() {
        let signal = ShutdownSignal::new();
        let listener = signal.listener();
        assert!(listener.sleep(Duration::from_millis(5)));
        assert!(!listener.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_sleepers() {
        let signal = ShutdownSignal::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let listener = signal.listener();
                thread::spawn(move || {
                    let start = Instant::now();
                    let completed = listener.sleep(Duration::from_secs(10));
                    (completed, start.elapsed())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        signal.trigger();
        signal.trigger();

        for h in handles {
            let (completed, elapsed) = h.join().unwrap();
            assert!(!completed);
            assert!(elapsed < Duration::from_secs(5));
        }
        assert!(signal.listener().is_triggered());
    }
}
