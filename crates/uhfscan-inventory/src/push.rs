// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Paced batch delivery to the consumer.
//!
//! At most one push is scheduled at a time. A push takes up to one chunk from
//! the backlog, hands it to the consumer and reschedules itself while the
//! backlog is non-empty. Small deliveries against a large backlog are read as
//! a stalled reader and trigger a rate-limited inventory reset.

use crate::alerts::AlertGate;
use crate::backlog::Backlog;
use crate::error::Result;
use crate::observation::{TagObservation, TagRecord};
use crate::signal::ShutdownListener;
use crate::snapshot::SnapshotController;
use crate::worker::WorkerThread;
use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uhfscan_config::PushConfig;

/// Receiver of delivered tag batches
///
/// `deliver` runs on the session's push thread. It may query the service
/// (`pull_batch`, `is_running`, ...) but must not start, stop or shut it
/// down: those join the push thread.
pub trait BatchSink: Send + Sync {
    fn deliver(&self, batch: Vec<TagRecord>);
}

impl<F> BatchSink for F
where
    F: Fn(Vec<TagRecord>) + Send + Sync,
{
    fn deliver(&self, batch: Vec<TagRecord>) {
        self(batch)
    }
}

/// The currently attached consumer, if any
#[derive(Default)]
pub struct ConsumerSlot {
    sink: RwLock<Option<Arc<dyn BatchSink>>>,
}

impl ConsumerSlot {
    pub fn attach(&self, sink: Arc<dyn BatchSink>) {
        *self.sink.write() = Some(sink);
    }

    pub fn detach(&self) {
        self.sink.write().take();
    }

    pub fn get(&self) -> Option<Arc<dyn BatchSink>> {
        self.sink.read().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.read().is_some()
    }
}

struct PushTick {
    delay: Duration,
}

struct PushShared {
    cfg: PushConfig,
    backlog: Arc<Backlog>,
    consumer: Arc<ConsumerSlot>,
    snapshot: Arc<SnapshotController>,
    alerts: Arc<AlertGate>,
    scheduled: AtomicBool,
    last_push: Mutex<Option<Instant>>,
    last_nudge: Mutex<Option<Instant>>,
    on_stall: Box<dyn Fn() + Send + Sync>,
    tx: Sender<PushTick>,
}

impl PushShared {
    fn schedule(&self, immediate: bool) -> bool {
        if !self.consumer.is_attached() || self.snapshot.is_active() {
            return false;
        }
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let delay = if immediate {
            Duration::ZERO
        } else {
            let gap = Duration::from_millis(self.cfg.min_gap_ms);
            match *self.last_push.lock() {
                Some(last) => gap.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            }
        };
        if self.tx.send(PushTick { delay }).is_err() {
            self.scheduled.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Hand `batch` to `sink`, isolating the pipeline from consumer panics
    fn deliver(&self, sink: &Arc<dyn BatchSink>, batch: &[TagObservation]) {
        let records: Vec<TagRecord> = batch.iter().map(TagRecord::from).collect();
        if catch_unwind(AssertUnwindSafe(|| sink.deliver(records))).is_err() {
            warn!("[UHF-PUSH] Consumer panicked while handling a batch of {}", batch.len());
        }
        self.alerts.notify_batch();
    }

    fn fire(&self) {
        self.scheduled.store(false, Ordering::Release);
        let Some(sink) = self.consumer.get() else {
            return;
        };

        let batch = self.backlog.take(self.cfg.chunk_size);
        let now = Instant::now();
        *self.last_push.lock() = Some(now);
        if batch.is_empty() {
            return;
        }
        self.deliver(&sink, &batch);

        let remaining = self.backlog.len();
        if batch.len() < self.cfg.stall_batch_max && remaining > self.cfg.stall_backlog_min {
            let mut last_nudge = self.last_nudge.lock();
            let cooled = last_nudge
                .map_or(true, |t| now.saturating_duration_since(t) > Duration::from_millis(self.cfg.stall_cooldown_ms));
            if cooled {
                *last_nudge = Some(now);
                drop(last_nudge);
                debug!(
                    "[UHF-PUSH] Stall suspected (batch={}, backlog={}), nudging reader",
                    batch.len(),
                    remaining
                );
                (self.on_stall)();
            }
        }

        if remaining > 0 {
            self.schedule(false);
        }
    }
}

pub struct PushScheduler {
    shared: Arc<PushShared>,
    worker: Mutex<Option<WorkerThread<PushTick>>>,
}

impl PushScheduler {
    /// Spawn the `uhf-push` worker
    ///
    /// `on_stall` runs on the push thread and must not block.
    pub fn spawn(
        cfg: PushConfig,
        backlog: Arc<Backlog>,
        consumer: Arc<ConsumerSlot>,
        snapshot: Arc<SnapshotController>,
        alerts: Arc<AlertGate>,
        listener: ShutdownListener,
        on_stall: Box<dyn Fn() + Send + Sync>,
    ) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<PushTick>();
        let shared = Arc::new(PushShared {
            cfg,
            backlog,
            consumer,
            snapshot,
            alerts,
            scheduled: AtomicBool::new(false),
            last_push: Mutex::new(None),
            last_nudge: Mutex::new(None),
            on_stall,
            tx,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = WorkerThread::spawn("uhf-push", rx, move |tick: PushTick| -> std::result::Result<(), String> {
            if listener.sleep(tick.delay) {
                worker_shared.fire();
            }
            Ok(())
        })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Schedule a push unless one is pending
    ///
    /// Nothing is scheduled without a consumer or while a snapshot window is
    /// open.
    pub fn schedule(&self, immediate: bool) -> bool {
        self.shared.schedule(immediate)
    }

    pub fn is_scheduled(&self) -> bool {
        self.shared.scheduled.load(Ordering::Acquire)
    }

    /// Deliver a batch directly, bypassing the backlog
    ///
    /// # Returns
    /// `false` if no consumer is attached
    pub fn deliver_now(&self, batch: &[TagObservation]) -> bool {
        let Some(sink) = self.shared.consumer.get() else {
            return false;
        };
        *self.shared.last_push.lock() = Some(Instant::now());
        self.shared.deliver(&sink, batch);
        true
    }

    pub fn stop(&self) {
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ShutdownSignal;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use uhfscan_config::{AlertConfig, SnapshotConfig};

    fn obs(n: usize) -> TagObservation {
        TagObservation::new(&format!("E28011606000020800{:06X}", n), Some(-50), -70, Instant::now()).unwrap()
    }

    struct Fixture {
        backlog: Arc<Backlog>,
        consumer: Arc<ConsumerSlot>,
        snapshot: Arc<SnapshotController>,
        stalls: Arc<AtomicUsize>,
        push: PushScheduler,
        _signal: ShutdownSignal,
    }

    fn fixture(cfg: PushConfig) -> Fixture {
        let backlog = Arc::new(Backlog::new(10_000));
        let consumer = Arc::new(ConsumerSlot::default());
        let snapshot = Arc::new(SnapshotController::new(&SnapshotConfig::default()));
        let alerts = Arc::new(AlertGate::new(&AlertConfig::default()));
        let stalls = Arc::new(AtomicUsize::new(0));
        let signal = ShutdownSignal::new();
        let s = stalls.clone();
        let push = PushScheduler::spawn(
            cfg,
            backlog.clone(),
            consumer.clone(),
            snapshot.clone(),
            alerts,
            signal.listener(),
            Box::new(move || {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        Fixture {
            backlog,
            consumer,
            snapshot,
            stalls,
            push,
            _signal: signal,
        }
    }

    fn collecting(slot: &ConsumerSlot) -> Arc<Mutex<Vec<usize>>> {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let s = sizes.clone();
        slot.attach(Arc::new(move |batch: Vec<TagRecord>| s.lock().push(batch.len())));
        sizes
    }

    #[test]
    fn test_no_consumer_means_nothing_scheduled() {
        let f = fixture(PushConfig::default());
        f.backlog.push(obs(1));
        assert!(!f.push.schedule(true));
        assert!(!f.push.is_scheduled());
        f.push.stop();
    }

    #[test]
    fn test_backlog_drained_in_chunks() {
        let f = fixture(PushConfig::default());
        let sizes = collecting(&f.consumer);
        for i in 0..600 {
            f.backlog.push(obs(i));
        }
        assert!(f.push.schedule(true));
        thread::sleep(Duration::from_millis(300));

        assert_eq!(*sizes.lock(), vec![256, 256, 88]);
        assert!(f.backlog.is_empty());
        f.push.stop();
    }

    #[test]
    fn test_open_snapshot_window_blocks_scheduling() {
        let f = fixture(PushConfig::default());
        let _sizes = collecting(&f.consumer);
        f.snapshot.begin_window(Duration::from_millis(500), Instant::now());
        f.backlog.push(obs(1));
        assert!(!f.push.schedule(true));
        f.push.stop();
    }

    #[test]
    fn test_small_batch_with_large_backlog_nudges_once() {
        let cfg = PushConfig {
            chunk_size: 4,
            min_gap_ms: 50,
            ..PushConfig::default()
        };
        let f = fixture(cfg);
        let _sizes = collecting(&f.consumer);
        for i in 0..1000 {
            f.backlog.push(obs(i));
        }
        f.push.schedule(true);
        thread::sleep(Duration::from_millis(200));
        f.push.stop();

        // several pushes happened inside one cooldown period
        assert_eq!(f.stalls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_consumer_panic_is_contained() {
        let f = fixture(PushConfig::default());
        f.consumer.attach(Arc::new(|_batch: Vec<TagRecord>| panic!("consumer bug")));
        f.backlog.push(obs(1));
        f.push.schedule(true);
        thread::sleep(Duration::from_millis(100));

        let sizes = collecting(&f.consumer);
        f.backlog.push(obs(2));
        f.push.schedule(true);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(*sizes.lock(), vec![1]);
        f.push.stop();
    }
}
