// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! One inventory session: every piece of mutable pipeline state plus the
//! threads that drive it.
//!
//! A `SessionContext` is created by start and torn down by stop. Threads hold
//! an `Arc` to it and leave their loops once `running` drops; the push
//! callback registered with the hosts reaches it only through the service's
//! [`ActiveSession`] slot.

use crate::adaptive::AdaptiveController;
use crate::alerts::AlertGate;
use crate::backlog::Backlog;
use crate::bootstrap;
use crate::control::{reset_inventory, ControlPlane};
use crate::dedup::DedupCache;
use crate::error::{InventoryError, Result};
use crate::extract::observation_from_value;
use crate::ingest::{idle_sleep, IngestEngine, ReadPlans};
use crate::observation::TagObservation;
use crate::push::{ConsumerSlot, PushScheduler};
use crate::rssi::SignalGate;
use crate::signal::{ShutdownListener, ShutdownSignal};
use crate::snapshot::{burst_period_ms, window_len_ms, SnapshotController};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uhfscan_config::UhfConfig;
use uhfscan_hal::{CapabilityBridge, HostValue, LogicalAction};

/// Lifecycle of the service's current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Starting,
    Bootstrapping,
    Steady,
    Stopping,
}

#[derive(Debug)]
pub struct PhaseCell(Mutex<SessionPhase>);

impl PhaseCell {
    pub fn new() -> Self {
        Self(Mutex::new(SessionPhase::Idle))
    }

    pub fn get(&self) -> SessionPhase {
        *self.0.lock()
    }

    pub fn set(&self, phase: SessionPhase) {
        *self.0.lock() = phase;
    }

    /// Move `from -> to` only if the phase is still `from`
    pub fn advance(&self, from: SessionPhase, to: SessionPhase) -> bool {
        let mut phase = self.0.lock();
        if *phase != from {
            return false;
        }
        *phase = to;
        true
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Options accepted by `start_inventory`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartOptions {
    /// Burst snapshot mode
    pub full_scan: bool,
    /// Length of the first snapshot window
    pub window_ms: Option<u64>,
    /// Snapshot rate; clamped to the configured range
    pub scan_hz: Option<f64>,
}

/// Slot through which host push callbacks find the running session
#[derive(Default)]
pub struct ActiveSession(RwLock<Weak<SessionContext>>);

impl ActiveSession {
    pub(crate) fn set(&self, ctx: &Arc<SessionContext>) {
        *self.0.write() = Arc::downgrade(ctx);
    }

    pub(crate) fn clear(&self) {
        *self.0.write() = Weak::new();
    }

    pub(crate) fn get(&self) -> Option<Arc<SessionContext>> {
        self.0.read().upgrade()
    }
}

/// Shared collaborators a session is started with
pub(crate) struct SessionDeps {
    pub config: Arc<UhfConfig>,
    pub bridge: Arc<CapabilityBridge>,
    pub consumer: Arc<ConsumerSlot>,
    pub alerts: Arc<AlertGate>,
    pub phase: Arc<PhaseCell>,
}

pub struct SessionContext {
    pub(crate) config: Arc<UhfConfig>,
    pub(crate) bridge: Arc<CapabilityBridge>,
    pub(crate) plans: Arc<ReadPlans>,
    pub(crate) gate: SignalGate,
    pub(crate) dedup: Mutex<DedupCache>,
    pub(crate) backlog: Arc<Backlog>,
    pub(crate) snapshot: Arc<SnapshotController>,
    pub(crate) adaptive: AdaptiveController,
    pub(crate) control: ControlPlane,
    pub(crate) push: PushScheduler,
    pub(crate) phase: Arc<PhaseCell>,
    signal: ShutdownSignal,
    started_at: Instant,
    running: AtomicBool,
    stopped: AtomicBool,
    seen_any: AtomicBool,
    first_push_done: AtomicBool,
    target_until: Mutex<Instant>,
    target_active: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionContext {
    /// Build the session state and its control and push workers
    pub(crate) fn new(deps: SessionDeps) -> Result<Arc<Self>> {
        let SessionDeps {
            config,
            bridge,
            consumer,
            alerts,
            phase,
        } = deps;
        let started_at = Instant::now();
        let signal = ShutdownSignal::new();
        let control = ControlPlane::spawn()?;

        let backlog = Arc::new(Backlog::new(config.backlog.capacity));
        let snapshot = Arc::new(SnapshotController::new(&config.snapshot));

        let on_stall: Box<dyn Fn() + Send + Sync> = {
            let handle = control.handle();
            let bridge = Arc::clone(&bridge);
            let listener = signal.listener();
            let pause = Duration::from_millis(config.bootstrap.reset_pause_ms);
            Box::new(move || {
                let bridge = Arc::clone(&bridge);
                let listener = listener.clone();
                handle.submit(move || reset_inventory(&bridge, pause, &listener));
            })
        };
        let push = PushScheduler::spawn(
            config.push.clone(),
            Arc::clone(&backlog),
            consumer,
            Arc::clone(&snapshot),
            alerts,
            signal.listener(),
            on_stall,
        )?;

        let plans = Arc::new(ReadPlans::build(&bridge));
        if plans.is_empty() {
            warn!("[UHF-READER] No polled read surface found; relying on push callbacks");
        }

        Ok(Arc::new(Self {
            gate: SignalGate::new(config.rssi.steady_gate_dbm),
            dedup: Mutex::new(DedupCache::new(
                Duration::from_millis(config.dedup.debounce_ms),
                config.dedup.capacity,
            )),
            adaptive: AdaptiveController::new(config.adaptive.clone(), started_at),
            config,
            bridge,
            plans,
            backlog,
            snapshot,
            control,
            push,
            phase,
            signal,
            started_at,
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            seen_any: AtomicBool::new(false),
            first_push_done: AtomicBool::new(false),
            target_until: Mutex::new(started_at),
            target_active: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        }))
    }

    /// Start inventory and every session thread
    ///
    /// With `bootstrap` false the aggressive opening is skipped and the
    /// session goes straight to steady state.
    pub(crate) fn launch(self: &Arc<Self>, opts: &StartOptions, bootstrap: bool) -> Result<()> {
        if bootstrap {
            // loosened before the reader thread sees its first tag
            self.gate.set_threshold(self.config.rssi.warmup_gate_dbm);
        }
        if !self.bridge.perform(LogicalAction::StartInventory, &[]) {
            warn!("[UHF-READER] No host accepted StartInventory");
        }
        self.running.store(true, Ordering::Release);

        if opts.full_scan {
            let cfg = &self.config.snapshot;
            let period = burst_period_ms(opts.scan_hz, cfg);
            let first_window = opts.window_ms.unwrap_or_else(|| window_len_ms(period, cfg));
            self.snapshot.enable(period);
            self.snapshot
                .begin_window(Duration::from_millis(first_window), Instant::now());
            info!("[UHF-SNAPSHOT] Burst mode: period={}ms first window={}ms", period, first_window);
            self.spawn_thread("uhf-snapshot", Self::run_snapshot)?;
        }

        self.spawn_thread("uhf-reader", Self::run_reader)?;

        if bootstrap {
            self.phase.set(SessionPhase::Bootstrapping);
            bootstrap::run(self)
        } else {
            self.phase.set(SessionPhase::Steady);
            self.apply_steady_defaults();
            Ok(())
        }
    }

    /// Steady-state parameters without the warm-up sequence
    fn apply_steady_defaults(&self) {
        let steady = self.config.rssi.steady_gate_dbm;
        let session = self.config.bootstrap.session;
        self.gate.set_threshold(steady);
        self.adaptive.force_next();
        let bridge = Arc::clone(&self.bridge);
        self.control.submit(move || {
            bridge.perform(LogicalAction::SetSignalFilter, &[HostValue::Int(steady as i64)]);
            bridge.perform(LogicalAction::SetContinuousMode, &[HostValue::Bool(true)]);
            bridge.perform(LogicalAction::SetSession, &[HostValue::Int(session)]);
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn has_seen_any(&self) -> bool {
        self.seen_any.load(Ordering::Acquire)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub(crate) fn listener(&self) -> ShutdownListener {
        self.signal.listener()
    }

    pub(crate) fn spawn_thread<F>(self: &Arc<Self>, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce(Arc<Self>) + Send + 'static,
    {
        let ctx = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(ctx))
            .map_err(|source| InventoryError::Spawn { name, source })?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Run `obs` through gate, dedup and snapshot diversion, then enqueue
    ///
    /// # Returns
    /// `true` if the observation was accepted
    pub(crate) fn accept(&self, obs: TagObservation) -> bool {
        if !self.is_running() || !self.gate.admits(&obs) {
            return false;
        }
        if !self.dedup.lock().admit(obs.identifier(), obs.observed_at()) {
            return false;
        }
        self.seen_any.store(true, Ordering::Release);
        self.adaptive.record_hits(1);

        let Some(obs) = self.snapshot.offer(obs) else {
            return true;
        };
        self.backlog.push(obs);
        let first = !self.first_push_done.load(Ordering::Acquire);
        if self.push.schedule(first) && first {
            self.first_push_done.store(true, Ordering::Release);
        }
        true
    }

    /// Entry point for tags delivered by a host push callback
    pub(crate) fn on_pushed(&self, value: HostValue) {
        let now = Instant::now();
        match observation_from_value(&value, self.config.rssi.fallback_dbm, now) {
            Some(obs) => {
                self.accept(obs);
            }
            None => trace!("[UHF-READER] Ignored pushed value {}", value),
        }
    }

    /// Immediately available reads, gated but not deduplicated
    pub(crate) fn read_now(&self) -> Vec<TagObservation> {
        let engine = IngestEngine::new(
            Arc::clone(&self.bridge),
            Arc::clone(&self.plans),
            self.config.ingest.clone(),
            self.config.rssi.fallback_dbm,
        );
        let mut out = engine.read_once(Instant::now());
        out.retain(|o| self.gate.admits(o));
        out
    }

    fn tune(&self, now: Instant) {
        let Some(retune) = self.adaptive.maybe_retune(now, self.backlog.len()) else {
            return;
        };
        debug!(
            "[UHF-ADAPT] Q {} -> {} (rate={}, backlog={})",
            retune.previous, retune.next, retune.rate, retune.backlog
        );
        let bridge = Arc::clone(&self.bridge);
        self.control.submit(move || {
            bridge.perform(LogicalAction::SetAntiCollisionParam, &[HostValue::Int(retune.next as i64)]);
        });
    }

    fn run_reader(ctx: Arc<Self>) {
        let cfg = ctx.config.ingest.clone();
        let fault_backoff = Duration::from_millis(cfg.fault_backoff_ms);
        let listener = ctx.listener();
        let mut engine = IngestEngine::new(
            Arc::clone(&ctx.bridge),
            Arc::clone(&ctx.plans),
            cfg.clone(),
            ctx.config.rssi.fallback_dbm,
        );
        let mut batch = Vec::new();
        let mut streak: u32 = 0;

        info!("[UHF-READER] Reader loop started");
        while ctx.is_running() {
            let now = Instant::now();
            let result = engine.poll(now, &mut batch);
            let got = batch.len();
            for obs in batch.drain(..) {
                ctx.accept(obs);
            }
            ctx.tune(now);

            if let Err(e) = result {
                debug!("[UHF-READER] Read fault: {}", e);
                if !listener.sleep(fault_backoff) {
                    break;
                }
                continue;
            }

            if got > 0 {
                streak = 0;
                continue;
            }
            streak = (streak + 1).min(cfg.idle_streak_cap);
            let pause = idle_sleep(streak, &cfg);
            if pause.is_zero() {
                thread::yield_now();
            } else if !listener.sleep(pause) {
                break;
            }
        }
        info!("[UHF-READER] Reader loop stopped");
    }

    fn deliver_snapshot(&self, batch: Vec<TagObservation>) {
        if batch.is_empty() {
            return;
        }
        debug!("[UHF-SNAPSHOT] Flushing {} unique tags", batch.len());
        if !self.push.deliver_now(&batch) {
            for obs in batch {
                self.backlog.push(obs);
            }
        }
        self.first_push_done.store(true, Ordering::Release);
    }

    fn run_snapshot(ctx: Arc<Self>) {
        let listener = ctx.listener();
        let cfg = ctx.config.snapshot.clone();
        let period = ctx.snapshot.period();
        let window = Duration::from_millis(window_len_ms(period.as_millis() as u64, &cfg));
        let mut next_fire = Instant::now() + period;

        while ctx.is_running() && ctx.snapshot.is_enabled() {
            let now = Instant::now();
            if let Some(batch) = ctx.snapshot.flush_if_due(now) {
                ctx.deliver_snapshot(batch);
                // observations that arrived outside the window
                ctx.push.schedule(false);
            }
            if now >= next_fire {
                ctx.snapshot.begin_window(window, now);
                next_fire = now + period;
            }
            let wake = ctx.snapshot.deadline().map_or(next_fire, |d| d.min(next_fire));
            if !listener.sleep_until(wake) {
                break;
            }
        }
        debug!("[UHF-SNAPSHOT] Timer stopped");
    }

    /// Alternate the target flag until `until`, extending a running loop
    pub(crate) fn extend_targeting(self: &Arc<Self>, until: Instant) -> Result<()> {
        let mut deadline = self.target_until.lock();
        if until > *deadline {
            *deadline = until;
        }
        if self.target_active.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let spawned = self.spawn_thread("uhf-target", Self::run_target_alternation);
        if spawned.is_err() {
            self.target_active.store(false, Ordering::Release);
        }
        spawned
    }

    fn run_target_alternation(ctx: Arc<Self>) {
        let listener = ctx.listener();
        let period = Duration::from_millis(ctx.config.bootstrap.target_period_ms);
        let mut toggle: i64 = 0;
        while ctx.is_running() {
            {
                let deadline = ctx.target_until.lock();
                if Instant::now() >= *deadline {
                    ctx.target_active.store(false, Ordering::Release);
                    break;
                }
            }
            let bridge = Arc::clone(&ctx.bridge);
            let target = toggle & 1;
            ctx.control.submit(move || {
                bridge.perform(LogicalAction::SetTarget, &[HostValue::Int(target)]);
            });
            toggle += 1;
            if !listener.sleep(period) {
                break;
            }
        }
        trace!("[UHF-BOOT] Target alternation finished after {} toggles", toggle);
    }

    /// Stop every thread and the reader's inventory; idempotent
    pub(crate) fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Release);
        self.snapshot.disable();
        self.signal.trigger();
        self.control.stop();
        self.push.stop();

        let handles = std::mem::take(&mut *self.threads.lock());
        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            let name = handle.thread().name().unwrap_or("session").to_string();
            if handle.join().is_err() {
                warn!("[UHF-READER] {} thread panicked", name);
            }
        }

        if !self.bridge.perform(LogicalAction::StopInventory, &[]) {
            debug!("[UHF-READER] No host accepted StopInventory");
        }
        info!(
            "[UHF-READER] Session stopped after {:?} (backlog={}, dropped={})",
            self.started_at.elapsed(),
            self.backlog.len(),
            self.backlog.dropped()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::TagRecord;
    use uhfscan_config::AlertConfig;
    use uhfscan_hal::{SimSurface, SimulatedReader};

    const A: &str = "E2801160600002084D4BB3A1";

    fn session(sim: &SimulatedReader) -> (Arc<SessionContext>, Arc<ConsumerSlot>) {
        let bridge = Arc::new(CapabilityBridge::with_hosts(sim.hosts()));
        bridge.ensure_open().unwrap();
        let consumer = Arc::new(ConsumerSlot::default());
        let ctx = SessionContext::new(SessionDeps {
            config: Arc::new(UhfConfig::default()),
            bridge,
            consumer: consumer.clone(),
            alerts: Arc::new(AlertGate::new(&AlertConfig::default())),
            phase: Arc::new(PhaseCell::new()),
        })
        .unwrap();
        (ctx, consumer)
    }

    fn obs(id: &str, rssi: Option<i32>) -> TagObservation {
        TagObservation::new(id, rssi, -70, Instant::now()).unwrap()
    }

    #[test]
    fn test_start_options_from_json() {
        let opts: StartOptions = serde_json::from_str(r#"{"fullScan":true,"scanHz":2}"#).unwrap();
        assert!(opts.full_scan);
        assert_eq!(opts.scan_hz, Some(2.0));
        assert_eq!(opts.window_ms, None);
    }

    #[test]
    fn test_phase_advance_only_from_expected() {
        let cell = PhaseCell::new();
        assert!(!cell.advance(SessionPhase::Bootstrapping, SessionPhase::Steady));
        cell.set(SessionPhase::Bootstrapping);
        assert!(cell.advance(SessionPhase::Bootstrapping, SessionPhase::Steady));
        assert_eq!(cell.get(), SessionPhase::Steady);
    }

    #[test]
    fn test_accept_applies_gate_then_dedup() {
        let sim = SimulatedReader::new(SimSurface::List);
        let (ctx, _consumer) = session(&sim);
        ctx.launch(&StartOptions::default(), false).unwrap();

        // steady gate -62
        assert!(!ctx.accept(obs(A, Some(-80))));
        assert!(!ctx.has_seen_any());
        assert!(ctx.accept(obs(A, None)));
        // within the 4 ms debounce window
        assert!(!ctx.accept(obs(A, Some(-40))));
        ctx.shutdown();
        assert!(!sim.is_inventory_running());
    }

    #[test]
    fn test_pushed_tags_reach_consumer() {
        let sim = SimulatedReader::new(SimSurface::List);
        let (ctx, consumer) = session(&sim);
        let got = Arc::new(Mutex::new(Vec::<TagRecord>::new()));
        let g = got.clone();
        consumer.attach(Arc::new(move |batch: Vec<TagRecord>| g.lock().extend(batch)));

        ctx.launch(&StartOptions::default(), false).unwrap();
        ctx.on_pushed(HostValue::Text(format!("EPC:{} RSSI:-45dBm", A)));
        thread::sleep(Duration::from_millis(100));
        ctx.shutdown();

        let got = got.lock();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].identifier, A);
        assert_eq!(got[0].signal_dbm, -45);
    }

    #[test]
    fn test_weak_tag_queued_before_bootstrap_is_read() {
        let sim = SimulatedReader::new(SimSurface::Pop);
        let (ctx, _consumer) = session(&sim);
        // below the steady gate, above the warm-up gate
        sim.push_tag(A, Some(-80));
        ctx.launch(&StartOptions::default(), true).unwrap();
        assert_eq!(ctx.gate.threshold(), ctx.config.rssi.warmup_gate_dbm);

        let deadline = Instant::now() + Duration::from_millis(500);
        while !ctx.has_seen_any() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(ctx.has_seen_any());
        assert_eq!(ctx.backlog.len(), 1);
        ctx.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let sim = SimulatedReader::new(SimSurface::Pop);
        let (ctx, _consumer) = session(&sim);
        ctx.launch(&StartOptions::default(), false).unwrap();
        ctx.shutdown();
        ctx.shutdown();
        assert_eq!(sim.calls_to("stopInventory").len(), 1);
        assert!(!ctx.accept(obs(A, None)));
    }
}
