// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tiered read-surface polling.
//!
//! ```text
//!   tier 1  pop-one      drained until empty (bounded)      every cycle
//!   tier 2  list batch   one call per candidate             every cycle
//!   ---------------------------------------------------------------------
//!   tier 3  text log     only if tiers 1-2 were empty and the expensive
//!   tier 4  raw buffer   interval elapsed; each runs only if the one
//!   tier 5  brute force  above it produced nothing
//! ```
//!
//! The plans are resolved once per session. Brute force covers every
//! zero-argument method whose name mentions a tag, an EPC, a buffer or a log
//! and is neither a known read candidate nor a mutator.

use crate::extract::{bytes_from_value, observation_from_value, observations_from_batch};
use crate::observation::TagObservation;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uhfscan_config::IngestConfig;
use uhfscan_hal::{CallError, CapabilityBridge, HostHandle, HostValue, LogicalAction};

const BRUTE_FORCE_KEYWORDS: &[&str] = &["tag", "epc", "buf", "log"];

const MUTATING_PREFIXES: &[&str] = &[
    "start", "stop", "set", "clear", "reset", "close", "open", "init", "power", "enable", "disable", "release",
    "free", "delete", "remove", "write", "kill", "lock",
];

const READ_ACTIONS: [LogicalAction; 4] = [
    LogicalAction::ReadOneByPop,
    LogicalAction::ReadListBatch,
    LogicalAction::ReadTextLog,
    LogicalAction::ReadRawBuffer,
];

/// True if a zero-argument method should be swept by the brute-force tier
pub fn is_brute_force_candidate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if !BRUTE_FORCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return false;
    }
    if MUTATING_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return false;
    }
    !READ_ACTIONS
        .iter()
        .any(|a| CapabilityBridge::read_candidates(*a).contains(&name))
}

/// Resolved `(host, method)` pairs for every read tier
#[derive(Debug, Default)]
pub struct ReadPlans {
    pub pop: Vec<(HostHandle, &'static str)>,
    pub list: Vec<(HostHandle, &'static str)>,
    pub text: Vec<(HostHandle, &'static str)>,
    pub raw: Vec<(HostHandle, &'static str)>,
    pub brute: Vec<(HostHandle, String)>,
}

impl ReadPlans {
    pub fn build(bridge: &CapabilityBridge) -> Self {
        let mut brute = Vec::new();
        for host in bridge.hosts() {
            for name in bridge.zero_arg_methods(&host) {
                if is_brute_force_candidate(&name) {
                    brute.push((host.clone(), name));
                }
            }
        }

        let plans = Self {
            pop: bridge.read_plan(LogicalAction::ReadOneByPop),
            list: bridge.read_plan(LogicalAction::ReadListBatch),
            text: bridge.read_plan(LogicalAction::ReadTextLog),
            raw: bridge.read_plan(LogicalAction::ReadRawBuffer),
            brute,
        };
        info!(
            "[UHF-INGEST] Read surfaces: pop={} list={} text={} raw={} brute={}",
            plans.pop.len(),
            plans.list.len(),
            plans.text.len(),
            plans.raw.len(),
            plans.brute.len()
        );
        plans
    }

    pub fn is_empty(&self) -> bool {
        self.pop.is_empty() && self.list.is_empty() && self.text.is_empty() && self.raw.is_empty() && self.brute.is_empty()
    }
}

/// Idle sleep for an empty-cycle streak
pub fn idle_sleep(streak: u32, cfg: &IngestConfig) -> Duration {
    cfg.idle_streak_steps
        .iter()
        .zip(&cfg.idle_sleep_steps_ms)
        .filter(|(step, _)| streak >= **step)
        .map(|(_, ms)| Duration::from_millis(*ms))
        .last()
        .unwrap_or(Duration::ZERO)
}

/// Calls made during one cycle and the faults among them
#[derive(Debug, Default)]
struct CycleTally {
    calls: usize,
    faults: usize,
    last_fault: Option<CallError>,
}

impl CycleTally {
    /// `Err` only when every call that reached a method faulted
    fn into_result(self) -> Result<(), CallError> {
        match self.last_fault {
            Some(fault) if self.faults == self.calls => Err(fault),
            _ => Ok(()),
        }
    }
}

/// Stateful poller; owned by the reader thread
pub struct IngestEngine {
    bridge: Arc<CapabilityBridge>,
    plans: Arc<ReadPlans>,
    cfg: IngestConfig,
    fallback_dbm: i32,
    last_expensive: Option<Instant>,
}

impl IngestEngine {
    pub fn new(bridge: Arc<CapabilityBridge>, plans: Arc<ReadPlans>, cfg: IngestConfig, fallback_dbm: i32) -> Self {
        Self {
            bridge,
            plans,
            cfg,
            fallback_dbm,
            last_expensive: None,
        }
    }

    /// One polling cycle
    ///
    /// A faulting candidate is skipped and the rest of the cycle still runs.
    /// The cycle reports the fault only when no call succeeded at all.
    pub fn poll(&mut self, now: Instant, out: &mut Vec<TagObservation>) -> Result<(), CallError> {
        let mut tally = CycleTally::default();
        self.read_cheap(now, out, &mut tally);
        if out.is_empty() && self.expensive_due(now) {
            self.last_expensive = Some(now);
            self.read_expensive(now, out, &mut tally);
        }
        tally.into_result()
    }

    /// Every tier, ignoring the expensive interval
    pub fn read_once(&self, now: Instant) -> Vec<TagObservation> {
        let mut out = Vec::new();
        let mut tally = CycleTally::default();
        self.read_cheap(now, &mut out, &mut tally);
        if out.is_empty() {
            self.read_expensive(now, &mut out, &mut tally);
        }
        if let Err(e) = tally.into_result() {
            debug!("[UHF-INGEST] One-shot read failed: {}", e);
        }
        out
    }

    fn expensive_due(&self, now: Instant) -> bool {
        let interval = Duration::from_millis(self.cfg.expensive_poll_interval_ms);
        self.last_expensive
            .map_or(true, |last| now.saturating_duration_since(last) >= interval)
    }

    fn read_cheap(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        self.drain_pops(now, out, tally);
        self.read_lists(now, out, tally);
    }

    fn read_expensive(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        self.read_text(now, out, tally);
        if !out.is_empty() {
            return;
        }
        self.read_raw(now, out, tally);
        if !out.is_empty() {
            return;
        }
        self.brute_force(now, out, tally);
    }

    fn call(&self, host: &HostHandle, name: &str, tally: &mut CycleTally) -> Option<HostValue> {
        match self.bridge.call(host, name, &[]) {
            Ok(v) => {
                tally.calls += 1;
                Some(v)
            }
            Err(e) if e.is_absence() => None,
            Err(e) => {
                debug!("[UHF-INGEST] {} on {} faulted: {}", name, host.name(), e);
                tally.calls += 1;
                tally.faults += 1;
                tally.last_fault = Some(e);
                None
            }
        }
    }

    fn drain_pops(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        for (host, name) in &self.plans.pop {
            for _ in 0..self.cfg.max_pops_per_cycle {
                let Some(value) = self.call(host, name, tally) else {
                    break;
                };
                match observation_from_value(&value, self.fallback_dbm, now) {
                    Some(obs) => out.push(obs),
                    None => break,
                }
            }
        }
    }

    fn read_lists(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        for (host, name) in &self.plans.list {
            if let Some(value) = self.call(host, name, tally) {
                out.extend(observations_from_batch(&value, self.fallback_dbm, now));
            }
        }
    }

    fn read_text(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        for (host, name) in &self.plans.text {
            if let Some(value @ (HostValue::Text(_) | HostValue::List(_))) = self.call(host, name, tally) {
                out.extend(observations_from_batch(&value, self.fallback_dbm, now));
            }
        }
    }

    fn read_raw(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        for (host, name) in &self.plans.raw {
            let Some(bytes) = self.call(host, name, tally).as_ref().and_then(bytes_from_value) else {
                continue;
            };
            let text = HostValue::Text(String::from_utf8_lossy(&bytes).into_owned());
            out.extend(observation_from_value(&text, self.fallback_dbm, now));
        }
    }

    fn brute_force(&self, now: Instant, out: &mut Vec<TagObservation>, tally: &mut CycleTally) {
        for (host, name) in &self.plans.brute {
            if let Some(value) = self.call(host, name, tally) {
                out.extend(observations_from_batch(&value, self.fallback_dbm, now));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uhfscan_hal::{CapabilityHost, FunctionTableHost, HostRole, SimSurface, SimulatedReader};

    const A: &str = "E2801160600002084D4BB3A1";
    const B: &str = "E2801160600002084D4BB3A2";

    fn engine(sim: &SimulatedReader) -> IngestEngine {
        let bridge = Arc::new(CapabilityBridge::with_hosts(sim.hosts()));
        bridge.ensure_open().unwrap();
        let plans = Arc::new(ReadPlans::build(&bridge));
        IngestEngine::new(bridge, plans, IngestConfig::default(), -70)
    }

    #[test]
    fn test_brute_force_filter() {
        assert!(is_brute_force_candidate("dumpEpcCache"));
        assert!(is_brute_force_candidate("fetchTagLog"));
        assert!(!is_brute_force_candidate("getVersion"));
        assert!(!is_brute_force_candidate("clearTagBuffer"));
        assert!(!is_brute_force_candidate("startInventoryTag"));
        // already a read candidate
        assert!(!is_brute_force_candidate("readTagFromBuffer"));
    }

    #[test]
    fn test_idle_sleep_steps() {
        let cfg = IngestConfig::default();
        assert_eq!(idle_sleep(0, &cfg), Duration::ZERO);
        assert_eq!(idle_sleep(4, &cfg), Duration::from_millis(1));
        assert_eq!(idle_sleep(30, &cfg), Duration::from_millis(2));
        assert_eq!(idle_sleep(200, &cfg), Duration::from_millis(3));
    }

    #[test]
    fn test_pop_surface_drained_in_one_cycle() {
        let sim = SimulatedReader::new(SimSurface::Pop);
        let mut engine = engine(&sim);
        sim.push_tag(A, Some(-50));
        sim.push_tag(B, Some(-55));

        let mut out = Vec::new();
        engine.poll(Instant::now(), &mut out).unwrap();
        let ids: Vec<_> = out.iter().map(|o| o.identifier().to_string()).collect();
        assert_eq!(ids, vec![A, B]);
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn test_expensive_tier_throttled() {
        let sim = SimulatedReader::new(SimSurface::Text);
        let mut engine = engine(&sim);
        let t0 = Instant::now();

        sim.push_tag(A, Some(-50));
        let mut out = Vec::new();
        engine.poll(t0, &mut out).unwrap();
        assert_eq!(out.len(), 1);

        sim.push_tag(B, Some(-50));
        out.clear();
        engine.poll(t0 + Duration::from_millis(10), &mut out).unwrap();
        assert!(out.is_empty());

        engine.poll(t0 + Duration::from_millis(70), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].identifier(), B);
    }

    #[test]
    fn test_hidden_surface_found_by_enumeration() {
        let sim = SimulatedReader::new(SimSurface::Hidden);
        let mut engine = engine(&sim);
        assert_eq!(engine.plans.brute.len(), 1);
        sim.push_tag(A, None);

        let mut out = Vec::new();
        engine.poll(Instant::now(), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].has_signal());
    }

    #[test]
    fn test_cycle_fails_only_when_every_call_faults() {
        let sim = SimulatedReader::new(SimSurface::List);
        let mut engine = engine(&sim);
        sim.push_tag(A, Some(-40));
        sim.inject_faults(1);

        let mut out = Vec::new();
        assert!(engine.poll(Instant::now(), &mut out).is_err());
        engine.poll(Instant::now(), &mut out).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_faulting_host_does_not_hide_healthy_list() {
        let pops = Arc::new(AtomicUsize::new(0));
        let p = pops.clone();
        let func = FunctionTableHost::builder("func", HostRole::Function)
            .method("readTagFromBuffer", 0, move |_| {
                p.fetch_add(1, Ordering::SeqCst);
                Err(CallError::fault("readTagFromBuffer", "reader not initialized"))
            })
            .build();
        let mgr = FunctionTableHost::builder("mgr", HostRole::Manager)
            .method("getTagList", 0, |_| {
                Ok(HostValue::List(vec![HostValue::record([
                    ("epc", HostValue::from(A)),
                    ("rssi", HostValue::Int(-48)),
                ])]))
            })
            .build();
        let bridge = Arc::new(CapabilityBridge::with_hosts(vec![
            Arc::new(func) as Arc<dyn CapabilityHost>,
            Arc::new(mgr) as Arc<dyn CapabilityHost>,
        ]));
        bridge.ensure_open().unwrap();
        let plans = Arc::new(ReadPlans::build(&bridge));
        let mut engine = IngestEngine::new(bridge, plans, IngestConfig::default(), -70);

        let t0 = Instant::now();
        for cycle in 0..20u64 {
            let mut out = Vec::new();
            engine.poll(t0 + Duration::from_millis(cycle), &mut out).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].identifier(), A);
        }
        assert_eq!(pops.load(Ordering::SeqCst), 20);

        let once = engine.read_once(Instant::now());
        assert_eq!(once.len(), 1);
    }
}
