// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fast-start sequence for a cold tag population.
//!
//! ```text
//!  t=0     warm kick (target toggles + one reset), gate loosened, continuous
//!          mode, session; phase 1: dynamic Q off, Q minimum, single channel
//!  0..1500 target alternation every 40 ms
//!  800     rescue if nothing accepted yet: gate -78, single channel, reset,
//!          target alternation for another 1200 ms
//!  900     phase 2: dynamic Q on, steady gate, hopping restored, forced tune
//! ```

use crate::control::reset_inventory;
use crate::error::Result;
use crate::session::{SessionContext, SessionPhase};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uhfscan_config::BootstrapConfig;
use uhfscan_hal::{CapabilityBridge, HostValue, LogicalAction, RegionPlan};

const WARM_KICK_TOGGLES: i64 = 3;
const WARM_KICK_RESET_AT: i64 = 1;
const WARM_KICK_GAP: Duration = Duration::from_millis(60);
const WARM_KICK_RESET_PAUSE: Duration = Duration::from_millis(50);

fn region_plan(cfg: &BootstrapConfig) -> RegionPlan {
    RegionPlan {
        region: cfg.region,
        channel: cfg.channel,
        frequency_khz: cfg.frequency_khz,
        profile: cfg.profile,
    }
}

fn set_filter(bridge: &CapabilityBridge, dbm: i32) {
    bridge.perform(LogicalAction::SetSignalFilter, &[HostValue::Int(dbm as i64)]);
}

/// Kick off the sequence; returns once every timer is running
pub(crate) fn run(ctx: &Arc<SessionContext>) -> Result<()> {
    let cfg = ctx.config.bootstrap.clone();
    let warmup_gate = ctx.config.rssi.warmup_gate_dbm;
    info!("[UHF-BOOT] Fast start: warm-up {}ms, fast phase {}ms", cfg.warmup_ms, cfg.fast_start_ms);

    submit_warm_kick(ctx);
    ctx.spawn_thread("uhf-rescue", run_rescue)?;

    ctx.gate.set_threshold(warmup_gate);
    let bridge = Arc::clone(&ctx.bridge);
    let session = cfg.session;
    ctx.control.submit(move || {
        set_filter(&bridge, warmup_gate);
        bridge.perform(LogicalAction::SetContinuousMode, &[HostValue::Bool(true)]);
        bridge.perform(LogicalAction::SetSession, &[HostValue::Int(session)]);
    });

    let phase1 = Arc::clone(ctx);
    ctx.control.submit(move || apply_phase1(&phase1));

    ctx.extend_targeting(ctx.started_at() + Duration::from_millis(cfg.fast_start_ms))?;
    ctx.spawn_thread("uhf-warmup", run_warmup)
}

fn submit_warm_kick(ctx: &Arc<SessionContext>) {
    let bridge = Arc::clone(&ctx.bridge);
    let listener = ctx.listener();
    ctx.control.submit(move || {
        bridge.perform(LogicalAction::SetContinuousMode, &[HostValue::Bool(true)]);
        for i in 0..WARM_KICK_TOGGLES {
            bridge.perform(LogicalAction::SetTarget, &[HostValue::Int(i & 1)]);
            if i == WARM_KICK_RESET_AT {
                reset_inventory(&bridge, WARM_KICK_RESET_PAUSE, &listener);
            }
            if !listener.sleep(WARM_KICK_GAP) {
                return;
            }
        }
    });
}

/// Aggressive opening parameters
fn apply_phase1(ctx: &SessionContext) {
    let min_q = ctx.config.adaptive.min_param;
    let bridge = &ctx.bridge;
    bridge.perform(LogicalAction::SetDynamicAdaptation, &[HostValue::Bool(false)]);
    bridge.perform(LogicalAction::SetAntiCollisionParam, &[HostValue::Int(min_q as i64)]);
    ctx.adaptive.set_current(min_q);
    bridge.perform(LogicalAction::SetRegionSingleChannel, &region_plan(&ctx.config.bootstrap).args());
    debug!("[UHF-BOOT] Phase 1 applied (Q={})", min_q);
}

fn run_warmup(ctx: Arc<SessionContext>) {
    let listener = ctx.listener();
    let deadline = ctx.started_at() + Duration::from_millis(ctx.config.bootstrap.warmup_ms);
    if !listener.sleep_until(deadline) || !ctx.is_running() {
        return;
    }

    let steady = ctx.config.rssi.steady_gate_dbm;
    let job_ctx = Arc::clone(&ctx);
    ctx.control.submit(move || {
        let bridge = &job_ctx.bridge;
        bridge.perform(LogicalAction::SetDynamicAdaptation, &[HostValue::Bool(true)]);
        job_ctx.gate.set_threshold(steady);
        set_filter(bridge, steady);
        bridge.perform(LogicalAction::RestoreRegionHopping, &[]);
        job_ctx.adaptive.force_next();
        if job_ctx.phase.advance(SessionPhase::Bootstrapping, SessionPhase::Steady) {
            info!("[UHF-BOOT] Warm-up complete, steady state (gate {} dBm)", steady);
        }
    });
}

fn run_rescue(ctx: Arc<SessionContext>) {
    let cfg = ctx.config.bootstrap.clone();
    let listener = ctx.listener();
    let deadline = ctx.started_at() + Duration::from_millis(cfg.first_hit_deadline_ms);
    let poll = Duration::from_millis(cfg.watchdog_poll_ms);

    while ctx.is_running() && !ctx.has_seen_any() && Instant::now() < deadline {
        if !listener.sleep(poll) {
            return;
        }
    }
    if !ctx.is_running() || ctx.has_seen_any() {
        return;
    }

    let rescue_gate = ctx.config.rssi.rescue_gate_dbm;
    warn!(
        "[UHF-BOOT] No tag within {}ms, rescuing (gate {} dBm)",
        cfg.first_hit_deadline_ms, rescue_gate
    );
    ctx.gate.set_threshold(rescue_gate);

    let bridge = Arc::clone(&ctx.bridge);
    let plan = region_plan(&cfg);
    let pause = Duration::from_millis(cfg.reset_pause_ms);
    let job_listener = listener.clone();
    ctx.control.submit(move || {
        set_filter(&bridge, rescue_gate);
        bridge.perform(LogicalAction::SetRegionSingleChannel, &plan.args());
        reset_inventory(&bridge, pause, &job_listener);
    });

    if let Err(e) = ctx.extend_targeting(Instant::now() + Duration::from_millis(cfg.rescue_target_ms)) {
        warn!("[UHF-BOOT] Rescue target alternation not started: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_plan_from_config() {
        let plan = region_plan(&BootstrapConfig::default());
        let args = plan.args();
        assert_eq!(args[0], HostValue::Int(1));
        assert_eq!(args[1], HostValue::Int(6));
        assert_eq!(args[2], HostValue::Int(922_625));
        assert_eq!(args[3], HostValue::Int(3));
    }
}
