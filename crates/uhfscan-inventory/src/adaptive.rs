// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Adaptive anti-collision parameter (Q) controller.
//!
//! Rate rules raise Q under load and lower it to the baseline only when the
//! field is quiet and the backlog small; backlog rules then raise it further.
//! The controller only decides - writing the value to the reader is the
//! caller's job (through the control plane).

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use uhfscan_config::AdaptiveConfig;

/// Pure tuning decision
pub fn decide(current: u8, rate: u32, backlog: usize, cfg: &AdaptiveConfig) -> u8 {
    let max = cfg.max_param;
    let mid = max.saturating_sub(1).max(cfg.baseline_param);
    let low = max.saturating_sub(2).max(cfg.baseline_param);

    let mut next = current;
    if rate > cfg.rate_high {
        next = max;
    } else if rate > cfg.rate_mid {
        next = next.max(mid);
    } else if rate > cfg.rate_low {
        next = next.max(low);
    } else if rate < cfg.rate_floor && backlog < cfg.backlog_calm {
        next = cfg.baseline_param;
    }

    if backlog > cfg.backlog_large {
        next = max;
    } else if backlog > cfg.backlog_medium {
        next = next.max(mid);
    } else if backlog > cfg.backlog_small {
        next = next.max(low);
    }
    next
}

/// Mutable tuning state for one session
#[derive(Debug, Clone)]
pub struct AdaptiveState {
    pub current_param: u8,
    pub hits_since_last_tune: u32,
    /// `None` means the next check tunes unconditionally
    pub last_tune_at: Option<Instant>,
}

/// Result of a tuning pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retune {
    pub previous: u8,
    pub next: u8,
    pub rate: u32,
    pub backlog: usize,
}

pub struct AdaptiveController {
    cfg: AdaptiveConfig,
    state: Mutex<AdaptiveState>,
}

impl AdaptiveController {
    /// Start at the aggressive minimum with the first tune deferred
    pub fn new(cfg: AdaptiveConfig, session_start: Instant) -> Self {
        let first = session_start + Duration::from_millis(cfg.initial_delay_ms);
        Self {
            state: Mutex::new(AdaptiveState {
                current_param: cfg.min_param,
                hits_since_last_tune: 0,
                last_tune_at: Some(first),
            }),
            cfg,
        }
    }

    pub fn record_hits(&self, n: u32) {
        let mut state = self.state.lock();
        state.hits_since_last_tune = state.hits_since_last_tune.saturating_add(n);
    }

    /// Tune on the next check regardless of the interval
    pub fn force_next(&self) {
        self.state.lock().last_tune_at = None;
    }

    /// Overwrite the current parameter (bootstrap writes it directly)
    pub fn set_current(&self, param: u8) {
        self.state.lock().current_param = param;
    }

    pub fn current(&self) -> u8 {
        self.state.lock().current_param
    }

    pub fn snapshot(&self) -> AdaptiveState {
        self.state.lock().clone()
    }

    /// Run a tuning pass if the interval has elapsed
    ///
    /// # Returns
    /// `Some` only when the parameter changed
    pub fn maybe_retune(&self, now: Instant, backlog: usize) -> Option<Retune> {
        let mut state = self.state.lock();
        if let Some(last) = state.last_tune_at {
            if now.saturating_duration_since(last) < Duration::from_millis(self.cfg.min_interval_ms) {
                return None;
            }
        }
        state.last_tune_at = Some(now);
        let rate = std::mem::take(&mut state.hits_since_last_tune);
        let previous = state.current_param;
        let next = decide(previous, rate, backlog, &self.cfg);
        if next == previous {
            return None;
        }
        state.current_param = next;
        Some(Retune {
            previous,
            next,
            rate,
            backlog,
        })
    }
}
