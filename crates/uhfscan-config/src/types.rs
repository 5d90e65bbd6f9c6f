// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `uhfscan.toml`. Durations are expressed in milliseconds, signal levels in dBm.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UhfConfig {
    pub reader: ReaderConfig,
    pub ingest: IngestConfig,
    pub rssi: RssiConfig,
    pub dedup: DedupConfig,
    pub backlog: BacklogConfig,
    pub push: PushConfig,
    pub adaptive: AdaptiveConfig,
    pub snapshot: SnapshotConfig,
    pub bootstrap: BootstrapConfig,
    pub alerts: AlertConfig,
    pub logging: LoggingConfig,
}

/// Reader power-up and transport settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Power applied right after power-up
    pub default_power_dbm: i32,
    pub min_power_dbm: i32,
    pub max_power_dbm: i32,
    /// Serial device nodes tried when opening the serial client
    pub serial_nodes: Vec<String>,
    /// Baud rates tried per node, fastest first
    pub serial_baud_rates: Vec<u32>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            default_power_dbm: 30,
            min_power_dbm: 5,
            max_power_dbm: 30,
            serial_nodes: vec![
                "/dev/ttyS4".to_string(),
                "/dev/ttyS3".to_string(),
                "/dev/ttyHSL0".to_string(),
                "/dev/ttyMT2".to_string(),
            ],
            serial_baud_rates: vec![921_600, 460_800, 230_400, 115_200],
        }
    }
}

/// Ingestion loop cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Minimum gap between expensive sweeps (text, raw buffer, brute force)
    pub expensive_poll_interval_ms: u64,
    /// Sleep after a transient hardware fault
    pub fault_backoff_ms: u64,
    /// Upper bound on consecutive pops from one candidate in a single cycle
    pub max_pops_per_cycle: usize,
    /// Empty-cycle streak thresholds at which the idle sleep grows
    pub idle_streak_steps: Vec<u32>,
    /// Idle sleep applied once the matching streak step is reached
    pub idle_sleep_steps_ms: Vec<u64>,
    /// Streak counter cap
    pub idle_streak_cap: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            expensive_poll_interval_ms: 60,
            fault_backoff_ms: 6,
            max_pops_per_cycle: 4096,
            idle_streak_steps: vec![4, 24, 60],
            idle_sleep_steps_ms: vec![1, 2, 3],
            idle_streak_cap: 200,
        }
    }
}

/// Signal strength gate regimes
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RssiConfig {
    /// Gate applied while warming up
    pub warmup_gate_dbm: i32,
    /// Gate applied in steady state
    pub steady_gate_dbm: i32,
    /// Gate applied by the rescue watchdog
    pub rescue_gate_dbm: i32,
    /// Value reported when the reader gives no signal strength
    pub fallback_dbm: i32,
}

impl Default for RssiConfig {
    fn default() -> Self {
        Self {
            warmup_gate_dbm: -90,
            steady_gate_dbm: -62,
            rescue_gate_dbm: -78,
            fallback_dbm: -70,
        }
    }
}

/// Short-window duplicate suppression
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub debounce_ms: u64,
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 4,
            capacity: 4096,
        }
    }
}

/// Delivery backlog bound
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BacklogConfig {
    pub capacity: usize,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self { capacity: 12_000 }
    }
}

/// Push scheduler pacing and stall recovery
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PushConfig {
    pub chunk_size: usize,
    pub min_gap_ms: u64,
    /// A delivered batch smaller than this counts as "small"
    pub stall_batch_max: usize,
    /// Remaining backlog above this counts as "large"
    pub stall_backlog_min: usize,
    pub stall_cooldown_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            min_gap_ms: 3,
            stall_batch_max: 8,
            stall_backlog_min: 500,
            stall_cooldown_ms: 380,
        }
    }
}

/// Anti-collision parameter (Q) tuning table
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub min_interval_ms: u64,
    /// Extra delay before the first tune of a session
    pub initial_delay_ms: u64,
    pub min_param: u8,
    pub baseline_param: u8,
    pub max_param: u8,
    pub rate_high: u32,
    pub rate_mid: u32,
    pub rate_low: u32,
    pub rate_floor: u32,
    pub backlog_calm: usize,
    pub backlog_large: usize,
    pub backlog_medium: usize,
    pub backlog_small: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 200,
            initial_delay_ms: 400,
            min_param: 0,
            baseline_param: 3,
            max_param: 6,
            rate_high: 600,
            rate_mid: 240,
            rate_low: 100,
            rate_floor: 35,
            backlog_calm: 80,
            backlog_large: 1500,
            backlog_medium: 700,
            backlog_small: 260,
        }
    }
}

/// Burst snapshot mode
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub default_hz: f64,
    pub min_hz: f64,
    pub max_hz: f64,
    pub min_period_ms: u64,
    pub max_period_ms: u64,
    /// Fraction of the period spent collecting
    pub window_ratio: f64,
    pub min_window_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_hz: 1.0,
            min_hz: 0.5,
            max_hz: 4.5,
            min_period_ms: 220,
            max_period_ms: 1000,
            window_ratio: 0.86,
            min_window_ms: 180,
        }
    }
}

/// Fast-start sequence and rescue watchdog
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub warmup_ms: u64,
    /// Target alternation runs until this deadline
    pub fast_start_ms: u64,
    pub first_hit_deadline_ms: u64,
    pub target_period_ms: u64,
    pub rescue_target_ms: u64,
    pub watchdog_poll_ms: u64,
    /// Pause between stop and start when a reset action is unavailable
    pub reset_pause_ms: u64,
    pub region: i64,
    pub channel: i64,
    pub frequency_khz: i64,
    pub profile: i64,
    pub session: i64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 900,
            fast_start_ms: 1500,
            first_hit_deadline_ms: 800,
            target_period_ms: 40,
            rescue_target_ms: 1200,
            watchdog_poll_ms: 40,
            reset_pause_ms: 100,
            region: 1,
            channel: 6,
            frequency_khz: 922_625,
            profile: 3,
            session: 0,
        }
    }
}

/// Feedback pacing for the (external) beep/vibrate collaborator
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    pub beep_gap_ms: u64,
    pub vibrate_gap_ms: u64,
    pub vibrate_duration_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            beep_gap_ms: 200,
            vibrate_gap_ms: 240,
            vibrate_duration_ms: 14,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: String,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: "./logs".to_string(),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
