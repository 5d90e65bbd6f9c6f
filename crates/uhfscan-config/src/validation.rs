// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within range and consistent with each
//! other (threshold ordering, clamp bounds, non-zero capacities).

use crate::{ConfigError, ConfigResult, UhfConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    OutOfRange { field: String, reason: String },
    Ordering { lower: String, upper: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, reason } => {
                write!(f, "{} is out of range: {}", field, reason)
            }
            Self::Ordering { lower, upper } => {
                write!(f, "{} must not exceed {}", lower, upper)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// All violations are collected and reported together.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &UhfConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_reader(config, &mut errors);
    validate_capacities(config, &mut errors);
    validate_adaptive(config, &mut errors);
    validate_snapshot(config, &mut errors);
    validate_rssi(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn ordered<T: PartialOrd>(
    lower: T,
    upper: T,
    lower_name: &str,
    upper_name: &str,
    errors: &mut Vec<ConfigValidationError>,
) {
    if lower > upper {
        errors.push(ConfigValidationError::Ordering {
            lower: lower_name.to_string(),
            upper: upper_name.to_string(),
        });
    }
}

fn validate_reader(config: &UhfConfig, errors: &mut Vec<ConfigValidationError>) {
    let reader = &config.reader;
    ordered(
        reader.min_power_dbm,
        reader.max_power_dbm,
        "reader.min_power_dbm",
        "reader.max_power_dbm",
        errors,
    );
    if reader.default_power_dbm < reader.min_power_dbm
        || reader.default_power_dbm > reader.max_power_dbm
    {
        errors.push(ConfigValidationError::OutOfRange {
            field: "reader.default_power_dbm".to_string(),
            reason: format!(
                "{} not within [{}, {}]",
                reader.default_power_dbm, reader.min_power_dbm, reader.max_power_dbm
            ),
        });
    }
    if reader.serial_baud_rates.iter().any(|b| *b == 0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "reader.serial_baud_rates".to_string(),
            reason: "baud rate must be non-zero".to_string(),
        });
    }
}

fn validate_capacities(config: &UhfConfig, errors: &mut Vec<ConfigValidationError>) {
    let checks = [
        ("backlog.capacity", config.backlog.capacity),
        ("dedup.capacity", config.dedup.capacity),
        ("push.chunk_size", config.push.chunk_size),
        ("ingest.max_pops_per_cycle", config.ingest.max_pops_per_cycle),
    ];
    for (field, value) in checks {
        if value == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
    }
    if config.backlog.capacity == 1 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "backlog.capacity".to_string(),
            reason: "must hold at least two observations".to_string(),
        });
    }
    if config.ingest.idle_streak_steps.len() != config.ingest.idle_sleep_steps_ms.len() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "ingest.idle_sleep_steps_ms".to_string(),
            reason: "needs one sleep per idle streak step".to_string(),
        });
    }
    if config
        .ingest
        .idle_streak_steps
        .windows(2)
        .any(|pair| pair[0] >= pair[1])
    {
        errors.push(ConfigValidationError::InvalidValue {
            field: "ingest.idle_streak_steps".to_string(),
            reason: "must be strictly increasing".to_string(),
        });
    }
}

fn validate_adaptive(config: &UhfConfig, errors: &mut Vec<ConfigValidationError>) {
    let a = &config.adaptive;
    ordered(a.min_param, a.baseline_param, "adaptive.min_param", "adaptive.baseline_param", errors);
    ordered(a.baseline_param, a.max_param, "adaptive.baseline_param", "adaptive.max_param", errors);
    if a.max_param > 15 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "adaptive.max_param".to_string(),
            reason: "anti-collision parameter is limited to 0..=15".to_string(),
        });
    }
    ordered(a.rate_floor, a.rate_low, "adaptive.rate_floor", "adaptive.rate_low", errors);
    ordered(a.rate_low, a.rate_mid, "adaptive.rate_low", "adaptive.rate_mid", errors);
    ordered(a.rate_mid, a.rate_high, "adaptive.rate_mid", "adaptive.rate_high", errors);
    ordered(a.backlog_small, a.backlog_medium, "adaptive.backlog_small", "adaptive.backlog_medium", errors);
    ordered(a.backlog_medium, a.backlog_large, "adaptive.backlog_medium", "adaptive.backlog_large", errors);
    if a.min_interval_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "adaptive.min_interval_ms".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
}

fn validate_snapshot(config: &UhfConfig, errors: &mut Vec<ConfigValidationError>) {
    let s = &config.snapshot;
    if s.min_hz <= 0.0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "snapshot.min_hz".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    ordered(s.min_hz, s.max_hz, "snapshot.min_hz", "snapshot.max_hz", errors);
    ordered(s.min_period_ms, s.max_period_ms, "snapshot.min_period_ms", "snapshot.max_period_ms", errors);
    if !(s.window_ratio > 0.0 && s.window_ratio < 1.0) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "snapshot.window_ratio".to_string(),
            reason: "must be within (0, 1) to leave a turnaround tail".to_string(),
        });
    }
}

fn validate_rssi(config: &UhfConfig, errors: &mut Vec<ConfigValidationError>) {
    let r = &config.rssi;
    ordered(r.warmup_gate_dbm, r.steady_gate_dbm, "rssi.warmup_gate_dbm", "rssi.steady_gate_dbm", errors);
    ordered(r.warmup_gate_dbm, r.rescue_gate_dbm, "rssi.warmup_gate_dbm", "rssi.rescue_gate_dbm", errors);
    if config.bootstrap.target_period_ms == 0 || config.bootstrap.watchdog_poll_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "bootstrap".to_string(),
            reason: "target_period_ms and watchdog_poll_ms must be greater than zero".to_string(),
        });
    }
}
