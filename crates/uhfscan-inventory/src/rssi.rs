// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Signal strength normalization and gating.

use crate::observation::TagObservation;
use std::sync::atomic::{AtomicI32, Ordering};

const RAW_CODE_MAX: i32 = 300;
const RAW_FLOOR_DBM: i32 = -90;
const RAW_SPAN_DBM: i32 = 60;

/// Map a raw reader code to dBm
///
/// Codes in `(0, 300]` scale linearly onto `[-90, -30]` dBm; anything else is
/// taken to be dBm already.
pub fn normalize(raw: i32) -> i32 {
    if raw > 0 && raw <= RAW_CODE_MAX {
        RAW_FLOOR_DBM + raw * RAW_SPAN_DBM / RAW_CODE_MAX
    } else {
        raw
    }
}

/// True if `dbm` passes `threshold`
pub fn gate(dbm: i32, threshold: i32) -> bool {
    dbm >= threshold
}

/// Session-wide gate threshold, retargeted by the bootstrap sequencer
#[derive(Debug)]
pub struct SignalGate {
    threshold: AtomicI32,
}

impl SignalGate {
    pub fn new(threshold_dbm: i32) -> Self {
        Self {
            threshold: AtomicI32::new(threshold_dbm),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold.load(Ordering::Relaxed)
    }

    pub fn set_threshold(&self, dbm: i32) {
        self.threshold.store(dbm, Ordering::Relaxed);
    }

    /// Observations without a reported signal are always admitted
    pub fn admits(&self, obs: &TagObservation) -> bool {
        !obs.has_signal() || gate(obs.signal_dbm(), self.threshold())
    }
}
