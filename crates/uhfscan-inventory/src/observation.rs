// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tag observations and their wire form.

use crate::rssi;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Minimum identifier length, in hex characters
pub const MIN_IDENTIFIER_LEN: usize = 20;

/// One sighting of a tag. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TagObservation {
    identifier: String,
    signal_raw: i32,
    signal_dbm: i32,
    has_signal: bool,
    observed_at: Instant,
}

impl TagObservation {
    /// Build an observation
    ///
    /// The identifier is trimmed and uppercased; it must be at least
    /// [`MIN_IDENTIFIER_LEN`] hex characters. A missing signal is recorded as
    /// `fallback_dbm` and flagged as unreported.
    ///
    /// # Returns
    /// `None` for a malformed identifier
    pub fn new(identifier: &str, signal_raw: Option<i32>, fallback_dbm: i32, observed_at: Instant) -> Option<Self> {
        let identifier = canonical_identifier(identifier)?;
        let has_signal = signal_raw.is_some();
        let raw = signal_raw.unwrap_or(fallback_dbm);
        Some(Self {
            identifier,
            signal_raw: raw,
            signal_dbm: rssi::normalize(raw),
            has_signal,
            observed_at,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn signal_raw(&self) -> i32 {
        self.signal_raw
    }

    pub fn signal_dbm(&self) -> i32 {
        self.signal_dbm
    }

    /// Whether the reader actually reported a signal strength
    pub fn has_signal(&self) -> bool {
        self.has_signal
    }

    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    pub fn to_record(&self) -> TagRecord {
        TagRecord {
            identifier: self.identifier.clone(),
            signal_raw: self.signal_raw,
            signal_dbm: self.signal_dbm,
        }
    }
}

/// Uppercased hex identifier, or `None` if it is not one
pub fn canonical_identifier(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.len() < MIN_IDENTIFIER_LEN || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

/// Observation as delivered to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub identifier: String,
    pub signal_raw: i32,
    pub signal_dbm: i32,
}

impl From<&TagObservation> for TagRecord {
    fn from(obs: &TagObservation) -> Self {
        obs.to_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_canonicalized() {
        let obs = TagObservation::new(" e2801160600002084d4bb3a1 ", Some(-48), -70, Instant::now()).unwrap();
        assert_eq!(obs.identifier(), "E2801160600002084D4BB3A1");
        assert!(obs.has_signal());
    }

    #[test]
    fn test_malformed_identifiers_rejected() {
        let now = Instant::now();
        assert!(TagObservation::new("", None, -70, now).is_none());
        assert!(TagObservation::new("E2801160", None, -70, now).is_none());
        assert!(TagObservation::new("E2801160600002084D4BB3AZ", None, -70, now).is_none());
    }

    #[test]
    fn test_signal_normalized_on_construction() {
        let now = Instant::now();
        let raw = TagObservation::new("E2801160600002084D4BB3A1", Some(150), -70, now).unwrap();
        assert_eq!(raw.signal_raw(), 150);
        assert_eq!(raw.signal_dbm(), -60);

        let missing = TagObservation::new("E2801160600002084D4BB3A1", None, -70, now).unwrap();
        assert!(!missing.has_signal());
        assert_eq!(missing.signal_dbm(), -70);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let obs = TagObservation::new("E2801160600002084D4BB3A1", Some(-55), -70, Instant::now()).unwrap();
        let json = serde_json::to_value(obs.to_record()).unwrap();
        assert_eq!(json["identifier"], "E2801160600002084D4BB3A1");
        assert_eq!(json["signalRaw"], -55);
        assert_eq!(json["signalDbm"], -55);
    }
}
