// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Turning whatever a read surface returned into observations.
//!
//! Records are read field by field; text, byte buffers and anything else are
//! scanned for the longest hex run (the identifier) and a `<n> dBm` figure.

use crate::observation::{canonical_identifier, TagObservation};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use uhfscan_hal::HostValue;

static HEX_RUN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[A-Fa-f0-9]{20,}").ok());
static SIGNAL_DBM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)(-?\d{1,3})\s*dbm").ok());

const IDENTIFIER_FIELDS: &[&str] = &["epc"];
const SIGNAL_FIELDS: &[&str] = &["rssi", "rssiDbm", "readRssi", "dbm"];

/// Longest run of 20+ hex characters, uppercased. Ties keep the first run.
pub fn longest_hex_run(text: &str) -> Option<String> {
    let re = HEX_RUN.as_ref()?;
    let mut best: Option<&str> = None;
    for m in re.find_iter(text) {
        if best.map_or(true, |b| m.as_str().len() > b.len()) {
            best = Some(m.as_str());
        }
    }
    best.map(|s| s.to_ascii_uppercase())
}

/// First signed integer followed by `dBm`
pub fn signal_from_text(text: &str) -> Option<i32> {
    let re = SIGNAL_DBM.as_ref()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Interpret one value returned by a read surface
pub fn observation_from_value(value: &HostValue, fallback_dbm: i32, now: Instant) -> Option<TagObservation> {
    match value {
        HostValue::Unit | HostValue::Bool(_) | HostValue::Int(_) | HostValue::Float(_) => None,
        HostValue::Text(text) => observation_from_text(text, fallback_dbm, now),
        HostValue::Bytes(bytes) => observation_from_text(&String::from_utf8_lossy(bytes), fallback_dbm, now),
        HostValue::Record(_) => {
            let rendered = value.to_string();
            let identifier = IDENTIFIER_FIELDS
                .iter()
                .filter_map(|f| value.field(f))
                .find_map(|v| match v {
                    HostValue::Text(s) => canonical_identifier(s).or_else(|| longest_hex_run(s)),
                    _ => None,
                })
                .or_else(|| longest_hex_run(&rendered))?;
            let signal = SIGNAL_FIELDS
                .iter()
                .filter_map(|f| value.field(f))
                .find_map(HostValue::as_i64)
                .and_then(|v| i32::try_from(v).ok())
                .or_else(|| signal_from_text(&rendered));
            TagObservation::new(&identifier, signal, fallback_dbm, now)
        }
        HostValue::List(_) => observation_from_text(&value.to_string(), fallback_dbm, now),
    }
}

fn observation_from_text(text: &str, fallback_dbm: i32, now: Instant) -> Option<TagObservation> {
    let identifier = longest_hex_run(text)?;
    TagObservation::new(&identifier, signal_from_text(text), fallback_dbm, now)
}

/// Interpret a batch result: lists are expanded item by item
pub fn observations_from_batch(value: &HostValue, fallback_dbm: i32, now: Instant) -> Vec<TagObservation> {
    match value {
        HostValue::List(items) => items
            .iter()
            .filter_map(|item| observation_from_value(item, fallback_dbm, now))
            .collect(),
        other => observation_from_value(other, fallback_dbm, now).into_iter().collect(),
    }
}

/// Raw buffer contents, from bytes or a list of byte-valued integers
pub fn bytes_from_value(value: &HostValue) -> Option<Vec<u8>> {
    match value {
        HostValue::Bytes(b) if !b.is_empty() => Some(b.clone()),
        HostValue::List(items) if !items.is_empty() => items
            .iter()
            .map(|i| i.as_i64().and_then(|v| u8::try_from(v).ok()))
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_hex_run_wins() {
        let text = "id=300833B2DDD9014000000000 tid=E2801160600002084D4BB3A1FFEE rssi=-51dBm";
        assert_eq!(longest_hex_run(text).as_deref(), Some("E2801160600002084D4BB3A1FFEE"));
        assert_eq!(longest_hex_run("deadbeef"), None);
        assert_eq!(
            longest_hex_run("abcdefabcdefabcdefab").as_deref(),
            Some("ABCDEFABCDEFABCDEFAB")
        );
    }

    #[test]
    fn test_signal_requires_dbm_suffix() {
        assert_eq!(signal_from_text("EPC:E2801160600002084D4BB3A1 RSSI:-58 dBm"), Some(-58));
        assert_eq!(signal_from_text("rssi -61DBM"), Some(-61));
        assert_eq!(signal_from_text("count 12"), None);
    }

    #[test]
    fn test_record_fields_preferred() {
        let tag = HostValue::record([
            ("epc", HostValue::from("e2801160600002084d4bb3a1")),
            ("rssiDbm", HostValue::Float(-47.2)),
        ]);
        let obs = observation_from_value(&tag, -70, Instant::now()).unwrap();
        assert_eq!(obs.identifier(), "E2801160600002084D4BB3A1");
        assert_eq!(obs.signal_raw(), -47);
    }

    #[test]
    fn test_record_without_epc_field_is_scanned() {
        let tag = HostValue::record([("data", HostValue::from("3000E2801160600002084D4BB3A1"))]);
        let obs = observation_from_value(&tag, -70, Instant::now()).unwrap();
        assert_eq!(obs.identifier(), "3000E2801160600002084D4BB3A1");
        assert!(!obs.has_signal());
        assert_eq!(obs.signal_dbm(), -70);
    }

    #[test]
    fn test_non_tag_values_rejected() {
        let now = Instant::now();
        assert!(observation_from_value(&HostValue::Unit, -70, now).is_none());
        assert!(observation_from_value(&HostValue::Int(7), -70, now).is_none());
        assert!(observation_from_value(&HostValue::from("no tag here"), -70, now).is_none());
    }

    #[test]
    fn test_batch_expands_lists() {
        let batch = HostValue::List(vec![
            HostValue::from("E2801160600002084D4BB3A1 -50dBm"),
            HostValue::Unit,
            HostValue::from("E2801160600002084D4BB3A2"),
        ]);
        let obs = observations_from_batch(&batch, -70, Instant::now());
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].signal_raw(), -50);
    }

    #[test]
    fn test_bytes_from_int_list() {
        let raw = HostValue::List(b"E2801160600002084D4BB3A1".iter().map(|b| HostValue::Int(*b as i64)).collect());
        let bytes = bytes_from_value(&raw).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "E2801160600002084D4BB3A1");
        assert!(bytes_from_value(&HostValue::Bytes(Vec::new())).is_none());
        assert!(bytes_from_value(&HostValue::List(vec![HostValue::from("x")])).is_none());
    }

    #[test]
    fn test_out_of_range_list_is_not_a_buffer() {
        let raw = HostValue::List(vec![HostValue::Int(0x45), HostValue::Int(0x145), HostValue::Int(-1)]);
        assert!(bytes_from_value(&raw).is_none());
        let raw = HostValue::List(vec![HostValue::Int(0), HostValue::Int(255)]);
        assert_eq!(bytes_from_value(&raw), Some(vec![0, 255]));
    }
}
