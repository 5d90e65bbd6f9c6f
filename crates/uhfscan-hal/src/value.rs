// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt;

/// A value passed to or returned from a capability host
///
/// `Unit` doubles as "nothing returned": a read that yields `Unit` means the
/// reader had nothing pending.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<HostValue>),
    /// Named fields of a vendor tag object (`epc`, `rssi`, ...)
    Record(BTreeMap<String, HostValue>),
}

impl HostValue {
    /// Build a record from field pairs
    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, HostValue)>,
        K: Into<String>,
    {
        HostValue::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, HostValue::Unit)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(v) => Some(*v),
            HostValue::Float(v) if v.is_finite() => Some(v.round() as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(v) => Some(*v),
            HostValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Field lookup on a record (case-insensitive on the field name)
    pub fn field(&self, name: &str) -> Option<&HostValue> {
        match self {
            HostValue::Record(fields) => fields
                .get(name)
                .or_else(|| {
                    fields
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .map(|(_, v)| v)
                }),
            _ => None,
        }
    }

    /// Short type name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Unit => "unit",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Text(_) => "text",
            HostValue::Bytes(_) => "bytes",
            HostValue::List(_) => "list",
            HostValue::Record(_) => "record",
        }
    }
}

/// Textual rendering, used when a value has to be scanned for an identifier
impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Unit => write!(f, "null"),
            HostValue::Bool(v) => write!(f, "{}", v),
            HostValue::Int(v) => write!(f, "{}", v),
            HostValue::Float(v) => write!(f, "{}", v),
            HostValue::Text(s) => write!(f, "{}", s),
            HostValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            HostValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            HostValue::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Int(v as i64)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<u8> for HostValue {
    fn from(v: u8) -> Self {
        HostValue::Int(v as i64)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Text(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Text(v)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(v: Vec<u8>) -> Self {
        HostValue::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field_lookup_ignores_case() {
        let tag = HostValue::record([("EPC", HostValue::from("E2801160")), ("rssi", HostValue::from(-55))]);
        assert_eq!(tag.field("epc").and_then(HostValue::as_str), Some("E2801160"));
        assert_eq!(tag.field("RSSI").and_then(HostValue::as_i64), Some(-55));
        assert!(tag.field("tid").is_none());
    }

    #[test]
    fn test_display_renders_nested_values() {
        let value = HostValue::List(vec![HostValue::from("a"), HostValue::Int(3), HostValue::Bytes(b"xy".to_vec())]);
        assert_eq!(value.to_string(), "[a, 3, xy]");
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(HostValue::Float(-61.6).as_i64(), Some(-62));
        assert_eq!(HostValue::Float(f64::NAN).as_i64(), None);
        assert_eq!(HostValue::Int(1).as_bool(), Some(true));
        assert_eq!(HostValue::from("1").as_i64(), None);
    }
}
