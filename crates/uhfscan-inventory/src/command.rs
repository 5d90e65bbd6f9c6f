// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport-neutral command envelope.
//!
//! A request names a method and carries loosely typed JSON arguments; the
//! service parses them per method so an unknown method and malformed
//! arguments can be told apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CODE_UHF_ERR: &str = "UHF_ERR";
pub const CODE_NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";
pub const CODE_BAD_ARGS: &str = "BAD_ARGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

impl CommandRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Value::Null,
        }
    }

    pub fn with_args(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Decode the arguments; `null` is treated as an empty object
    pub(crate) fn parse_args<T>(&self) -> Result<T, CommandReply>
    where
        T: serde::de::DeserializeOwned,
    {
        let args = match &self.args {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(args).map_err(|e| CommandReply::error(CODE_BAD_ARGS, e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandReply {
    Ok { value: Value },
    Error { code: String, message: String },
}

impl CommandReply {
    pub fn ok(value: impl Into<Value>) -> Self {
        CommandReply::Ok { value: value.into() }
    }

    pub fn empty() -> Self {
        CommandReply::Ok { value: Value::Null }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        CommandReply::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandReply::Ok { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            CommandReply::Ok { .. } => None,
            CommandReply::Error { code, .. } => Some(code),
        }
    }
}

/// `setPower` arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct PowerArgs {
    pub power: i32,
}

impl Default for PowerArgs {
    fn default() -> Self {
        Self { power: 30 }
    }
}

/// `setBeep` / `setVibrate` arguments
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToggleArgs {
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_wire_shape() {
        let reply = CommandReply::error(CODE_BAD_ARGS, "missing field");
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"status": "error", "code": "BAD_ARGS", "message": "missing field"})
        );
        assert_eq!(serde_json::to_value(CommandReply::ok("pong:x")).unwrap(), json!({"status": "ok", "value": "pong:x"}));
    }

    #[test]
    fn test_request_without_args() {
        let req: CommandRequest = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert_eq!(req.args, Value::Null);
        let power: PowerArgs = req.parse_args().unwrap();
        assert_eq!(power.power, 30);
    }

    #[test]
    fn test_malformed_args() {
        let req = CommandRequest::with_args("setBeep", json!({"enabled": "yes"}));
        let err = req.parse_args::<ToggleArgs>().unwrap_err();
        assert_eq!(err.code(), Some(CODE_BAD_ARGS));
    }
}
