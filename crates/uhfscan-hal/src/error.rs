// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Outcome of a single call that did not succeed
///
/// Everything except [`CallError::Fault`] describes a capability that is simply
/// not there and is skipped silently by the bridge.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("method not supported: {0}")]
    Unsupported(String),

    #[error("{name} expects {expected} argument(s), got {given}")]
    Arity {
        name: String,
        expected: usize,
        given: usize,
    },

    #[error("argument type mismatch for {name}: {detail}")]
    TypeMismatch { name: String, detail: String },

    #[error("hardware fault in {name}: {detail}")]
    Fault { name: String, detail: String },
}

impl CallError {
    /// True when the error only means "this capability is not available".
    pub fn is_absence(&self) -> bool {
        !matches!(self, CallError::Fault { .. })
    }

    pub fn fault(name: impl Into<String>, detail: impl Into<String>) -> Self {
        CallError::Fault {
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn type_mismatch(name: impl Into<String>, detail: impl Into<String>) -> Self {
        CallError::TypeMismatch {
            name: name.into(),
            detail: detail.into(),
        }
    }
}

/// Errors raised while bringing the reader stack up
#[derive(Debug, Clone, thiserror::Error)]
pub enum HalError {
    #[error("no capability host could be resolved")]
    NoHosts,

    #[error("host provider failed: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absence_classification() {
        assert!(CallError::Unsupported("setQ".into()).is_absence());
        assert!(CallError::type_mismatch("setQ", "expected int").is_absence());
        assert!(!CallError::fault("readTagFromBuffer", "uart timeout").is_absence());
    }
}
