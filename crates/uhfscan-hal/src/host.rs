// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::CallError;
use crate::value::HostValue;
use std::sync::Arc;

/// Which surface of the reader stack a host represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostRole {
    /// Low-level function surface
    Function,
    /// Manager surface (power, transport, high level inventory)
    Manager,
    /// Serial transport client
    SerialClient,
}

impl HostRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostRole::Function => "function",
            HostRole::Manager => "manager",
            HostRole::SerialClient => "serial",
        }
    }
}

/// Opaque handle to a resolved method, valid only for the host that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

/// Name and arity of a method a host can enumerate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub arity: usize,
}

/// Receiver for tags pushed by the reader
pub type TagCallback = Arc<dyn Fn(HostValue) + Send + Sync>;

/// A reader control surface
///
/// Implementations are expected to be cheap to call from several threads;
/// the bridge never holds its own locks while calling into a host.
pub trait CapabilityHost: Send + Sync {
    /// Host name for diagnostics
    fn name(&self) -> &str;

    /// Role used for priority ordering
    fn role(&self) -> HostRole;

    /// Look up a method by name and arity
    ///
    /// # Returns
    /// `None` when the host has no such method
    fn resolve(&self, name: &str, arity: usize) -> Option<MethodId>;

    /// Invoke a previously resolved method
    fn call(&self, method: MethodId, args: &[HostValue]) -> Result<HostValue, CallError>;

    /// Enumerate callable methods
    fn methods(&self) -> Vec<MethodSignature>;

    /// Register a push callback under a registration method name
    fn subscribe(&self, name: &str, _callback: TagCallback) -> Result<(), CallError> {
        // Default implementation - hosts with push delivery override
        Err(CallError::Unsupported(name.to_string()))
    }
}
