// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Capability host backed by a table of registered functions.
//!
//! Platform glue registers each vendor entry point it found under its name
//! and arity; the bridge then resolves against the table exactly as it would
//! against a statically implemented host.

use crate::error::CallError;
use crate::host::{CapabilityHost, HostRole, MethodId, MethodSignature, TagCallback};
use crate::value::HostValue;
use ahash::AHashMap;
use parking_lot::Mutex;

/// A registered entry point
pub type HostFn = Box<dyn Fn(&[HostValue]) -> Result<HostValue, CallError> + Send + Sync>;

struct Entry {
    name: String,
    arity: usize,
    func: HostFn,
}

/// Plugin-registered function table
pub struct FunctionTableHost {
    name: String,
    role: HostRole,
    entries: Vec<Entry>,
    index: AHashMap<String, Vec<(usize, u32)>>,
    subscription_points: Vec<String>,
    subscribers: Mutex<Vec<(String, TagCallback)>>,
}

impl FunctionTableHost {
    pub fn builder(name: impl Into<String>, role: HostRole) -> FunctionTableHostBuilder {
        FunctionTableHostBuilder {
            name: name.into(),
            role,
            entries: Vec::new(),
            subscription_points: Vec::new(),
        }
    }

    /// Deliver a pushed tag to every registered callback
    ///
    /// # Returns
    /// Number of callbacks invoked
    pub fn emit(&self, value: HostValue) -> usize {
        // Clone out so callbacks run without the lock held
        let callbacks: Vec<TagCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in &callbacks {
            cb(value.clone());
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl CapabilityHost for FunctionTableHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> HostRole {
        self.role
    }

    fn resolve(&self, name: &str, arity: usize) -> Option<MethodId> {
        self.index
            .get(name)?
            .iter()
            .find(|(a, _)| *a == arity)
            .map(|(_, id)| MethodId(*id))
    }

    fn call(&self, method: MethodId, args: &[HostValue]) -> Result<HostValue, CallError> {
        let entry = self
            .entries
            .get(method.0 as usize)
            .ok_or_else(|| CallError::Unsupported(format!("method #{}", method.0)))?;
        if entry.arity != args.len() {
            return Err(CallError::Arity {
                name: entry.name.clone(),
                expected: entry.arity,
                given: args.len(),
            });
        }
        (entry.func)(args)
    }

    fn methods(&self) -> Vec<MethodSignature> {
        self.entries
            .iter()
            .map(|e| MethodSignature {
                name: e.name.clone(),
                arity: e.arity,
            })
            .collect()
    }

    fn subscribe(&self, name: &str, callback: TagCallback) -> Result<(), CallError> {
        if !self.subscription_points.iter().any(|p| p == name) {
            return Err(CallError::Unsupported(name.to_string()));
        }
        self.subscribers.lock().push((name.to_string(), callback));
        Ok(())
    }
}

/// Builder for [`FunctionTableHost`]
pub struct FunctionTableHostBuilder {
    name: String,
    role: HostRole,
    entries: Vec<Entry>,
    subscription_points: Vec<String>,
}

impl FunctionTableHostBuilder {
    /// Register an entry point. Re-registering a name/arity pair replaces it.
    pub fn method<F>(mut self, name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue, CallError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.entries.retain(|e| !(e.name == name && e.arity == arity));
        self.entries.push(Entry {
            name,
            arity,
            func: Box::new(func),
        });
        self
    }

    /// Accept callback registration under `name`
    pub fn subscription_point(mut self, name: impl Into<String>) -> Self {
        self.subscription_points.push(name.into());
        self
    }

    pub fn build(self) -> FunctionTableHost {
        let mut index: AHashMap<String, Vec<(usize, u32)>> = AHashMap::new();
        for (i, e) in self.entries.iter().enumerate() {
            index.entry(e.name.clone()).or_default().push((e.arity, i as u32));
        }
        FunctionTableHost {
            name: self.name,
            role: self.role,
            entries: self.entries,
            index,
            subscription_points: self.subscription_points,
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn host() -> FunctionTableHost {
        FunctionTableHost::builder("uhfFunc", HostRole::Function)
            .method("setQ", 1, |args| match args[0] {
                HostValue::Int(_) => Ok(HostValue::Unit),
                ref other => Err(CallError::type_mismatch("setQ", other.kind())),
            })
            .method("getTags", 0, |_| Ok(HostValue::List(Vec::new())))
            .subscription_point("onTagEpcLog")
            .build()
    }

    #[test]
    fn test_resolve_by_name_and_arity() {
        let h = host();
        assert!(h.resolve("setQ", 1).is_some());
        assert!(h.resolve("setQ", 2).is_none());
        assert!(h.resolve("SetQValue", 1).is_none());
    }

    #[test]
    fn test_call_checks_arity_and_type() {
        let h = host();
        let id = h.resolve("setQ", 1).unwrap();
        assert_eq!(h.call(id, &[HostValue::Int(4)]), Ok(HostValue::Unit));
        assert!(matches!(h.call(id, &[]), Err(CallError::Arity { .. })));
        assert!(matches!(
            h.call(id, &[HostValue::from("4")]),
            Err(CallError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_re_registration_replaces_entry() {
        let h = FunctionTableHost::builder("mgr", HostRole::Manager)
            .method("powerOn", 0, |_| Err(CallError::fault("powerOn", "old")))
            .method("powerOn", 0, |_| Ok(HostValue::Bool(true)))
            .build();
        assert_eq!(h.methods().len(), 1);
        let id = h.resolve("powerOn", 0).unwrap();
        assert_eq!(h.call(id, &[]), Ok(HostValue::Bool(true)));
    }

    #[test]
    fn test_subscribe_and_emit() {
        let h = host();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let cb: TagCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(h.subscribe("addTagEpcLogListener", cb.clone()).is_err());
        h.subscribe("onTagEpcLog", cb).unwrap();

        assert_eq!(h.emit(HostValue::from("E200001122334455667788AA")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
