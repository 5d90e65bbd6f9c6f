// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Best-effort dispatch over the resolved capability hosts.
//!
//! The bridge owns no reader state. It keeps only a resolution cache of
//! `(host, name, arity) -> Option<MethodId>`, negative results included, so
//! probing a missing method costs one hash lookup after the first attempt.

use crate::action::{route, Dispatch, LogicalAction};
use crate::error::{CallError, HalError};
use crate::host::{CapabilityHost, HostRole, MethodId, TagCallback};
use crate::value::HostValue;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Serial transport open entry point (`(node, baud)` or `(baud)`)
const SERIAL_OPEN: &str = "openAndroidSerial";

/// Source of capability hosts, consulted once per bridge lifetime
pub trait HostProvider: Send + Sync {
    /// Resolve the reader's control surfaces
    ///
    /// Returning an empty list (or an error) means no reader is reachable.
    fn open(&self) -> Result<Vec<Arc<dyn CapabilityHost>>, HalError>;
}

/// Provider over an already-built set of hosts
pub struct StaticHosts(pub Vec<Arc<dyn CapabilityHost>>);

impl HostProvider for StaticHosts {
    fn open(&self) -> Result<Vec<Arc<dyn CapabilityHost>>, HalError> {
        Ok(self.0.clone())
    }
}

/// A resolved host, tagged with its slot in the bridge
#[derive(Clone)]
pub struct HostHandle {
    slot: usize,
    host: Arc<dyn CapabilityHost>,
}

impl HostHandle {
    pub fn name(&self) -> &str {
        self.host.name()
    }

    pub fn role(&self) -> HostRole {
        self.host.role()
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("slot", &self.slot)
            .field("name", &self.host.name())
            .field("role", &self.host.role())
            .finish()
    }
}

type ArityCache = Vec<(usize, Option<MethodId>)>;

/// Capability bridge
pub struct CapabilityBridge {
    provider: Box<dyn HostProvider>,
    hosts: RwLock<Vec<HostHandle>>,
    resolutions: RwLock<Vec<AHashMap<String, ArityCache>>>,
}

impl CapabilityBridge {
    pub fn new(provider: Box<dyn HostProvider>) -> Self {
        Self {
            provider,
            hosts: RwLock::new(Vec::new()),
            resolutions: RwLock::new(Vec::new()),
        }
    }

    /// Bridge over a fixed host set
    pub fn with_hosts(hosts: Vec<Arc<dyn CapabilityHost>>) -> Self {
        Self::new(Box::new(StaticHosts(hosts)))
    }

    /// Resolve hosts through the provider if not done yet
    ///
    /// # Returns
    /// Number of available hosts
    ///
    /// # Errors
    /// [`HalError::NoHosts`] when the provider yields nothing
    pub fn ensure_open(&self) -> Result<usize, HalError> {
        {
            let hosts = self.hosts.read();
            if !hosts.is_empty() {
                return Ok(hosts.len());
            }
        }

        let mut hosts = self.hosts.write();
        if !hosts.is_empty() {
            return Ok(hosts.len());
        }

        let mut opened = self.provider.open()?;
        if opened.is_empty() {
            return Err(HalError::NoHosts);
        }
        // Stable: hosts sharing a role keep provider order
        opened.sort_by_key(|h| h.role());

        *hosts = opened
            .into_iter()
            .enumerate()
            .map(|(slot, host)| HostHandle { slot, host })
            .collect();
        *self.resolutions.write() = vec![AHashMap::new(); hosts.len()];

        let names: Vec<String> = hosts
            .iter()
            .map(|h| format!("{}({})", h.name(), h.role().as_str()))
            .collect();
        info!("[UHF-HAL] Resolved {} capability host(s): {}", hosts.len(), names.join(", "));
        Ok(hosts.len())
    }

    pub fn is_open(&self) -> bool {
        !self.hosts.read().is_empty()
    }

    /// Drop resolved hosts and cached resolutions
    pub fn close(&self) {
        self.hosts.write().clear();
        self.resolutions.write().clear();
    }

    /// All hosts in priority order
    pub fn hosts(&self) -> Vec<HostHandle> {
        self.hosts.read().clone()
    }

    /// Hosts filtered and ordered by `roles`
    pub fn hosts_for(&self, roles: &[HostRole]) -> Vec<HostHandle> {
        let hosts = self.hosts.read();
        roles
            .iter()
            .flat_map(|role| hosts.iter().filter(move |h| h.role() == *role).cloned())
            .collect()
    }

    fn resolve_cached(&self, handle: &HostHandle, name: &str, arity: usize) -> Option<MethodId> {
        let cached = self
            .resolutions
            .read()
            .get(handle.slot)
            .and_then(|m| m.get(name))
            .and_then(|entries| entries.iter().find(|(a, _)| *a == arity))
            .map(|(_, id)| *id);
        if let Some(hit) = cached {
            return hit;
        }

        let resolved = handle.host.resolve(name, arity);
        if let Some(slot) = self.resolutions.write().get_mut(handle.slot) {
            let entries = slot.entry(name.to_string()).or_default();
            if !entries.iter().any(|(a, _)| *a == arity) {
                entries.push((arity, resolved));
            }
        }
        resolved
    }

    /// Invoke `name` on `handle`, surfacing the failure kind
    pub fn call(&self, handle: &HostHandle, name: &str, args: &[HostValue]) -> Result<HostValue, CallError> {
        let Some(id) = self.resolve_cached(handle, name, args.len()) else {
            return Err(CallError::Unsupported(name.to_string()));
        };
        handle.host.call(id, args)
    }

    /// True when `name` with `arity` exists on `handle`
    pub fn supports(&self, handle: &HostHandle, name: &str, arity: usize) -> bool {
        self.resolve_cached(handle, name, arity).is_some()
    }

    /// Invoke and swallow every failure
    ///
    /// Absence is silent; faults are logged at debug level.
    pub fn try_invoke(&self, handle: &HostHandle, name: &str, args: &[HostValue]) -> Option<HostValue> {
        match self.call(handle, name, args) {
            Ok(v) => Some(v),
            Err(e) if e.is_absence() => {
                trace!("[UHF-HAL] {}.{} unavailable: {}", handle.name(), name, e);
                None
            }
            Err(e) => {
                debug!("[UHF-HAL] {}.{} failed: {}", handle.name(), name, e);
                None
            }
        }
    }

    /// Try `names` in order on one host until one succeeds
    pub fn invoke_any(&self, handle: &HostHandle, names: &[&str], args: &[HostValue]) -> bool {
        names
            .iter()
            .any(|name| self.try_invoke(handle, name, args).is_some())
    }

    /// Route a logical action over the hosts
    ///
    /// # Returns
    /// `true` if at least one candidate succeeded. Read and subscribe actions
    /// always return `false` here; see [`Self::read_plan`] and
    /// [`Self::register_tag_callback`].
    pub fn perform(&self, action: LogicalAction, args: &[HostValue]) -> bool {
        let route = route(action);
        let hosts = self.hosts_for(route.roles);

        match route.dispatch {
            Dispatch::FirstSuccess => {
                for host in &hosts {
                    for candidate in route.candidates {
                        let Some(built) = candidate.args.build(args) else {
                            continue;
                        };
                        if self.try_invoke(host, candidate.name, &built).is_some() {
                            trace!("[UHF-HAL] {:?} via {}.{}", action, host.name(), candidate.name);
                            return true;
                        }
                    }
                }
                false
            }
            Dispatch::Broadcast => {
                let mut any = false;
                for host in &hosts {
                    for candidate in route.candidates {
                        let Some(built) = candidate.args.build(args) else {
                            continue;
                        };
                        if self.try_invoke(host, candidate.name, &built).is_some() {
                            any = true;
                        }
                    }
                }
                any
            }
            Dispatch::Drain | Dispatch::Subscribe => {
                debug!("[UHF-HAL] {:?} cannot be performed directly", action);
                false
            }
        }
    }

    /// Candidate names for a read action, in order
    pub fn read_candidates(action: LogicalAction) -> Vec<&'static str> {
        route(action).candidates.iter().map(|c| c.name).collect()
    }

    /// Zero-argument `(host, name)` pairs that actually exist for a read action
    pub fn read_plan(&self, action: LogicalAction) -> Vec<(HostHandle, &'static str)> {
        let route = route(action);
        let mut plan = Vec::new();
        for host in self.hosts_for(route.roles) {
            for candidate in route.candidates {
                if self.supports(&host, candidate.name, 0) {
                    plan.push((host.clone(), candidate.name));
                }
            }
        }
        plan
    }

    /// Names of every zero-argument method a host enumerates
    pub fn zero_arg_methods(&self, handle: &HostHandle) -> Vec<String> {
        handle
            .host
            .methods()
            .into_iter()
            .filter(|m| m.arity == 0)
            .map(|m| m.name)
            .collect()
    }

    /// Register a push callback on the first host that accepts it
    pub fn register_tag_callback(&self, callback: TagCallback) -> bool {
        let route = route(LogicalAction::RegisterTagCallback);
        for host in self.hosts_for(route.roles) {
            for candidate in route.candidates {
                match host.host.subscribe(candidate.name, callback.clone()) {
                    Ok(()) => {
                        info!("[UHF-HAL] Tag callback registered via {}.{}", host.name(), candidate.name);
                        return true;
                    }
                    Err(e) => trace!("[UHF-HAL] {}.{} refused: {}", host.name(), candidate.name, e),
                }
            }
        }
        debug!("[UHF-HAL] No host accepts a tag callback");
        false
    }

    /// Open the serial transport on the serial client host(s)
    ///
    /// Baud rates are the outer loop; the first combination that opens wins.
    pub fn open_serial(&self, nodes: &[String], bauds: &[u32]) -> bool {
        for host in self.hosts_for(&[HostRole::SerialClient]) {
            if self.supports(&host, SERIAL_OPEN, 2) {
                for baud in bauds {
                    for node in nodes {
                        let args = [HostValue::from(node.as_str()), HostValue::Int(*baud as i64)];
                        if self.try_invoke(&host, SERIAL_OPEN, &args).is_some() {
                            info!("[UHF-HAL] Serial opened on {} @ {}", node, baud);
                            return true;
                        }
                    }
                }
            } else if self.supports(&host, SERIAL_OPEN, 1) {
                for baud in bauds {
                    if self.try_invoke(&host, SERIAL_OPEN, &[HostValue::Int(*baud as i64)]).is_some() {
                        info!("[UHF-HAL] Serial opened @ {}", baud);
                        return true;
                    }
                }
            }
        }
        false
    }
}
