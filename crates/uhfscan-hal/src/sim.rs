// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory reader.
//!
//! Builds a function host and a manager host over shared state: queued tags
//! are served through one configurable read surface, tuning calls are
//! recorded, and tags can be pushed to registered callbacks.

use crate::bridge::StaticHosts;
use crate::error::CallError;
use crate::host::{CapabilityHost, HostRole};
use crate::table::{FunctionTableHost, FunctionTableHostBuilder};
use crate::value::HostValue;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Read surface exposed by the simulated function host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSurface {
    /// `readTagFromBuffer`, one record per call
    Pop,
    /// `getTagList`, everything pending as a list
    List,
    /// `readEpcLog`, one text line per call
    Text,
    /// `getBuffer`, one byte buffer per call
    Raw,
    /// Only a vendor-specific `dumpEpcCache` method reachable by enumeration
    Hidden,
}

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct SimCall {
    pub host: &'static str,
    pub method: String,
    pub args: Vec<HostValue>,
}

#[derive(Default)]
struct SimState {
    pending: Mutex<VecDeque<(String, Option<i64>)>>,
    calls: Mutex<Vec<SimCall>>,
    inventory_running: AtomicBool,
    power: AtomicI64,
    faults: AtomicUsize,
    reads: AtomicUsize,
}

impl SimState {
    fn record(&self, host: &'static str, method: &str, args: &[HostValue]) {
        self.calls.lock().push(SimCall {
            host,
            method: method.to_string(),
            args: args.to_vec(),
        });
    }

    /// Shared read prologue; returns an injected fault if one is armed
    fn begin_read(&self, method: &str) -> Result<(), CallError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let armed = self
            .faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(CallError::fault(method, "injected fault"));
        }
        Ok(())
    }

    fn pop(&self) -> Option<(String, Option<i64>)> {
        self.pending.lock().pop_front()
    }
}

fn tag_record(epc: String, rssi: Option<i64>) -> HostValue {
    let mut fields = vec![("epc", HostValue::Text(epc))];
    if let Some(r) = rssi {
        fields.push(("rssi", HostValue::Int(r)));
    }
    HostValue::record(fields)
}

fn tag_line(epc: &str, rssi: Option<i64>) -> String {
    match rssi {
        Some(r) => format!("EPC:{} RSSI:{}dBm", epc, r),
        None => format!("EPC:{}", epc),
    }
}

/// Scripted reader with a function host and a manager host
pub struct SimulatedReader {
    state: Arc<SimState>,
    function: Arc<FunctionTableHost>,
    manager: Arc<FunctionTableHost>,
}

impl SimulatedReader {
    pub fn new(surface: SimSurface) -> Self {
        let state = Arc::new(SimState::default());
        let function = Arc::new(Self::build_function(&state, surface));
        let manager = Arc::new(Self::build_manager(&state));
        Self {
            state,
            function,
            manager,
        }
    }

    fn recorded<F>(
        builder: FunctionTableHostBuilder,
        state: &Arc<SimState>,
        host: &'static str,
        name: &'static str,
        arity: usize,
        then: F,
    ) -> FunctionTableHostBuilder
    where
        F: Fn(&SimState, &[HostValue]) -> Result<HostValue, CallError> + Send + Sync + 'static,
    {
        let state = state.clone();
        builder.method(name, arity, move |args| {
            state.record(host, name, args);
            then(&state, args)
        })
    }

    fn build_function(state: &Arc<SimState>, surface: SimSurface) -> FunctionTableHost {
        const HOST: &str = "uhfFunc";
        let unit = |_: &SimState, _: &[HostValue]| Ok(HostValue::Unit);

        let mut b = FunctionTableHost::builder(HOST, HostRole::Function);
        b = Self::recorded(b, state, HOST, "startInventoryTag", 0, |s, _| {
            s.inventory_running.store(true, Ordering::SeqCst);
            Ok(HostValue::Bool(true))
        });
        b = Self::recorded(b, state, HOST, "stopInventory", 0, |s, _| {
            s.inventory_running.store(false, Ordering::SeqCst);
            Ok(HostValue::Bool(true))
        });
        b = Self::recorded(b, state, HOST, "inventoryReset", 0, unit);
        b = Self::recorded(b, state, HOST, "setReadWritePower", 2, |s, args| match (&args[0], &args[1]) {
            (HostValue::Int(r), HostValue::Int(_)) => {
                s.power.store(*r, Ordering::SeqCst);
                Ok(HostValue::Unit)
            }
            (other, _) => Err(CallError::type_mismatch("setReadWritePower", other.kind())),
        });
        for name in [
            "setQ",
            "setSession",
            "setTarget",
            "setRssiFilter",
            "setRegion",
            "setChannel",
            "setFrequency",
            "setProfile",
        ] {
            b = Self::recorded(b, state, HOST, name, 1, move |_, args| match args[0] {
                HostValue::Int(_) => Ok(HostValue::Unit),
                ref other => Err(CallError::type_mismatch(name, other.kind())),
            });
        }
        for name in ["setDynamicQ", "setHopping", "setContinuousMode"] {
            b = Self::recorded(b, state, HOST, name, 1, move |_, args| match args[0] {
                HostValue::Bool(_) => Ok(HostValue::Unit),
                ref other => Err(CallError::type_mismatch(name, other.kind())),
            });
        }

        // Read surface is not recorded; it is polled in a tight loop
        let s = state.clone();
        b = match surface {
            SimSurface::Pop => b.method("readTagFromBuffer", 0, move |_| {
                s.begin_read("readTagFromBuffer")?;
                Ok(s.pop().map(|(e, r)| tag_record(e, r)).unwrap_or(HostValue::Unit))
            }),
            SimSurface::List => b.method("getTagList", 0, move |_| {
                s.begin_read("getTagList")?;
                let drained: Vec<HostValue> = s
                    .pending
                    .lock()
                    .drain(..)
                    .map(|(e, r)| tag_record(e, r))
                    .collect();
                Ok(HostValue::List(drained))
            }),
            SimSurface::Text => b.method("readEpcLog", 0, move |_| {
                s.begin_read("readEpcLog")?;
                Ok(s.pop().map(|(e, r)| HostValue::Text(tag_line(&e, r))).unwrap_or(HostValue::Unit))
            }),
            SimSurface::Raw => b.method("getBuffer", 0, move |_| {
                s.begin_read("getBuffer")?;
                Ok(s
                    .pop()
                    .map(|(e, r)| HostValue::Bytes(tag_line(&e, r).into_bytes()))
                    .unwrap_or(HostValue::Unit))
            }),
            SimSurface::Hidden => b.method("dumpEpcCache", 0, move |_| {
                s.begin_read("dumpEpcCache")?;
                Ok(s.pop().map(|(e, r)| tag_record(e, r)).unwrap_or(HostValue::Unit))
            }),
        };
        b.build()
    }

    fn build_manager(state: &Arc<SimState>) -> FunctionTableHost {
        const HOST: &str = "uhfMgr";
        let mut b = FunctionTableHost::builder(HOST, HostRole::Manager);
        for name in ["setPowerState_UHF", "enableUartComm_UHF"] {
            b = Self::recorded(b, state, HOST, name, 1, move |_, args| match args[0] {
                HostValue::Bool(_) => Ok(HostValue::Unit),
                ref other => Err(CallError::type_mismatch(name, other.kind())),
            });
        }
        b = Self::recorded(b, state, HOST, "powerOn", 0, |_, _| Ok(HostValue::Bool(true)));
        b.subscription_point("onTagEpcLog").build()
    }

    /// Hosts for a [`crate::CapabilityBridge`]
    pub fn hosts(&self) -> Vec<Arc<dyn CapabilityHost>> {
        vec![
            self.function.clone() as Arc<dyn CapabilityHost>,
            self.manager.clone() as Arc<dyn CapabilityHost>,
        ]
    }

    pub fn provider(&self) -> StaticHosts {
        StaticHosts(self.hosts())
    }

    /// Queue a tag for the polled read surface
    pub fn push_tag(&self, epc: impl Into<String>, rssi: Option<i64>) {
        self.state.pending.lock().push_back((epc.into(), rssi));
    }

    /// Deliver a tag through the registered push callbacks
    ///
    /// # Returns
    /// Number of callbacks reached
    pub fn emit_tag(&self, epc: &str, rssi: Option<i64>) -> usize {
        self.manager.emit(HostValue::Text(tag_line(epc, rssi)))
    }

    /// Make the next `n` reads fail with a hardware fault
    pub fn inject_faults(&self, n: usize) {
        self.state.faults.store(n, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.state.pending.lock().len()
    }

    pub fn read_count(&self) -> usize {
        self.state.reads.load(Ordering::Relaxed)
    }

    pub fn is_inventory_running(&self) -> bool {
        self.state.inventory_running.load(Ordering::SeqCst)
    }

    /// Last power written through `setReadWritePower`
    pub fn power(&self) -> i64 {
        self.state.power.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.state.calls.lock().clone()
    }

    /// Argument lists of every recorded call to `method`
    pub fn calls_to(&self, method: &str) -> Vec<Vec<HostValue>> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.args.clone())
            .collect()
    }

    /// Most recent anti-collision parameter written
    pub fn last_q(&self) -> Option<i64> {
        self.calls_to("setQ").last().and_then(|a| a.first()).and_then(HostValue::as_i64)
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }
}
