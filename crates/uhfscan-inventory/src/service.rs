// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Inventory service: the command surface over one reader.
//!
//! The service owns everything that outlives a session (bridge, consumer,
//! alert gate, power state) and creates a fresh [`SessionContext`] on every
//! start.

use crate::alerts::{AlertGate, AlertKind, AlertSink};
use crate::command::{CommandReply, CommandRequest, PowerArgs, ToggleArgs, CODE_NOT_IMPLEMENTED, CODE_UHF_ERR};
use crate::error::{InventoryError, Result};
use crate::observation::TagRecord;
use crate::push::{BatchSink, ConsumerSlot};
use crate::session::{ActiveSession, PhaseCell, SessionContext, SessionDeps, SessionPhase, StartOptions};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uhfscan_config::{validate_config, UhfConfig};
use uhfscan_hal::{CapabilityBridge, HostProvider, HostValue, LogicalAction, TagCallback};

pub const DEFAULT_SERVICE_NAME: &str = "uhfscan";

#[derive(Default)]
struct ServiceState {
    session: Option<Arc<SessionContext>>,
    powered: bool,
    callback_registered: bool,
    shut_down: bool,
}

pub struct InventoryService {
    name: String,
    config: Arc<UhfConfig>,
    bridge: Arc<CapabilityBridge>,
    consumer: Arc<ConsumerSlot>,
    alerts: Arc<AlertGate>,
    phase: Arc<PhaseCell>,
    active: Arc<ActiveSession>,
    lifecycle: Mutex<()>,
    state: Mutex<ServiceState>,
}

impl InventoryService {
    /// Create a service over the hosts `provider` yields
    ///
    /// Hosts are not opened until the first start or power change.
    pub fn new(config: UhfConfig, provider: Box<dyn HostProvider>) -> Result<Self> {
        validate_config(&config)?;
        Ok(Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            alerts: Arc::new(AlertGate::new(&config.alerts)),
            config: Arc::new(config),
            bridge: Arc::new(CapabilityBridge::new(provider)),
            consumer: Arc::new(ConsumerSlot::default()),
            phase: Arc::new(PhaseCell::new()),
            active: Arc::new(ActiveSession::default()),
            lifecycle: Mutex::new(()),
            state: Mutex::new(ServiceState::default()),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &UhfConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().session.as_ref().map_or(false, |s| s.is_running())
    }

    /// Start a session, restarting the current one if any
    ///
    /// Fails only if no capability host can be resolved. A failed power-up
    /// skips the fast-start sequence and goes straight to steady state.
    pub fn start_inventory(&self, opts: StartOptions) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.take_and_retire() {
            info!("[UHF-SERVICE] Restarted active session");
        }

        self.phase.set(SessionPhase::Starting);
        if let Err(e) = self.bridge.ensure_open() {
            error!("[UHF-SERVICE] No reader host available: {}", e);
            self.phase.set(SessionPhase::Idle);
            return Err(InventoryError::InitFailed(e));
        }

        let powered = {
            let mut state = self.state.lock();
            state.shut_down = false;
            if !state.powered {
                state.powered = self.power_up();
            }
            if !state.callback_registered {
                state.callback_registered = self.register_callback();
            }
            state.powered
        };

        let session = match SessionContext::new(SessionDeps {
            config: Arc::clone(&self.config),
            bridge: Arc::clone(&self.bridge),
            consumer: Arc::clone(&self.consumer),
            alerts: Arc::clone(&self.alerts),
            phase: Arc::clone(&self.phase),
        }) {
            Ok(s) => s,
            Err(e) => {
                self.phase.set(SessionPhase::Idle);
                return Err(e);
            }
        };

        self.active.set(&session);
        if let Err(e) = session.launch(&opts, powered) {
            error!("[UHF-SERVICE] Session launch failed: {}", e);
            self.retire(&session);
            return Err(e);
        }
        info!(
            "[UHF-SERVICE] Inventory started (fullScan={}, phase={:?})",
            opts.full_scan,
            self.phase.get()
        );
        self.state.lock().session = Some(session);
        Ok(())
    }

    /// Stop the current session; a no-op when idle
    pub fn stop_inventory(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.take_and_retire() {
            info!("[UHF-SERVICE] Inventory stopped");
        }
    }

    /// Retire the current session without holding the state lock while its
    /// threads are joined
    fn take_and_retire(&self) -> bool {
        let session = self.state.lock().session.take();
        match session {
            Some(session) => {
                self.retire(&session);
                true
            }
            None => false,
        }
    }

    fn retire(&self, session: &Arc<SessionContext>) {
        self.phase.set(SessionPhase::Stopping);
        self.active.clear();
        session.shutdown();
        self.phase.set(SessionPhase::Idle);
    }

    fn power_up(&self) -> bool {
        let reader = &self.config.reader;
        if !self.bridge.open_serial(&reader.serial_nodes, &reader.serial_baud_rates) {
            debug!("[UHF-SERVICE] Serial transport not opened");
        }
        let ok = self.bridge.perform(LogicalAction::PowerOn, &[]);
        if !ok {
            warn!("[UHF-SERVICE] Power-up not accepted by any host; skipping fast start");
        }
        self.apply_power(reader.default_power_dbm);
        ok
    }

    fn register_callback(&self) -> bool {
        let active = Arc::clone(&self.active);
        let callback: TagCallback = Arc::new(move |value: HostValue| {
            if let Some(session) = active.get() {
                session.on_pushed(value);
            }
        });
        self.bridge.register_tag_callback(callback)
    }

    fn apply_power(&self, dbm: i32) {
        if !self.bridge.perform(LogicalAction::SetPower, &[HostValue::Int(dbm as i64)]) {
            warn!("[UHF-SERVICE] No host accepted power {} dBm", dbm);
        }
    }

    /// Immediately available reads followed by the backlog
    ///
    /// Empty while a snapshot window is collecting.
    pub fn pull_batch(&self) -> Vec<TagRecord> {
        let Some(session) = self.state.lock().session.clone() else {
            return Vec::new();
        };
        if session.snapshot.is_active() {
            return Vec::new();
        }
        let mut batch = session.read_now();
        batch.extend(session.backlog.drain_all());
        if !batch.is_empty() {
            self.alerts.notify_batch();
        }
        batch.iter().map(TagRecord::from).collect()
    }

    /// Clamp and apply the radio power
    ///
    /// # Returns
    /// The power actually requested from the reader
    pub fn set_power(&self, dbm: i32) -> i32 {
        let reader = &self.config.reader;
        let clamped = dbm.clamp(reader.min_power_dbm, reader.max_power_dbm);
        let session = self.state.lock().session.clone();
        match session {
            Some(session) => {
                let bridge = Arc::clone(&self.bridge);
                session.control.submit(move || {
                    if !bridge.perform(LogicalAction::SetPower, &[HostValue::Int(clamped as i64)]) {
                        warn!("[UHF-SERVICE] No host accepted power {} dBm", clamped);
                    }
                });
            }
            None => match self.bridge.ensure_open() {
                Ok(_) => self.apply_power(clamped),
                Err(e) => warn!("[UHF-SERVICE] Power not applied: {}", e),
            },
        }
        clamped
    }

    pub fn set_alert_mode(&self, kind: AlertKind, enabled: bool) {
        self.alerts.set_enabled(kind, enabled);
    }

    pub fn alert_mode(&self, kind: AlertKind) -> bool {
        self.alerts.is_enabled(kind)
    }

    pub fn ping(&self) -> String {
        format!("pong:{}", self.name)
    }

    pub fn attach_consumer(&self, sink: Arc<dyn BatchSink>) {
        self.consumer.attach(sink);
    }

    pub fn detach_consumer(&self) {
        self.consumer.detach();
    }

    pub fn attach_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        self.alerts.attach_sink(sink);
    }

    /// Stop inventory and power the reader down; idempotent
    pub fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.take_and_retire();
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        if state.powered {
            if !self.bridge.perform(LogicalAction::PowerOff, &[]) {
                debug!("[UHF-SERVICE] No host accepted PowerOff");
            }
            state.powered = false;
        }
        self.bridge.close();
        state.callback_registered = false;
    }

    /// Handle one command, converting every failure into an error reply
    pub fn dispatch(&self, request: &CommandRequest) -> CommandReply {
        match catch_unwind(AssertUnwindSafe(|| self.handle(request))) {
            Ok(reply) => reply,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "command handler panicked".to_string());
                error!("[UHF-SERVICE] {} panicked: {}", request.method, message);
                CommandReply::error(CODE_UHF_ERR, message)
            }
        }
    }

    fn handle(&self, request: &CommandRequest) -> CommandReply {
        match request.method.as_str() {
            "startInventory" => {
                let opts: StartOptions = match request.parse_args() {
                    Ok(o) => o,
                    Err(reply) => return reply,
                };
                match self.start_inventory(opts) {
                    Ok(()) => CommandReply::empty(),
                    Err(e) => CommandReply::error(CODE_UHF_ERR, e.to_string()),
                }
            }
            "stopInventory" => {
                self.stop_inventory();
                CommandReply::empty()
            }
            "pullBatch" => match serde_json::to_value(self.pull_batch()) {
                Ok(value) => CommandReply::ok(value),
                Err(e) => CommandReply::error(CODE_UHF_ERR, e.to_string()),
            },
            "setPower" => match request.parse_args::<PowerArgs>() {
                Ok(args) => CommandReply::ok(self.set_power(args.power)),
                Err(reply) => reply,
            },
            "setBeep" | "setVibrate" => match request.parse_args::<ToggleArgs>() {
                Ok(args) => {
                    let kind = if request.method == "setBeep" {
                        AlertKind::Beep
                    } else {
                        AlertKind::Vibrate
                    };
                    self.set_alert_mode(kind, args.enabled);
                    CommandReply::ok(args.enabled)
                }
                Err(reply) => reply,
            },
            "ping" => CommandReply::ok(self.ping()),
            other => CommandReply::error(CODE_NOT_IMPLEMENTED, format!("unknown method '{}'", other)),
        }
    }
}

impl Drop for InventoryService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
