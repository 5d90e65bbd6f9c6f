// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Control-plane worker.
//!
//! Every tuning call made while a session runs (Q, target, gate, region,
//! resets) is queued here and executed on one thread, so the reader never
//! sees two configuration calls interleave.

use crate::error::Result;
use crate::signal::ShutdownListener;
use crate::worker::WorkerThread;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, trace};
use uhfscan_hal::{CapabilityBridge, LogicalAction};

pub type ControlJob = Box<dyn FnOnce() + Send>;

/// Cloneable submission side
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<ControlJob>,
}

impl ControlHandle {
    /// Queue a job
    ///
    /// # Returns
    /// `false` once the control plane has shut down
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }
}

pub struct ControlPlane {
    handle: ControlHandle,
    worker: Mutex<Option<WorkerThread<ControlJob>>>,
}

impl ControlPlane {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = channel::unbounded::<ControlJob>();
        let worker = WorkerThread::spawn("uhf-control", rx, |job: ControlJob| {
            catch_unwind(AssertUnwindSafe(job)).map_err(|_| "control job panicked".to_string())
        })?;
        Ok(Self {
            handle: ControlHandle { tx },
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.submit(job)
    }

    /// Stop the worker; queued jobs are discarded
    pub fn stop(&self) {
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
        }
    }
}

/// Reset the running inventory round
///
/// Uses the reader's reset entry point when there is one, otherwise stops,
/// pauses and starts again.
pub fn reset_inventory(bridge: &CapabilityBridge, pause: Duration, listener: &ShutdownListener) {
    if bridge.perform(LogicalAction::ResetInventory, &[]) {
        trace!("[UHF-CONTROL] Inventory reset");
        return;
    }
    bridge.perform(LogicalAction::StopInventory, &[]);
    if !listener.sleep(pause) {
        return;
    }
    if !bridge.perform(LogicalAction::StartInventory, &[]) {
        debug!("[UHF-CONTROL] Restart after reset was not accepted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ShutdownSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use uhfscan_hal::{CallError, CapabilityHost, FunctionTableHost, HostRole, HostValue};

    #[test]
    fn test_jobs_run_in_submission_order() {
        let plane = ControlPlane::spawn().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = log.clone();
            assert!(plane.submit(move || log.lock().push(i)));
        }
        thread::sleep(Duration::from_millis(150));
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        plane.stop();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let plane = ControlPlane::spawn().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        plane.submit(|| panic!("boom"));
        let r = ran.clone();
        plane.submit(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(150));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        plane.stop();
    }

    #[test]
    fn test_reset_falls_back_to_stop_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let func = FunctionTableHost::builder("func", HostRole::Function)
            .method("inventoryStop", 0, move |_| {
                l1.lock().push("stop");
                Ok(HostValue::Unit)
            })
            .method("inventoryStart", 0, move |_| {
                l2.lock().push("start");
                Ok(HostValue::Unit)
            })
            .method("inventoryReset", 0, |_| Err(CallError::fault("inventoryReset", "not in this firmware")))
            .build();
        let bridge = CapabilityBridge::with_hosts(vec![Arc::new(func) as Arc<dyn CapabilityHost>]);
        bridge.ensure_open().unwrap();

        let signal = ShutdownSignal::new();
        reset_inventory(&bridge, Duration::from_millis(1), &signal.listener());
        assert_eq!(*log.lock(), vec!["stop", "start"]);
    }
}
