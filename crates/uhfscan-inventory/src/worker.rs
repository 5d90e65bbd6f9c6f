// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Queue-fed worker thread.
//!
//! A dedicated named thread pulls items from a channel and hands each to a
//! handler. Shutdown is an atomic flag checked between items, plus channel
//! disconnection. The push scheduler and the control plane are both built on
//! it.

use crate::error::{InventoryError, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct WorkerThread<T: Send + 'static> {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T: Send + 'static> WorkerThread<T> {
    /// Spawn a worker named `name` draining `rx`
    pub fn spawn<F, E>(name: &'static str, rx: Receiver<T>, mut handler: F) -> Result<Self>
    where
        F: FnMut(T) -> std::result::Result<(), E> + Send + 'static,
        E: std::fmt::Display,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !shutdown_clone.load(Ordering::Acquire) {
                    match rx.recv_timeout(POLL_INTERVAL) {
                        Ok(item) => {
                            if let Err(e) = handler(item) {
                                warn!("[{}] Handler error: {}", name, e);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|source| InventoryError::Spawn { name, source })?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            name,
            _phantom: PhantomData,
        })
    }

    /// Signal the worker to stop and wait for it
    ///
    /// Called from the worker's own thread (a handler stopping its session),
    /// it only raises the flag.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("[{}] Worker panicked during shutdown", self.name);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire) && self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl<T: Send + 'static> Drop for WorkerThread<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_worker_processes_items() {
        let (tx, rx) = channel::unbounded();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut worker = WorkerThread::spawn("test-worker", rx, move |n: usize| -> std::result::Result<(), String> {
            counter_clone.fetch_add(n, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(worker.is_running());

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.send(3).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(counter.load(Ordering::SeqCst), 6);

        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_worker_exits_on_disconnect() {
        let (tx, rx) = channel::unbounded::<u8>();
        let worker = WorkerThread::spawn("test-disconnect", rx, |_| -> std::result::Result<(), String> { Ok(()) }).unwrap();
        drop(tx);
        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_running());
    }
}
