// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # uhfscan-inventory
//!
//! Turns an unreliable, heterogeneous tag reader into a paced stream of
//! deduplicated tag batches.
//!
//! ```text
//!  read surfaces ──┐                               ┌─▶ snapshot set ─▶ flush
//!  (tiers 1..5)    ├─▶ RSSI gate ─▶ dedup ─▶ ──────┤
//!  push callback ──┘                               └─▶ backlog ─▶ push ─▶ consumer
//!                                                       │
//!                          adaptive Q ◀── rate, depth ──┘
//! ```
//!
//! Every hardware tuning call goes through a single control-plane worker.
//! [`InventoryService`] is the entry point; [`InventoryService::dispatch`]
//! offers the same operations as a serde command envelope.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod adaptive;
pub mod alerts;
pub mod backlog;
mod bootstrap;
pub mod command;
pub mod control;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod observation;
pub mod push;
pub mod rssi;
pub mod service;
pub mod session;
pub mod signal;
pub mod snapshot;
pub mod worker;

pub use adaptive::{decide, AdaptiveController, AdaptiveState, Retune};
pub use alerts::{AlertGate, AlertKind, AlertSink};
pub use backlog::Backlog;
pub use command::{CommandReply, CommandRequest};
pub use dedup::DedupCache;
pub use error::{InventoryError, Result};
pub use observation::{TagObservation, TagRecord};
pub use push::{BatchSink, ConsumerSlot};
pub use service::InventoryService;
pub use session::{SessionPhase, StartOptions};
pub use snapshot::SnapshotController;
