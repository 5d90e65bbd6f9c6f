// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # uhfscan - UHF RFID inventory pipeline
//!
//! Drives a UHF tag reader whose control surface varies by hardware revision
//! and turns its output into paced, deduplicated batches of tag records.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! uhfscan = "0.1"
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uhfscan::prelude::*;
//!
//! let sim = SimulatedReader::new(SimSurface::List);
//! let service = InventoryService::new(UhfConfig::default(), Box::new(sim.provider()))?;
//! service.attach_consumer(Arc::new(|batch: Vec<TagRecord>| {
//!     for tag in batch {
//!         println!("{} {} dBm", tag.identifier, tag.signal_dbm);
//!     }
//! }));
//! service.start_inventory(StartOptions::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: uhfscan-config, uhfscan-observability      │
//! │  (TOML config with overrides, tracing setup)            │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Hardware: uhfscan-hal                                  │
//! │  (capability hosts, logical action routing)             │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Pipeline: uhfscan-inventory                            │
//! │  (ingestion, gating, dedup, adaptive Q, push, commands) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - **`std`** (default)
//! - **`file-logging`**: per-run JSON log files
//!
//! ## License
//!
//! Apache-2.0

pub use uhfscan_config as config;
pub use uhfscan_hal as hal;
pub use uhfscan_inventory as inventory;
pub use uhfscan_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config, UhfConfig};
    pub use crate::hal::{
        CapabilityBridge, CapabilityHost, FunctionTableHost, HostProvider, HostRole, HostValue, LogicalAction,
        SimSurface, SimulatedReader, StaticHosts,
    };
    pub use crate::inventory::{
        AlertKind, AlertSink, BatchSink, CommandReply, CommandRequest, InventoryError, InventoryService,
        SessionPhase, StartOptions, TagRecord,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let config = UhfConfig::default();
        assert_eq!(config.push.chunk_size, 256);
        assert_eq!(LogicalAction::ReadOneByPop.is_read(), true);
    }
}
