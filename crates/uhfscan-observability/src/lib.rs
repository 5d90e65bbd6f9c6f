// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # uhfscan-observability
//!
//! Logging setup shared by every uhfscan binary, with per-crate debug flag
//! support (`--debug-uhfscan-inventory`, `UHFSCAN_DEBUG=uhfscan-hal`).
//!
//! ## Features
//! - `file-logging`: per-run JSON log files with retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known workspace crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "uhfscan",
    "uhfscan-config",
    "uhfscan-hal",
    "uhfscan-inventory",
];

/// Tracing targets use the module path form of a crate name.
pub(crate) fn target_name(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
