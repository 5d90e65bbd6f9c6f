// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use uhfscan_config::ConfigError;
use uhfscan_hal::HalError;

/// Errors surfaced by the inventory service
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("reader initialization failed: {0}")]
    InitFailed(#[from] HalError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, InventoryError>;
