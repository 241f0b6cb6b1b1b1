// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for orchestra-lifecycle.

use thiserror::Error;

/// Lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A control-plane call failed, was rejected or timed out.
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] crate::gateway::GatewayError),

    /// Event store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] orchestra_store::StoreError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No cluster resources and no event history for this name.
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// The catalog has no entry for this reference.
    #[error("Catalog entry not found: {0}")]
    CatalogEntryNotFound(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using lifecycle Error.
pub type Result<T> = std::result::Result<T, Error>;
