// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for orchestra-store.

use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database operation failed (unreachable, constraint violation, ...).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The instance does not exist or has no event history.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// An instance with the same name is already registered.
    #[error("Instance name already registered: {0}")]
    DuplicateName(String),

    /// A status value read from the log is not a known status.
    #[error("Invalid instance status: {0}")]
    InvalidStatus(String),

    /// The database URL does not name a supported backend.
    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),
}

/// Result type using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Map a database error raised while writing to the log, translating
    /// constraint violations into the matching domain error.
    pub(crate) fn from_write(err: sqlx::Error, instance_id: &str, name: Option<&str>) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
            && let Some(name) = name
        {
            return StoreError::DuplicateName(name.to_string());
        }
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_foreign_key_violation()
        {
            return StoreError::InstanceNotFound(instance_id.to_string());
        }
        StoreError::Database(err)
    }
}
