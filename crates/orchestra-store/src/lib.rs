// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestra Store - append-only lifecycle log for workshop instances.
//!
//! Every state change of a workshop instance is recorded as a new row in
//! `instance_event`. Nothing in the log is ever updated or deleted; the
//! current status of an instance is derived from its most recent event.
//!
//! # Schema
//!
//! ```text
//! ┌──────────────────────────┐        ┌───────────────────────────────┐
//! │ instance                 │ 1    * │ instance_event                │
//! │──────────────────────────│◄───────│───────────────────────────────│
//! │ id          TEXT PK      │        │ id          BIGINT PK         │
//! │ name        TEXT UNIQUE  │        │ instance_id TEXT FK           │
//! │ owner       TEXT         │        │ status      TEXT              │
//! │ catalog_ref TEXT         │        │ timestamp   TIMESTAMPTZ       │
//! │ created_at  TIMESTAMPTZ  │        └───────────────────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! The current status of an instance is the status of the event with the
//! greatest `timestamp`, ties broken by the greatest `id`.
//!
//! # Backends
//!
//! | Backend | Type | Use |
//! |---------|------|-----|
//! | PostgreSQL | [`PostgresEventStore`] | Production deployments |
//! | SQLite | [`SqliteEventStore`] | Embedded/dev deployments and tests |
//!
//! Use [`connect`] to pick a backend from a database URL.

#![deny(missing_docs)]

/// Embedded migrations for both backends.
pub mod migrations;

/// Error types for store operations.
pub mod error;

/// The [`EventStore`] trait, record types, and backend implementations.
pub mod event_store;

use std::sync::Arc;

pub use error::{Result, StoreError};
pub use event_store::{
    EventStore, InstanceEvent, InstanceRecord, InstanceStatus, LatestEvent, PostgresEventStore,
    SqliteEventStore,
};

/// Connect to the store described by `database_url` and apply migrations.
///
/// `postgres://` and `postgresql://` URLs select [`PostgresEventStore`];
/// `sqlite:` URLs select [`SqliteEventStore`].
pub async fn connect(database_url: &str) -> Result<Arc<dyn EventStore>> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        let store = PostgresEventStore::connect(database_url).await?;
        Ok(Arc::new(store))
    } else if database_url.starts_with("sqlite:") {
        let store = SqliteEventStore::connect(database_url).await?;
        Ok(Arc::new(store))
    } else {
        Err(StoreError::UnsupportedUrl(database_url.to_string()))
    }
}
