// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event store interface and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresEventStore;
pub use self::sqlite::SqliteEventStore;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Lifecycle status recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// The cluster resources were created.
    Created,
    /// The workload was observed ready.
    Ready,
    /// Provisioning failed.
    Failed,
    /// The cluster resources were deleted. Terminal.
    Deleted,
}

impl InstanceStatus {
    /// The string stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
            Self::Deleted => "DELETED",
        }
    }

    /// Whether this status ends the instance's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(Self::Created),
            "READY" => Ok(Self::Ready),
            "FAILED" => Ok(Self::Failed),
            "DELETED" => Ok(Self::Deleted),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Instance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct InstanceRecord {
    /// Opaque unique identifier.
    pub id: String,
    /// Cluster resource base name.
    pub name: String,
    /// Requester identity.
    pub owner: String,
    /// Catalog entry the instance was created from.
    pub catalog_ref: String,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
}

/// A single fact in the lifecycle log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEvent {
    /// Monotonic event identifier.
    pub id: i64,
    /// Instance the event belongs to.
    pub instance_id: String,
    /// Recorded status.
    pub status: InstanceStatus,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
}

/// The most recent event of an instance, joined with the instance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestEvent {
    /// The instance.
    pub instance: InstanceRecord,
    /// Identifier of the latest event.
    pub event_id: i64,
    /// Current status.
    pub status: InstanceStatus,
    /// When the current status was recorded.
    pub timestamp: DateTime<Utc>,
}

impl LatestEvent {
    /// Whether this instance is a reap candidate at `now`: not deleted, and
    /// its latest event is strictly older than `ttl`.
    ///
    /// Events timestamped in the future are never stale.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        (now - self.timestamp)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }
}

/// Raw event row as read from either backend.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: i64,
    instance_id: String,
    status: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<EventRow> for InstanceEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            instance_id: row.instance_id,
            status: row.status.parse()?,
            timestamp: row.timestamp,
        })
    }
}

/// Raw row of the latest-event-per-instance query.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LatestEventRow {
    instance_id: String,
    name: String,
    owner: String,
    catalog_ref: String,
    created_at: DateTime<Utc>,
    event_id: i64,
    status: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<LatestEventRow> for LatestEvent {
    type Error = StoreError;

    fn try_from(row: LatestEventRow) -> Result<Self> {
        Ok(Self {
            instance: InstanceRecord {
                id: row.instance_id,
                name: row.name,
                owner: row.owner,
                catalog_ref: row.catalog_ref,
                created_at: row.created_at,
            },
            event_id: row.event_id,
            status: row.status.parse()?,
            timestamp: row.timestamp,
        })
    }
}

/// Append-only lifecycle log.
///
/// `append_at` is the only operation that writes events. Implementations
/// acquire a pooled connection per call and release it when the call
/// returns; no connection is held between calls.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend identifier ("postgres", "sqlite").
    fn backend(&self) -> &'static str;

    /// Insert a new instance row together with its first `CREATED` event,
    /// in a single transaction.
    ///
    /// Returns [`StoreError::DuplicateName`] if `name` is already taken.
    async fn register_instance(
        &self,
        name: &str,
        owner: &str,
        catalog_ref: &str,
    ) -> Result<InstanceRecord>;

    /// Get an instance by ID.
    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>>;

    /// Get an instance by its cluster resource name.
    async fn get_instance_by_name(&self, name: &str) -> Result<Option<InstanceRecord>>;

    /// Append an event with an explicit timestamp.
    ///
    /// Returns [`StoreError::InstanceNotFound`] if the instance row does not exist.
    async fn append_at(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<InstanceEvent>;

    /// Append an event timestamped now.
    async fn append(&self, instance_id: &str, status: InstanceStatus) -> Result<InstanceEvent> {
        self.append_at(instance_id, status, Utc::now()).await
    }

    /// The most recent event of an instance, if it has any.
    async fn latest_event(&self, instance_id: &str) -> Result<Option<InstanceEvent>>;

    /// Current status of an instance.
    ///
    /// Returns [`StoreError::InstanceNotFound`] if the instance has no events.
    async fn latest_status(&self, instance_id: &str) -> Result<InstanceStatus> {
        self.latest_event(instance_id)
            .await?
            .map(|event| event.status)
            .ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))
    }

    /// Full history of an instance, oldest first.
    async fn list_events(&self, instance_id: &str) -> Result<Vec<InstanceEvent>>;

    /// The most recent event of every instance that has at least one event.
    async fn latest_events(&self) -> Result<Vec<LatestEvent>>;

    /// Instances whose latest event is not `DELETED` and is older than `ttl`
    /// as of `now`.
    ///
    /// Only the single latest event per instance is considered; earlier
    /// events of any status have no influence.
    async fn list_stale_at(&self, ttl: Duration, now: DateTime<Utc>) -> Result<Vec<LatestEvent>> {
        let stale = self
            .latest_events()
            .await?
            .into_iter()
            .filter(|latest| latest.is_stale(ttl, now))
            .collect();
        Ok(stale)
    }

    /// Instances whose latest event is not `DELETED` and is older than `ttl`.
    async fn list_stale(&self, ttl: Duration) -> Result<Vec<LatestEvent>> {
        self.list_stale_at(ttl, Utc::now()).await
    }

    /// Newest instance for `(owner, catalog_ref)` whose latest event is not `DELETED`.
    async fn find_active_instance(
        &self,
        owner: &str,
        catalog_ref: &str,
    ) -> Result<Option<InstanceRecord>>;

    /// Check connectivity.
    async fn health_check(&self) -> Result<bool>;
}
