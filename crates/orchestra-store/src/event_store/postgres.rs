// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed event store.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};

use super::{
    EventRow, EventStore, InstanceEvent, InstanceRecord, InstanceStatus, LatestEvent,
    LatestEventRow,
};

/// PostgreSQL-backed event store.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a store from an existing pool. Migrations are not run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        crate::migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Instance Operations
// ============================================================================

/// Insert an instance row and its `CREATED` event in one transaction.
pub async fn register_instance(
    pool: &PgPool,
    name: &str,
    owner: &str,
    catalog_ref: &str,
) -> Result<InstanceRecord> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, InstanceRecord>(
        r#"
        INSERT INTO instance (id, name, owner, catalog_ref, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, owner, catalog_ref, created_at
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(owner)
    .bind(catalog_ref)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| StoreError::from_write(e, &id, Some(name)))?;

    sqlx::query(
        r#"
        INSERT INTO instance_event (instance_id, status, timestamp)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(&id)
    .bind(InstanceStatus::Created.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!(instance_id = %id, name = %name, "Registered instance");

    Ok(record)
}

/// Get an instance by ID.
pub async fn get_instance(pool: &PgPool, instance_id: &str) -> Result<Option<InstanceRecord>> {
    let record = sqlx::query_as::<_, InstanceRecord>(
        r#"
        SELECT id, name, owner, catalog_ref, created_at
        FROM instance
        WHERE id = $1
        "#,
    )
    .bind(instance_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get an instance by name.
pub async fn get_instance_by_name(pool: &PgPool, name: &str) -> Result<Option<InstanceRecord>> {
    let record = sqlx::query_as::<_, InstanceRecord>(
        r#"
        SELECT id, name, owner, catalog_ref, created_at
        FROM instance
        WHERE name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Newest non-deleted instance for an owner and catalog entry.
pub async fn find_active_instance(
    pool: &PgPool,
    owner: &str,
    catalog_ref: &str,
) -> Result<Option<InstanceRecord>> {
    let record = sqlx::query_as::<_, InstanceRecord>(
        r#"
        WITH ranked AS (
            SELECT e.instance_id, e.status,
                   ROW_NUMBER() OVER (
                       PARTITION BY e.instance_id
                       ORDER BY e.timestamp DESC, e.id DESC
                   ) AS rk
            FROM instance_event e
            JOIN instance i ON i.id = e.instance_id
            WHERE i.owner = $1 AND i.catalog_ref = $2
        )
        SELECT i.id, i.name, i.owner, i.catalog_ref, i.created_at
        FROM ranked r
        JOIN instance i ON i.id = r.instance_id
        WHERE r.rk = 1 AND r.status <> 'DELETED'
        ORDER BY i.created_at DESC
        LIMIT 1
        "#,
    )
    .bind(owner)
    .bind(catalog_ref)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

// ============================================================================
// Event Operations
// ============================================================================

/// Append a single event.
pub async fn append_event(
    pool: &PgPool,
    instance_id: &str,
    status: InstanceStatus,
    timestamp: DateTime<Utc>,
) -> Result<InstanceEvent> {
    let row = sqlx::query_as::<_, EventRow>(
        r#"
        INSERT INTO instance_event (instance_id, status, timestamp)
        VALUES ($1, $2, $3)
        RETURNING id, instance_id, status, timestamp
        "#,
    )
    .bind(instance_id)
    .bind(status.as_str())
    .bind(timestamp)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_write(e, instance_id, None))?;

    row.try_into()
}

/// Most recent event of an instance.
pub async fn latest_event(pool: &PgPool, instance_id: &str) -> Result<Option<InstanceEvent>> {
    let row = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, instance_id, status, timestamp
        FROM instance_event
        WHERE instance_id = $1
        ORDER BY timestamp DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(instance_id)
    .fetch_optional(pool)
    .await?;

    row.map(InstanceEvent::try_from).transpose()
}

/// All events of an instance, oldest first.
pub async fn list_events(pool: &PgPool, instance_id: &str) -> Result<Vec<InstanceEvent>> {
    sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, instance_id, status, timestamp
        FROM instance_event
        WHERE instance_id = $1
        ORDER BY timestamp ASC, id ASC
        "#,
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(InstanceEvent::try_from)
    .collect()
}

/// Latest event per instance.
pub async fn latest_events(pool: &PgPool) -> Result<Vec<LatestEvent>> {
    sqlx::query_as::<_, LatestEventRow>(
        r#"
        WITH ranked AS (
            SELECT e.id, e.instance_id, e.status, e.timestamp,
                   ROW_NUMBER() OVER (
                       PARTITION BY e.instance_id
                       ORDER BY e.timestamp DESC, e.id DESC
                   ) AS rk
            FROM instance_event e
        )
        SELECT i.id AS instance_id, i.name, i.owner, i.catalog_ref, i.created_at,
               r.id AS event_id, r.status, r.timestamp
        FROM ranked r
        JOIN instance i ON i.id = r.instance_id
        WHERE r.rk = 1
        ORDER BY r.timestamp ASC
        "#,
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(LatestEvent::try_from)
    .collect()
}

/// Check database connectivity.
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(row.0 == 1)
}

#[async_trait::async_trait]
impl EventStore for PostgresEventStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn register_instance(
        &self,
        name: &str,
        owner: &str,
        catalog_ref: &str,
    ) -> Result<InstanceRecord> {
        register_instance(&self.pool, name, owner, catalog_ref).await
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        get_instance(&self.pool, instance_id).await
    }

    async fn get_instance_by_name(&self, name: &str) -> Result<Option<InstanceRecord>> {
        get_instance_by_name(&self.pool, name).await
    }

    async fn append_at(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<InstanceEvent> {
        append_event(&self.pool, instance_id, status, timestamp).await
    }

    async fn latest_event(&self, instance_id: &str) -> Result<Option<InstanceEvent>> {
        latest_event(&self.pool, instance_id).await
    }

    async fn list_events(&self, instance_id: &str) -> Result<Vec<InstanceEvent>> {
        list_events(&self.pool, instance_id).await
    }

    async fn latest_events(&self) -> Result<Vec<LatestEvent>> {
        latest_events(&self.pool).await
    }

    async fn find_active_instance(
        &self,
        owner: &str,
        catalog_ref: &str,
    ) -> Result<Option<InstanceRecord>> {
        find_active_instance(&self.pool, owner, catalog_ref).await
    }

    async fn health_check(&self) -> Result<bool> {
        health_check(&self.pool).await
    }
}
