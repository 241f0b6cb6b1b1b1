// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed event store.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};

use super::{
    EventRow, EventStore, InstanceEvent, InstanceRecord, InstanceStatus, LatestEvent,
    LatestEventRow,
};

/// SQLite-backed event store.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a store from an existing pool. Migrations are not run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a `sqlite:` URL, creating the database file if needed,
    /// and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        crate::migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Open (or create) a database file at `path` and apply migrations.
    ///
    /// ```ignore
    /// let store = SqliteEventStore::from_path(".data/orchestra.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        Self::connect(&format!("sqlite:{}", path.to_string_lossy())).await
    }

    /// A private in-memory database with migrations applied.
    ///
    /// Uses a single connection that is never recycled, since every
    /// connection to `sqlite::memory:` opens a separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        crate::migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EventStore for SqliteEventStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn register_instance(
        &self,
        name: &str,
        owner: &str,
        catalog_ref: &str,
    ) -> Result<InstanceRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO instance (id, name, owner, catalog_ref, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(owner)
        .bind(catalog_ref)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, &id, Some(name)))?;

        sqlx::query(
            r#"
            INSERT INTO instance_event (instance_id, status, timestamp)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(InstanceStatus::Created.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(instance_id = %id, name = %name, "Registered instance");

        Ok(InstanceRecord {
            id,
            name: name.to_string(),
            owner: owner.to_string(),
            catalog_ref: catalog_ref.to_string(),
            created_at: now,
        })
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        let record = sqlx::query_as::<_, InstanceRecord>(
            r#"
            SELECT id, name, owner, catalog_ref, created_at
            FROM instance
            WHERE id = ?
            "#,
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_instance_by_name(&self, name: &str) -> Result<Option<InstanceRecord>> {
        let record = sqlx::query_as::<_, InstanceRecord>(
            r#"
            SELECT id, name, owner, catalog_ref, created_at
            FROM instance
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn append_at(
        &self,
        instance_id: &str,
        status: InstanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<InstanceEvent> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO instance_event (instance_id, status, timestamp)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(instance_id)
        .bind(status.as_str())
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, instance_id, None))?;

        Ok(InstanceEvent {
            id,
            instance_id: instance_id.to_string(),
            status,
            timestamp,
        })
    }

    async fn latest_event(&self, instance_id: &str) -> Result<Option<InstanceEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, instance_id, status, timestamp
            FROM instance_event
            WHERE instance_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(InstanceEvent::try_from).transpose()
    }

    async fn list_events(&self, instance_id: &str) -> Result<Vec<InstanceEvent>> {
        sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, instance_id, status, timestamp
            FROM instance_event
            WHERE instance_id = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(InstanceEvent::try_from)
        .collect()
    }

    async fn latest_events(&self) -> Result<Vec<LatestEvent>> {
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
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LatestEvent::try_from)
        .collect()
    }

    async fn find_active_instance(
        &self,
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
                WHERE i.owner = ? AND i.catalog_ref = ?
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
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn health_check(&self) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_store() -> SqliteEventStore {
        SqliteEventStore::in_memory()
            .await
            .expect("Failed to create in-memory store")
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[tokio::test]
    async fn test_register_and_get_instance() {
        let store = test_store().await;

        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo:tag")
            .await
            .expect("Failed to register instance");

        let by_id = store
            .get_instance(&record.id)
            .await
            .unwrap()
            .expect("Instance should exist");
        let by_name = store
            .get_instance_by_name("repo-abcdefgh")
            .await
            .unwrap()
            .expect("Instance should exist");

        assert_eq!(by_id.id, by_name.id);
        assert_eq!(by_id.owner, "a@example.org");
        assert_eq!(by_id.catalog_ref, "org/repo:tag");
        assert_eq!(
            store.latest_status(&record.id).await.unwrap(),
            InstanceStatus::Created
        );
    }

    #[tokio::test]
    async fn test_get_instance_not_found() {
        let store = test_store().await;

        assert!(store.get_instance("nonexistent").await.unwrap().is_none());
        assert!(
            store
                .get_instance_by_name("nonexistent")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = test_store().await;

        store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();
        let err = store
            .register_instance("repo-abcdefgh", "b@example.org", "org/repo")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateName(name) if name == "repo-abcdefgh"));
    }

    #[tokio::test]
    async fn test_append_to_unknown_instance() {
        let store = test_store().await;

        let err = store
            .append("missing", InstanceStatus::Deleted)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InstanceNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_latest_status_without_history() {
        let store = test_store().await;

        let err = store.latest_status("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_deleted_after_many_created_events() {
        let store = test_store().await;
        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();
        let base = Utc::now();

        for i in 0..5 {
            store
                .append_at(&record.id, InstanceStatus::Created, base + secs(i))
                .await
                .unwrap();
        }
        store
            .append_at(&record.id, InstanceStatus::Deleted, base + secs(10))
            .await
            .unwrap();

        assert_eq!(
            store.latest_status(&record.id).await.unwrap(),
            InstanceStatus::Deleted
        );
        assert_eq!(store.list_events(&record.id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_timestamp_tie_broken_by_id() {
        let store = test_store().await;
        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();
        let at = Utc::now() + secs(5);

        store
            .append_at(&record.id, InstanceStatus::Created, at)
            .await
            .unwrap();
        let last = store
            .append_at(&record.id, InstanceStatus::Deleted, at)
            .await
            .unwrap();

        let latest = store.latest_event(&record.id).await.unwrap().unwrap();
        assert_eq!(latest.id, last.id);
        assert_eq!(latest.status, InstanceStatus::Deleted);
    }

    #[tokio::test]
    async fn test_list_events_oldest_first() {
        let store = test_store().await;
        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();
        let later = Utc::now() + secs(60);

        store
            .append_at(&record.id, InstanceStatus::Deleted, later)
            .await
            .unwrap();

        let events = store.list_events(&record.id).await.unwrap();
        let statuses: Vec<_> = events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![InstanceStatus::Created, InstanceStatus::Deleted]
        );
    }

    #[tokio::test]
    async fn test_list_stale_age_boundary() {
        let store = test_store().await;
        let ttl = Duration::from_secs(8 * 3600);
        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();
        let created = store.latest_event(&record.id).await.unwrap().unwrap();
        let ttl_chrono = chrono::Duration::from_std(ttl).unwrap();

        let just_past = created.timestamp + ttl_chrono + secs(1);
        let just_before = created.timestamp + ttl_chrono - secs(1);

        let stale = store.list_stale_at(ttl, just_past).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].instance.name, "repo-abcdefgh");

        let stale = store.list_stale_at(ttl, just_before).await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_list_stale_excludes_deleted_for_zero_ttl() {
        let store = test_store().await;
        let deleted = store
            .register_instance("gone-abcdefgh", "a@example.org", "org/gone")
            .await
            .unwrap();
        let live = store
            .register_instance("live-abcdefgh", "a@example.org", "org/live")
            .await
            .unwrap();
        store
            .append(&deleted.id, InstanceStatus::Deleted)
            .await
            .unwrap();

        let far_future = Utc::now() + chrono::Duration::days(30);
        let stale = store
            .list_stale_at(Duration::ZERO, far_future)
            .await
            .unwrap();

        let names: Vec<_> = stale.iter().map(|s| s.instance.name.as_str()).collect();
        assert_eq!(names, vec!["live-abcdefgh"]);
        assert_eq!(stale[0].instance.id, live.id);
    }

    #[tokio::test]
    async fn test_list_stale_uses_only_latest_event() {
        let store = test_store().await;
        let ttl = Duration::from_secs(3600);
        let now = Utc::now();
        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();

        // Old CREATED rows do not matter once a newer event exists.
        store
            .append_at(&record.id, InstanceStatus::Created, now - secs(10 * 3600))
            .await
            .unwrap();
        store
            .append_at(&record.id, InstanceStatus::Created, now - secs(9 * 3600))
            .await
            .unwrap();

        let stale = store.list_stale_at(ttl, now).await.unwrap();
        assert!(stale.is_empty(), "latest CREATED is fresh");

        let later = now + secs(2 * 3600);
        let stale = store.list_stale_at(ttl, later).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status, InstanceStatus::Created);
    }

    #[tokio::test]
    async fn test_event_log_is_append_only() {
        let store = test_store().await;
        let record = store
            .register_instance("repo-abcdefgh", "a@example.org", "org/repo")
            .await
            .unwrap();

        let update = sqlx::query("UPDATE instance_event SET status = 'DELETED' WHERE instance_id = ?")
            .bind(&record.id)
            .execute(store.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM instance_event WHERE instance_id = ?")
            .bind(&record.id)
            .execute(store.pool())
            .await;
        assert!(delete.is_err());

        assert_eq!(
            store.latest_status(&record.id).await.unwrap(),
            InstanceStatus::Created
        );
    }

    #[tokio::test]
    async fn test_find_active_instance() {
        let store = test_store().await;
        let first = store
            .register_instance("repo-aaaaaaaa", "a@example.org", "org/repo")
            .await
            .unwrap();
        store
            .append(&first.id, InstanceStatus::Deleted)
            .await
            .unwrap();

        assert!(
            store
                .find_active_instance("a@example.org", "org/repo")
                .await
                .unwrap()
                .is_none()
        );

        let second = store
            .register_instance("repo-bbbbbbbb", "a@example.org", "org/repo")
            .await
            .unwrap();

        let active = store
            .find_active_instance("a@example.org", "org/repo")
            .await
            .unwrap()
            .expect("second instance is live");
        assert_eq!(active.id, second.id);

        assert!(
            store
                .find_active_instance("b@example.org", "org/repo")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = test_store().await;
        assert!(store.health_check().await.unwrap());
        assert_eq!(store.backend(), "sqlite");
    }
}
