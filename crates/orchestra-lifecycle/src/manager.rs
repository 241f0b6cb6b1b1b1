// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle manager.
//!
//! Orchestrates the gateway and the event store:
//!
//! ```text
//! PENDING ──create──▶ CREATED ──(replica ready)──▶ READY
//!                        │                           │
//!                        └──────────delete───────────┴──▶ DELETING ──▶ DELETED
//! ```
//!
//! Only `CREATED` and `DELETED` are written to the event log. `READY` is
//! asked of the cluster each time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use orchestra_store::{EventStore, InstanceEvent, InstanceRecord, InstanceStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::gateway::{ClusterGateway, DeleteReport};
use crate::naming;

/// What `create` does when the owner already has a live instance of the
/// same catalog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Always provision a new instance.
    #[default]
    AlwaysCreate,
    /// Return the newest non-deleted instance instead.
    ReuseExisting,
}

/// Manager settings.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Base domain for instance hostnames.
    pub domain: String,
    /// Policy used by [`LifecycleManager::create`].
    pub reuse_policy: ReusePolicy,
}

impl LifecycleConfig {
    /// Settings for `domain` with the default reuse policy.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            reuse_policy: ReusePolicy::default(),
        }
    }
}

/// Result of a successful `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provisioned {
    /// Resource name of the instance.
    pub name: String,
    /// Public URL, `http://{name}.{domain}/`.
    pub url: String,
    /// Whether an existing instance was returned instead of a new one.
    pub reused: bool,
}

/// Result of a successful `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deleted {
    /// Resource name of the instance.
    pub name: String,
    /// Always `DELETED`.
    pub status: InstanceStatus,
    /// Which objects this call removed.
    pub removed: DeleteReport,
}

/// Durable state of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceState {
    /// The instance row.
    pub instance: InstanceRecord,
    /// Latest durable status.
    pub status: InstanceStatus,
    /// When that status was recorded.
    pub since: DateTime<Utc>,
    /// Public URL.
    pub url: String,
}

/// Creates, inspects and deletes workshop instances.
#[derive(Clone)]
pub struct LifecycleManager {
    gateway: Arc<dyn ClusterGateway>,
    store: Arc<dyn EventStore>,
    catalog: Arc<dyn Catalog>,
    config: LifecycleConfig,
}

impl LifecycleManager {
    /// Create a manager.
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        store: Arc<dyn EventStore>,
        catalog: Arc<dyn Catalog>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            catalog,
            config,
        }
    }

    /// The cluster gateway.
    pub fn gateway(&self) -> &Arc<dyn ClusterGateway> {
        &self.gateway
    }

    /// The event store.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Manager settings.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Hostname of the instance `name`.
    pub fn host_for(&self, name: &str) -> String {
        format!("{}.{}", name, self.config.domain)
    }

    /// Public URL of the instance `name`.
    pub fn url_for(&self, name: &str) -> String {
        format!("http://{}/", self.host_for(name))
    }

    /// Provision an instance of `catalog_ref` for `owner` using the
    /// configured reuse policy.
    pub async fn create(&self, catalog_ref: &str, owner: &str) -> Result<Provisioned> {
        self.create_with_policy(catalog_ref, owner, self.config.reuse_policy)
            .await
    }

    /// Provision an instance of `catalog_ref` for `owner`.
    ///
    /// Workload, service and route are created in that order. A failing step
    /// is returned as is: objects created by earlier steps are left in place
    /// and no event is recorded. Returns without waiting for readiness.
    pub async fn create_with_policy(
        &self,
        catalog_ref: &str,
        owner: &str,
        policy: ReusePolicy,
    ) -> Result<Provisioned> {
        if policy == ReusePolicy::ReuseExisting
            && let Some(existing) = self.store.find_active_instance(owner, catalog_ref).await?
        {
            info!(
                name = %existing.name,
                owner = %owner,
                catalog_ref = %catalog_ref,
                "Reusing existing instance"
            );
            return Ok(Provisioned {
                url: self.url_for(&existing.name),
                name: existing.name,
                reused: true,
            });
        }

        let spec = self.catalog.lookup(catalog_ref).await?;
        let name = naming::generate_name(&naming::slug_for_image(catalog_ref));
        let host = self.host_for(&name);

        debug!(name = %name, image = %spec.image, "Provisioning instance");

        if let Err(e) = self.gateway.create_workload(&name, &spec).await {
            error!(name = %name, error = %e, "Failed to create workload");
            return Err(e.into());
        }
        if let Err(e) = self.gateway.create_service(&name, spec.port).await {
            error!(name = %name, error = %e, "Failed to create service");
            return Err(e.into());
        }
        if let Err(e) = self.gateway.create_route(&name, &host).await {
            error!(name = %name, error = %e, "Failed to create route");
            return Err(e.into());
        }

        let record = self
            .store
            .register_instance(&name, owner, catalog_ref)
            .await
            .inspect_err(|e| {
                error!(name = %name, error = %e, "Resources created but instance not recorded");
            })?;

        info!(
            instance_id = %record.id,
            name = %name,
            owner = %owner,
            image = %spec.image,
            "Instance created"
        );

        Ok(Provisioned {
            url: self.url_for(&name),
            name,
            reused: false,
        })
    }

    /// Whether the instance has a ready replica. Lookup failures count as
    /// not ready.
    pub async fn is_ready(&self, name: &str) -> bool {
        match self.gateway.is_ready(name).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(name = %name, error = %e, "Readiness check failed");
                false
            }
        }
    }

    /// Delete the instance `name` and record `DELETED`.
    ///
    /// Idempotent: objects already gone are skipped and no second `DELETED`
    /// event is written. If cluster deletion fails, nothing is recorded.
    ///
    /// A name with no recorded instance (left over from a failed creation)
    /// succeeds only while something was removed; once its objects are gone
    /// a repeat call returns [`Error::NotFound`].
    pub async fn delete(&self, name: &str) -> Result<Deleted> {
        let removed = self.gateway.delete_all(name).await.inspect_err(|e| {
            error!(name = %name, error = %e, "Failed to delete instance resources");
        })?;

        let Some(instance) = self.store.get_instance_by_name(name).await? else {
            if removed.removed_any() {
                warn!(name = %name, "Removed resources of an unrecorded instance");
                return Ok(Deleted {
                    name: name.to_string(),
                    status: InstanceStatus::Deleted,
                    removed,
                });
            }
            return Err(Error::NotFound(name.to_string()));
        };

        let already_deleted = self
            .store
            .latest_event(&instance.id)
            .await?
            .is_some_and(|event| event.status.is_terminal());

        if already_deleted {
            debug!(name = %name, "Instance already deleted");
        } else {
            self.store
                .append(&instance.id, InstanceStatus::Deleted)
                .await?;
            info!(instance_id = %instance.id, name = %name, "Instance deleted");
        }

        Ok(Deleted {
            name: name.to_string(),
            status: InstanceStatus::Deleted,
            removed,
        })
    }

    /// Durable state of the instance `name`.
    pub async fn status(&self, name: &str) -> Result<InstanceState> {
        let instance = self
            .store
            .get_instance_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let latest = self
            .store
            .latest_event(&instance.id)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        Ok(InstanceState {
            url: self.url_for(&instance.name),
            instance,
            status: latest.status,
            since: latest.timestamp,
        })
    }

    /// All events of the instance `name`, oldest first.
    pub async fn history(&self, name: &str) -> Result<Vec<InstanceEvent>> {
        let instance = self
            .store
            .get_instance_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok(self.store.list_events(&instance.id).await?)
    }
}
