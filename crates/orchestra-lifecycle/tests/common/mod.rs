// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for orchestra-lifecycle tests.
//!
//! Provides TestContext wiring a MockGateway and an in-memory SQLite store
//! into a LifecycleManager.

#![allow(dead_code)]

use std::sync::Arc;

use orchestra_lifecycle::catalog::{Catalog, ImageCatalog};
use orchestra_lifecycle::gateway::MockGateway;
use orchestra_lifecycle::manager::{LifecycleConfig, LifecycleManager};
use orchestra_lifecycle::reaper::{Reaper, ReaperConfig};
use orchestra_store::{EventStore, SqliteEventStore};

pub const DOMAIN: &str = "workshop.example.org";
pub const OWNER: &str = "alice@example.org";

/// Mock cluster, in-memory store and a manager over both.
pub struct TestContext {
    pub gateway: MockGateway,
    pub store: Arc<SqliteEventStore>,
    pub manager: LifecycleManager,
}

impl TestContext {
    /// Context using the image catalog.
    pub async fn new() -> Self {
        Self::with_catalog(Arc::new(ImageCatalog::new())).await
    }

    /// Context using `catalog`.
    pub async fn with_catalog(catalog: Arc<dyn Catalog>) -> Self {
        let gateway = MockGateway::new();
        let store = Arc::new(
            SqliteEventStore::in_memory()
                .await
                .expect("Failed to create in-memory store"),
        );
        let manager = LifecycleManager::new(
            Arc::new(gateway.clone()),
            store.clone() as Arc<dyn EventStore>,
            catalog,
            LifecycleConfig::new(DOMAIN),
        );

        Self {
            gateway,
            store,
            manager,
        }
    }

    /// A reaper over this context's manager.
    pub fn reaper(&self, config: ReaperConfig) -> Reaper {
        Reaper::new(self.manager.clone(), config)
    }
}

/// Whether `name` is `{slug}-` followed by 8 lowercase ASCII letters.
pub fn has_generated_suffix(name: &str, slug: &str) -> bool {
    let Some(suffix) = name.strip_prefix(slug).and_then(|s| s.strip_prefix('-')) else {
        return false;
    };
    suffix.len() == 8 && suffix.chars().all(|c| c.is_ascii_lowercase())
}
