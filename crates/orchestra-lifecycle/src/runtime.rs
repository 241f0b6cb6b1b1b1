// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for orchestra-lifecycle.
//!
//! [`OrchestraRuntime`] wires a gateway, an event store and a catalog into a
//! [`LifecycleManager`] and runs the [`Reaper`] in the background.
//!
//! # Example
//!
//! ```rust,ignore
//! use orchestra_lifecycle::config::Config;
//! use orchestra_lifecycle::runtime::OrchestraRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!
//!     let runtime = OrchestraRuntime::from_config(&config)
//!         .await?
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let provisioned = runtime.manager().create("org/repo:tag", "a@example.org").await?;
//!     println!("{}", provisioned.url);
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use orchestra_store::EventStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, ImageCatalog, StaticCatalog};
use crate::config::Config;
use crate::gateway::{ClusterGateway, KubeGateway};
use crate::manager::{LifecycleConfig, LifecycleManager};
use crate::reaper::{Reaper, ReaperConfig};

/// Builder for creating an [`OrchestraRuntime`].
pub struct OrchestraRuntimeBuilder {
    gateway: Option<Arc<dyn ClusterGateway>>,
    store: Option<Arc<dyn EventStore>>,
    catalog: Option<Arc<dyn Catalog>>,
    lifecycle_config: Option<LifecycleConfig>,
    reaper_config: ReaperConfig,
}

impl Default for OrchestraRuntimeBuilder {
    fn default() -> Self {
        Self {
            gateway: None,
            store: None,
            catalog: None,
            lifecycle_config: None,
            reaper_config: ReaperConfig::default(),
        }
    }
}

impl OrchestraRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cluster gateway (required).
    pub fn gateway(mut self, gateway: Arc<dyn ClusterGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Set the event store (required).
    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the catalog. Defaults to [`ImageCatalog`].
    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the manager settings (required).
    pub fn lifecycle_config(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle_config = Some(config);
        self
    }

    /// Set the base domain, keeping the default reuse policy.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.lifecycle_config = Some(LifecycleConfig::new(domain));
        self
    }

    /// Set the reaper settings.
    pub fn reaper_config(mut self, config: ReaperConfig) -> Self {
        self.reaper_config = config;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<OrchestraRuntimeConfig> {
        let gateway = self
            .gateway
            .ok_or_else(|| anyhow::anyhow!("gateway is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let lifecycle_config = self
            .lifecycle_config
            .ok_or_else(|| anyhow::anyhow!("domain is required"))?;
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(ImageCatalog::new()));

        Ok(OrchestraRuntimeConfig {
            manager: LifecycleManager::new(gateway, store, catalog, lifecycle_config),
            reaper_config: self.reaper_config,
        })
    }
}

/// Configuration for an [`OrchestraRuntime`].
pub struct OrchestraRuntimeConfig {
    manager: LifecycleManager,
    reaper_config: ReaperConfig,
}

impl OrchestraRuntimeConfig {
    /// The manager the runtime will use. One-shot commands can use it
    /// without starting the reaper.
    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    /// A reaper over the same manager, not yet running.
    pub fn reaper(&self) -> Reaper {
        Reaper::new(self.manager.clone(), self.reaper_config.clone())
    }

    /// Start the runtime, spawning the reaper task.
    pub async fn start(self) -> Result<OrchestraRuntime> {
        let store = self.manager.store();
        match store.health_check().await {
            Ok(true) => {}
            Ok(false) => warn!(backend = store.backend(), "Event store health check failed"),
            Err(e) => return Err(e.into()),
        }

        let reaper = self.reaper();
        let reaper_shutdown = reaper.shutdown_handle();
        let reaper_handle = tokio::spawn(async move {
            reaper.run().await;
        });

        info!(
            gateway = self.manager.gateway().gateway_type(),
            store = self.manager.store().backend(),
            domain = %self.manager.config().domain,
            reaper_enabled = self.reaper_config.enabled,
            "OrchestraRuntime started"
        );

        Ok(OrchestraRuntime {
            manager: self.manager,
            reaper_handle,
            reaper_shutdown,
        })
    }
}

/// A running orchestra instance that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct OrchestraRuntime {
    manager: LifecycleManager,
    reaper_handle: JoinHandle<()>,
    reaper_shutdown: Arc<Notify>,
}

impl OrchestraRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> OrchestraRuntimeBuilder {
        OrchestraRuntimeBuilder::new()
    }

    /// A builder populated from `config`: connects the event store, the
    /// Kubernetes API and loads the catalog.
    pub async fn from_config(config: &Config) -> Result<OrchestraRuntimeBuilder> {
        let store = orchestra_store::connect(&config.database_url).await?;
        let gateway = KubeGateway::try_default(config.gateway_config()).await?;
        let catalog: Arc<dyn Catalog> = match &config.catalog_path {
            Some(path) => Arc::new(StaticCatalog::from_file(path).await?),
            None => Arc::new(ImageCatalog::new()),
        };

        Ok(Self::builder()
            .store(store)
            .gateway(Arc::new(gateway))
            .catalog(catalog)
            .lifecycle_config(config.lifecycle_config())
            .reaper_config(config.reaper.clone()))
    }

    /// The lifecycle manager.
    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the reaper to stop and waits for it. A reap pass in progress
    /// runs to completion first.
    pub async fn shutdown(self) -> Result<()> {
        info!("OrchestraRuntime shutting down...");

        self.reaper_shutdown.notify_one();

        match self.reaper_handle.await {
            Ok(()) => {
                info!("OrchestraRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Reaper task panicked: {}", e);
                Err(anyhow::anyhow!("reaper task panicked: {}", e))
            }
        }
    }

    /// Check if the reaper is still running.
    pub fn is_running(&self) -> bool {
        !self.reaper_handle.is_finished()
    }
}
