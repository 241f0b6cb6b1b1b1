// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that deletes expired instances.
//!
//! An instance expires when its latest event is not `DELETED` and is older
//! than the TTL. Each pass:
//! 1. Lists expired instances from the event store
//! 2. Deletes each through the lifecycle manager
//! 3. Optionally removes labelled workloads the store does not consider live
//!    (leftovers of failed creations)
//!
//! A failing instance is logged and counted; the pass continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use orchestra_store::InstanceStatus;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::manager::LifecycleManager;

/// Default instance lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(8 * 3600);

/// A lifetime of `hours` hours, or `None` if it does not fit a [`Duration`]
/// counted in seconds.
pub fn ttl_from_hours(hours: u64) -> Option<Duration> {
    hours.checked_mul(3600).map(Duration::from_secs)
}

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Whether the background loop runs.
    pub enabled: bool,
    /// How often to reap.
    pub poll_interval: Duration,
    /// Instance lifetime.
    pub ttl: Duration,
    /// Whether to also delete orphaned workloads.
    pub sweep_orphans: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(900), // 15 minutes
            ttl: DEFAULT_TTL,
            sweep_orphans: false,
        }
    }
}

impl ReaperConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ORCHESTRA_REAPER_ENABLED`: "false" or "0" to disable (default: true)
    /// - `ORCHESTRA_REAPER_INTERVAL_SECS`: seconds between passes (default: 900)
    /// - `ORCHESTRA_REAPER_TTL_HOURS`: instance lifetime in hours (default: 8)
    /// - `ORCHESTRA_REAPER_SWEEP_ORPHANS`: "true" or "1" to enable (default: false)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`ReaperConfig::from_env`] through an arbitrary lookup.
    /// Unparseable values fall back to the defaults.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = var("ORCHESTRA_REAPER_ENABLED")
            .map(|v| !(v == "false" || v == "0"))
            .unwrap_or(true);

        let poll_interval_secs = var("ORCHESTRA_REAPER_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(900);

        let ttl = var("ORCHESTRA_REAPER_TTL_HOURS")
            .and_then(|v| v.parse::<u64>().ok())
            .and_then(ttl_from_hours)
            .unwrap_or(DEFAULT_TTL);

        let sweep_orphans = var("ORCHESTRA_REAPER_SWEEP_ORPHANS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            enabled,
            poll_interval: Duration::from_secs(poll_interval_secs),
            ttl,
            sweep_orphans,
        }
    }
}

/// Outcome of one reap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    /// Expired instances found.
    pub candidates: usize,
    /// Expired instances deleted.
    pub deleted: usize,
    /// Expired instances whose deletion failed.
    pub failed: usize,
    /// Orphaned workloads removed by the sweep.
    pub orphans_deleted: usize,
}

/// Deletes expired instances on a fixed interval.
pub struct Reaper {
    manager: LifecycleManager,
    config: ReaperConfig,
    shutdown: Arc<Notify>,
}

impl Reaper {
    /// Create a new reaper.
    pub fn new(manager: LifecycleManager, config: ReaperConfig) -> Self {
        Self {
            manager,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Reaper settings.
    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Run the reaper loop until the shutdown signal is received.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Reaper disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            ttl_secs = self.config.ttl.as_secs(),
            sweep_orphans = self.config.sweep_orphans,
            "Reaper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Reaper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.reap_once(self.config.ttl).await {
                        error!(error = %e, "Reap pass failed");
                    }
                }
            }
        }

        info!("Reaper stopped");
    }

    /// Delete every instance whose latest event is older than `ttl` and not
    /// `DELETED`.
    ///
    /// Only listing the candidates can fail the pass; per-instance failures
    /// are counted in the report.
    pub async fn reap_once(&self, ttl: Duration) -> Result<ReapReport> {
        let stale = self.manager.store().list_stale(ttl).await?;
        let mut report = ReapReport {
            candidates: stale.len(),
            ..Default::default()
        };

        for candidate in stale {
            let name = &candidate.instance.name;
            match self.manager.delete(name).await {
                Ok(_) => {
                    report.deleted += 1;
                    debug!(name = %name, last_event = %candidate.timestamp, "Reaped instance");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        name = %name,
                        instance_id = %candidate.instance.id,
                        error = %e,
                        "Failed to reap instance"
                    );
                }
            }
        }

        if self.config.sweep_orphans {
            match self.sweep_orphans(ttl, Utc::now()).await {
                Ok(count) => report.orphans_deleted = count,
                Err(e) => error!(error = %e, "Orphan sweep failed"),
            }
        }

        if report.candidates > 0 || report.orphans_deleted > 0 {
            info!(
                candidates = report.candidates,
                deleted = report.deleted,
                failed = report.failed,
                orphans_deleted = report.orphans_deleted,
                "Reap pass completed"
            );
        } else {
            debug!("Reap pass completed, nothing expired");
        }

        Ok(report)
    }

    /// Run one pass and return how many instances were deleted.
    pub async fn run_reap(&self, ttl: Duration) -> Result<usize> {
        Ok(self.reap_once(ttl).await?.deleted)
    }

    /// Remove labelled workloads older than `ttl` that have no instance row,
    /// or whose instance is already `DELETED`.
    pub async fn sweep_orphans(&self, ttl: Duration, now: DateTime<Utc>) -> Result<usize> {
        let gateway = self.manager.gateway();
        let store = self.manager.store();
        let mut removed = 0;

        for workload in gateway.list_managed().await? {
            let old_enough = workload
                .created_at
                .and_then(|created| (now - created).to_std().ok())
                .is_some_and(|age| age > ttl);
            if !old_enough {
                continue;
            }

            let orphaned = match store.get_instance_by_name(&workload.name).await? {
                None => true,
                Some(instance) => store
                    .latest_event(&instance.id)
                    .await?
                    .is_none_or(|event| event.status == InstanceStatus::Deleted),
            };
            if !orphaned {
                continue;
            }

            match gateway.delete_all(&workload.name).await {
                Ok(report) if report.removed_any() => {
                    removed += 1;
                    info!(name = %workload.name, "Removed orphaned workload");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(name = %workload.name, error = %e, "Failed to remove orphaned workload");
                }
            }
        }

        Ok(removed)
    }
}
