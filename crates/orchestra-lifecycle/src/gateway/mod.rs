// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster gateway - the control-plane facade.
//!
//! An instance is materialized as three objects that share its name:
//!
//! | Kind | Kubernetes object | Purpose |
//! |------|-------------------|---------|
//! | Workload | `Deployment` (1 replica) | Runs the workshop image |
//! | Service | `Service` (ClusterIP) | Stable endpoint selecting the workload |
//! | Route | `Ingress` | Maps `{name}.{domain}` to the service |
//!
//! Gateways hold no state of their own beyond a client handle.

pub mod kube;
pub mod mock;

pub use self::kube::{KubeGateway, KubeGatewayConfig};
pub use self::mock::{GatewayOp, MockGateway};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port the service exposes; the route targets it.
pub const SERVICE_PORT: u16 = 80;

/// One of the three objects making up an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// The deployment running the image.
    Workload,
    /// The cluster-internal service.
    Service,
    /// The ingress rule.
    Route,
}

impl ResourceKind {
    /// Deletion order: route first so no route briefly points at nothing.
    pub const DELETE_ORDER: [ResourceKind; 3] =
        [ResourceKind::Route, ResourceKind::Service, ResourceKind::Workload];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Workload => "workload",
            Self::Service => "service",
            Self::Route => "route",
        })
    }
}

/// Errors from control-plane operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// An object with this name already exists (name collision).
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Object kind.
        kind: ResourceKind,
        /// Object name.
        name: String,
    },

    /// The object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Object kind.
        kind: ResourceKind,
        /// Object name.
        name: String,
    },

    /// The control plane rejected the request (invalid spec, quota, ...).
    #[error("{operation} '{name}' rejected ({code}): {message}")]
    Api {
        /// Operation that failed.
        operation: &'static str,
        /// Object name.
        name: String,
        /// HTTP status code returned by the API server.
        code: u16,
        /// Message returned by the API server.
        message: String,
    },

    /// The call did not complete within the request timeout.
    #[error("{operation} '{name}' timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Object name.
        name: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// A manifest could not be built.
    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    /// The control plane could not be reached or the client failed.
    #[error("Control plane client error: {0}")]
    Client(String),
}

impl GatewayError {
    /// Whether this error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Memory and CPU requests and limits, in Kubernetes quantity notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Memory request, e.g. `5000Mi`.
    pub memory_request: String,
    /// CPU request, e.g. `500m`.
    pub cpu_request: String,
    /// Memory limit.
    #[serde(default)]
    pub memory_limit: Option<String>,
    /// CPU limit.
    #[serde(default)]
    pub cpu_limit: Option<String>,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            memory_request: "5000Mi".to_string(),
            cpu_request: "500m".to_string(),
            memory_limit: Some("5000Mi".to_string()),
            cpu_limit: Some("1800m".to_string()),
        }
    }
}

fn default_port() -> u16 {
    8787
}

/// What to run for an instance: resolved from a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Container image reference.
    pub image: String,
    /// Container port the service targets.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Resource requests and limits.
    #[serde(default)]
    pub resources: ResourceProfile,
    /// Environment variables for the container.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// A spec for `image` with the default port and resource profile.
    pub fn for_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            port: default_port(),
            resources: ResourceProfile::default(),
            env: BTreeMap::new(),
        }
    }
}

/// Which objects a `delete_all` call actually removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// The route was removed.
    pub route: bool,
    /// The service was removed.
    pub service: bool,
    /// The workload was removed.
    pub workload: bool,
}

impl DeleteReport {
    fn record(&mut self, kind: ResourceKind, removed: bool) {
        match kind {
            ResourceKind::Route => self.route = removed,
            ResourceKind::Service => self.service = removed,
            ResourceKind::Workload => self.workload = removed,
        }
    }

    /// Whether anything was removed.
    pub fn removed_any(&self) -> bool {
        self.route || self.service || self.workload
    }
}

/// A labelled workload found on the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedWorkload {
    /// Object name (= instance name).
    pub name: String,
    /// When the control plane created the object.
    pub created_at: Option<DateTime<Utc>>,
}

/// Control-plane facade for instance resources.
///
/// Gateways are PURE control-plane clients - they do NOT access the event
/// store. Recording lifecycle events is the caller's job.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Gateway type identifier (e.g., "kubernetes", "mock").
    fn gateway_type(&self) -> &'static str;

    /// Create a single-replica workload running `spec.image`.
    async fn create_workload(&self, name: &str, spec: &WorkloadSpec) -> Result<()>;

    /// Create a cluster-internal service forwarding [`SERVICE_PORT`] to
    /// `target_port` on the workload labelled `app={name}`.
    async fn create_service(&self, name: &str, target_port: u16) -> Result<()>;

    /// Create a route mapping `host` to the service `name`.
    async fn create_route(&self, name: &str, host: &str) -> Result<()>;

    /// Whether the workload has at least one ready replica.
    ///
    /// Returns `Ok(false)` while the workload is starting and an error only
    /// when the workload cannot be looked up.
    async fn is_ready(&self, name: &str) -> Result<bool>;

    /// Delete one object. Returns `Ok(false)` if it did not exist.
    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<bool>;

    /// Delete route, service and workload, in that order.
    ///
    /// Absent objects are skipped. The first other error stops the sequence
    /// and is returned; a later call resumes where this one stopped.
    async fn delete_all(&self, name: &str) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        for kind in ResourceKind::DELETE_ORDER {
            let removed = self.delete_resource(kind, name).await?;
            report.record(kind, removed);
        }
        Ok(report)
    }

    /// Workloads carrying the instance label.
    async fn list_managed(&self) -> Result<Vec<ManagedWorkload>>;
}
