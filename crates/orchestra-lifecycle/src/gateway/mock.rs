// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock gateway for testing.
//!
//! Keeps the three resource maps in memory and simulates the control plane's
//! conflict and not-found behaviour, without talking to a cluster.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{ClusterGateway, GatewayError, ManagedWorkload, ResourceKind, Result, WorkloadSpec};

/// A gateway operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    /// `create_workload`
    CreateWorkload,
    /// `create_service`
    CreateService,
    /// `create_route`
    CreateRoute,
    /// `is_ready`
    IsReady,
    /// `delete_resource` for the given kind
    Delete(ResourceKind),
    /// `list_managed`
    ListManaged,
}

impl GatewayOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::CreateWorkload => "create_workload",
            Self::CreateService => "create_service",
            Self::CreateRoute => "create_route",
            Self::IsReady => "is_ready",
            Self::Delete(_) => "delete",
            Self::ListManaged => "list_managed",
        }
    }
}

#[derive(Debug, Clone)]
struct MockWorkload {
    spec: WorkloadSpec,
    ready: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockCluster {
    workloads: HashMap<String, MockWorkload>,
    services: HashMap<String, u16>,
    routes: HashMap<String, String>,
    /// `None` name matches every call of that operation.
    failures: Vec<(GatewayOp, Option<String>)>,
    mutations: usize,
}

impl MockCluster {
    fn check_failure(&self, op: GatewayOp, name: &str) -> Result<()> {
        let hit = self
            .failures
            .iter()
            .any(|(f, n)| *f == op && n.as_deref().is_none_or(|n| n == name));
        if hit {
            return Err(GatewayError::Api {
                operation: op.as_str(),
                name: name.to_string(),
                code: 500,
                message: "Mock failure".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory gateway for tests and dry runs.
///
/// Workloads start not ready; call [`MockGateway::set_ready`] to simulate the
/// first replica coming up.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    cluster: Arc<Mutex<MockCluster>>,
}

impl MockGateway {
    /// Create an empty mock cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail.
    pub async fn fail_on(&self, op: GatewayOp) {
        self.cluster.lock().await.failures.push((op, None));
    }

    /// Make calls of `op` for `name` fail.
    pub async fn fail_on_name(&self, op: GatewayOp, name: &str) {
        self.cluster
            .lock()
            .await
            .failures
            .push((op, Some(name.to_string())));
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.cluster.lock().await.failures.clear();
    }

    /// Mark a workload ready or not ready. No-op if it does not exist.
    pub async fn set_ready(&self, name: &str, ready: bool) {
        if let Some(workload) = self.cluster.lock().await.workloads.get_mut(name) {
            workload.ready = ready;
        }
    }

    /// Whether an object of `kind` named `name` exists.
    pub async fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        let cluster = self.cluster.lock().await;
        match kind {
            ResourceKind::Workload => cluster.workloads.contains_key(name),
            ResourceKind::Service => cluster.services.contains_key(name),
            ResourceKind::Route => cluster.routes.contains_key(name),
        }
    }

    /// Spec the workload `name` was created with.
    pub async fn workload_spec(&self, name: &str) -> Option<WorkloadSpec> {
        self.cluster
            .lock()
            .await
            .workloads
            .get(name)
            .map(|w| w.spec.clone())
    }

    /// Host the route `name` maps.
    pub async fn route_host(&self, name: &str) -> Option<String> {
        self.cluster.lock().await.routes.get(name).cloned()
    }

    /// Number of successful create and delete calls so far.
    pub async fn mutation_count(&self) -> usize {
        self.cluster.lock().await.mutations
    }

    /// Place a labelled workload on the cluster directly, bypassing the
    /// mutation counter. Simulates resources left by another process.
    pub async fn seed_workload(&self, name: &str, image: &str, created_at: DateTime<Utc>) {
        self.cluster.lock().await.workloads.insert(
            name.to_string(),
            MockWorkload {
                spec: WorkloadSpec::for_image(image),
                ready: false,
                created_at,
            },
        );
    }
}

#[async_trait]
impl ClusterGateway for MockGateway {
    fn gateway_type(&self) -> &'static str {
        "mock"
    }

    async fn create_workload(&self, name: &str, spec: &WorkloadSpec) -> Result<()> {
        let mut cluster = self.cluster.lock().await;
        cluster.check_failure(GatewayOp::CreateWorkload, name)?;
        if cluster.workloads.contains_key(name) {
            return Err(GatewayError::AlreadyExists {
                kind: ResourceKind::Workload,
                name: name.to_string(),
            });
        }
        cluster.workloads.insert(
            name.to_string(),
            MockWorkload {
                spec: spec.clone(),
                ready: false,
                created_at: Utc::now(),
            },
        );
        cluster.mutations += 1;
        Ok(())
    }

    async fn create_service(&self, name: &str, target_port: u16) -> Result<()> {
        let mut cluster = self.cluster.lock().await;
        cluster.check_failure(GatewayOp::CreateService, name)?;
        if cluster.services.contains_key(name) {
            return Err(GatewayError::AlreadyExists {
                kind: ResourceKind::Service,
                name: name.to_string(),
            });
        }
        cluster.services.insert(name.to_string(), target_port);
        cluster.mutations += 1;
        Ok(())
    }

    async fn create_route(&self, name: &str, host: &str) -> Result<()> {
        let mut cluster = self.cluster.lock().await;
        cluster.check_failure(GatewayOp::CreateRoute, name)?;
        if cluster.routes.contains_key(name) {
            return Err(GatewayError::AlreadyExists {
                kind: ResourceKind::Route,
                name: name.to_string(),
            });
        }
        cluster.routes.insert(name.to_string(), host.to_string());
        cluster.mutations += 1;
        Ok(())
    }

    async fn is_ready(&self, name: &str) -> Result<bool> {
        let cluster = self.cluster.lock().await;
        cluster.check_failure(GatewayOp::IsReady, name)?;
        cluster
            .workloads
            .get(name)
            .map(|w| w.ready)
            .ok_or_else(|| GatewayError::NotFound {
                kind: ResourceKind::Workload,
                name: name.to_string(),
            })
    }

    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let mut cluster = self.cluster.lock().await;
        cluster.check_failure(GatewayOp::Delete(kind), name)?;
        let removed = match kind {
            ResourceKind::Workload => cluster.workloads.remove(name).is_some(),
            ResourceKind::Service => cluster.services.remove(name).is_some(),
            ResourceKind::Route => cluster.routes.remove(name).is_some(),
        };
        if removed {
            cluster.mutations += 1;
        }
        Ok(removed)
    }

    async fn list_managed(&self) -> Result<Vec<ManagedWorkload>> {
        let cluster = self.cluster.lock().await;
        cluster.check_failure(GatewayOp::ListManaged, "")?;
        let mut workloads: Vec<_> = cluster
            .workloads
            .iter()
            .map(|(name, w)| ManagedWorkload {
                name: name.clone(),
                created_at: Some(w.created_at),
            })
            .collect();
        workloads.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_create_and_ready() {
        let gateway = MockGateway::new();
        let spec = WorkloadSpec::for_image("org/repo:tag");

        gateway.create_workload("repo-abcdefgh", &spec).await.unwrap();
        assert!(!gateway.is_ready("repo-abcdefgh").await.unwrap());

        gateway.set_ready("repo-abcdefgh", true).await;
        assert!(gateway.is_ready("repo-abcdefgh").await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_name_collision() {
        let gateway = MockGateway::new();
        gateway.create_service("repo-abcdefgh", 8787).await.unwrap();

        let err = gateway
            .create_service("repo-abcdefgh", 8787)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::AlreadyExists {
                kind: ResourceKind::Service,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_mock_ready_on_missing_workload_is_error() {
        let gateway = MockGateway::new();
        let err = gateway.is_ready("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mock_delete_all_skips_absent_objects() {
        let gateway = MockGateway::new();
        gateway
            .create_workload("repo-abcdefgh", &WorkloadSpec::for_image("org/repo"))
            .await
            .unwrap();

        let report = gateway.delete_all("repo-abcdefgh").await.unwrap();
        assert!(report.workload);
        assert!(!report.service);
        assert!(!report.route);

        let again = gateway.delete_all("repo-abcdefgh").await.unwrap();
        assert!(!again.removed_any());
        assert_eq!(gateway.mutation_count().await, 2);
    }

    #[tokio::test]
    async fn test_mock_delete_all_stops_at_first_error() {
        let gateway = MockGateway::new();
        let spec = WorkloadSpec::for_image("org/repo");
        gateway.create_workload("repo-a", &spec).await.unwrap();
        gateway.create_service("repo-a", 8787).await.unwrap();
        gateway.create_route("repo-a", "repo-a.example.org").await.unwrap();

        gateway
            .fail_on_name(GatewayOp::Delete(ResourceKind::Service), "repo-a")
            .await;
        assert!(gateway.delete_all("repo-a").await.is_err());

        assert!(!gateway.contains(ResourceKind::Route, "repo-a").await);
        assert!(gateway.contains(ResourceKind::Service, "repo-a").await);
        assert!(gateway.contains(ResourceKind::Workload, "repo-a").await);

        gateway.clear_failures().await;
        let report = gateway.delete_all("repo-a").await.unwrap();
        assert!(!report.route);
        assert!(report.service);
        assert!(report.workload);
    }

    #[tokio::test]
    async fn test_mock_failure_targets_single_name() {
        let gateway = MockGateway::new();
        gateway.fail_on_name(GatewayOp::CreateRoute, "bad").await;

        assert!(gateway.create_route("bad", "bad.example.org").await.is_err());
        assert!(gateway.create_route("good", "good.example.org").await.is_ok());
        assert_eq!(
            gateway.route_host("good").await.as_deref(),
            Some("good.example.org")
        );
    }
}
