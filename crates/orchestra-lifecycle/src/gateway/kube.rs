// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes gateway.
//!
//! Maps instance resources onto a `Deployment`, a `Service` and an
//! `Ingress` in a single namespace. Every object carries the instance label
//! (e.g. `org=workshop`) plus `app={name}`, which the service selects on.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{
    ClusterGateway, GatewayError, ManagedWorkload, ResourceKind, Result, SERVICE_PORT,
    WorkloadSpec,
};

/// Settings for [`KubeGateway`].
#[derive(Debug, Clone)]
pub struct KubeGatewayConfig {
    /// Namespace all instance objects live in.
    pub namespace: String,
    /// Key of the label marking managed objects.
    pub label_key: String,
    /// Value of the label marking managed objects.
    pub label_value: String,
    /// Ingress class name, if the cluster needs one.
    pub ingress_class: Option<String>,
    /// Upper bound for a single API call.
    pub request_timeout: Duration,
}

impl Default for KubeGatewayConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            label_key: "org".to_string(),
            label_value: "workshop".to_string(),
            ingress_class: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl KubeGatewayConfig {
    /// Label selector matching managed objects.
    pub fn selector(&self) -> String {
        format!("{}={}", self.label_key, self.label_value)
    }

    fn labels(&self, name: &str) -> Value {
        let mut labels = serde_json::Map::new();
        labels.insert(self.label_key.clone(), json!(self.label_value));
        labels.insert("app".to_string(), json!(name));
        Value::Object(labels)
    }

    fn metadata(&self, name: &str) -> Value {
        json!({
            "name": name,
            "namespace": self.namespace,
            "labels": self.labels(name),
        })
    }

    /// Deployment manifest: one replica, one container named after the instance.
    pub fn deployment(&self, name: &str, spec: &WorkloadSpec) -> Result<Deployment> {
        let mut requests = serde_json::Map::new();
        requests.insert("memory".into(), json!(spec.resources.memory_request));
        requests.insert("cpu".into(), json!(spec.resources.cpu_request));

        let mut limits = serde_json::Map::new();
        if let Some(memory) = &spec.resources.memory_limit {
            limits.insert("memory".into(), json!(memory));
        }
        if let Some(cpu) = &spec.resources.cpu_limit {
            limits.insert("cpu".into(), json!(cpu));
        }

        let env: Vec<Value> = spec
            .env
            .iter()
            .map(|(key, value)| json!({ "name": key, "value": value }))
            .collect();

        let manifest = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": self.metadata(name),
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": self.labels(name) },
                "template": {
                    "metadata": { "labels": self.labels(name) },
                    "spec": {
                        "containers": [{
                            "name": name,
                            "image": spec.image,
                            "ports": [{ "containerPort": spec.port }],
                            "env": env,
                            "resources": { "requests": requests, "limits": limits },
                        }],
                    },
                },
            },
        });

        serde_json::from_value(manifest).map_err(|e| GatewayError::InvalidSpec(e.to_string()))
    }

    /// ClusterIP service manifest forwarding port 80 to `target_port`.
    pub fn service(&self, name: &str, target_port: u16) -> Result<Service> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": self.metadata(name),
            "spec": {
                "type": "ClusterIP",
                "selector": { "app": name },
                "ports": [{
                    "name": "http",
                    "protocol": "TCP",
                    "port": SERVICE_PORT,
                    "targetPort": target_port,
                }],
            },
        });

        serde_json::from_value(manifest).map_err(|e| GatewayError::InvalidSpec(e.to_string()))
    }

    /// Ingress manifest routing `host` path `/` to the service.
    pub fn ingress(&self, name: &str, host: &str) -> Result<Ingress> {
        let mut spec = json!({
            "rules": [{
                "host": host,
                "http": {
                    "paths": [{
                        "path": "/",
                        "pathType": "Prefix",
                        "backend": {
                            "service": {
                                "name": name,
                                "port": { "number": SERVICE_PORT },
                            },
                        },
                    }],
                },
            }],
        });
        if let Some(class) = &self.ingress_class {
            spec["ingressClassName"] = json!(class);
        }

        let manifest = json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": self.metadata(name),
            "spec": spec,
        });

        serde_json::from_value(manifest).map_err(|e| GatewayError::InvalidSpec(e.to_string()))
    }
}

/// Translate a client error for `operation` on `kind`/`name`.
fn map_kube_error(
    err: kube::Error,
    operation: &'static str,
    kind: ResourceKind,
    name: &str,
) -> GatewayError {
    match err {
        kube::Error::Api(response) if response.code == 404 => GatewayError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => GatewayError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(response) => GatewayError::Api {
            operation,
            name: name.to_string(),
            code: response.code,
            message: response.message,
        },
        other => GatewayError::Client(other.to_string()),
    }
}

/// Gateway backed by a Kubernetes API server.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    config: KubeGatewayConfig,
}

impl KubeGateway {
    /// Create a gateway from an existing client.
    pub fn new(client: Client, config: KubeGatewayConfig) -> Self {
        Self { client, config }
    }

    /// Create a gateway using the ambient kubeconfig or in-cluster credentials.
    pub async fn try_default(config: KubeGatewayConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        info!(
            namespace = %config.namespace,
            selector = %config.selector(),
            "Connected to Kubernetes API"
        );
        Ok(Self::new(client, config))
    }

    /// Gateway settings.
    pub fn config(&self) -> &KubeGatewayConfig {
        &self.config
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn ingresses(&self) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Run one API call under the request timeout.
    async fn call<T, F>(
        &self,
        operation: &'static str,
        kind: ResourceKind,
        name: &str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>> + Send,
    {
        with_timeout(self.config.request_timeout, operation, name, fut)
            .await?
            .map_err(|e| map_kube_error(e, operation, kind, name))
    }
}

/// Await `fut`, giving up after `timeout`.
async fn with_timeout<T, F>(
    timeout: Duration,
    operation: &'static str,
    name: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| GatewayError::Timeout {
            operation,
            name: name.to_string(),
            timeout,
        })
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    fn gateway_type(&self) -> &'static str {
        "kubernetes"
    }

    async fn create_workload(&self, name: &str, spec: &WorkloadSpec) -> Result<()> {
        let deployment = self.config.deployment(name, spec)?;
        let api = self.deployments();
        let pp = PostParams::default();
        self.call(
            "create_workload",
            ResourceKind::Workload,
            name,
            api.create(&pp, &deployment),
        )
        .await?;
        debug!(name = %name, image = %spec.image, "Created deployment");
        Ok(())
    }

    async fn create_service(&self, name: &str, target_port: u16) -> Result<()> {
        let service = self.config.service(name, target_port)?;
        let api = self.services();
        let pp = PostParams::default();
        self.call(
            "create_service",
            ResourceKind::Service,
            name,
            api.create(&pp, &service),
        )
        .await?;
        debug!(name = %name, target_port, "Created service");
        Ok(())
    }

    async fn create_route(&self, name: &str, host: &str) -> Result<()> {
        let ingress = self.config.ingress(name, host)?;
        let api = self.ingresses();
        let pp = PostParams::default();
        self.call(
            "create_route",
            ResourceKind::Route,
            name,
            api.create(&pp, &ingress),
        )
        .await?;
        debug!(name = %name, host = %host, "Created ingress");
        Ok(())
    }

    async fn is_ready(&self, name: &str) -> Result<bool> {
        let api = self.deployments();
        let deployment = self
            .call("is_ready", ResourceKind::Workload, name, api.get(name))
            .await?;
        let ready_replicas = deployment
            .status
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);
        Ok(ready_replicas >= 1)
    }

    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let dp = DeleteParams::background();
        let result = match kind {
            ResourceKind::Route => {
                let api = self.ingresses();
                self.call("delete", kind, name, async { api.delete(name, &dp).await.map(|_| ()) })
                    .await
            }
            ResourceKind::Service => {
                let api = self.services();
                self.call("delete", kind, name, async { api.delete(name, &dp).await.map(|_| ()) })
                    .await
            }
            ResourceKind::Workload => {
                let api = self.deployments();
                self.call("delete", kind, name, async { api.delete(name, &dp).await.map(|_| ()) })
                    .await
            }
        };

        match result {
            Ok(()) => {
                debug!(name = %name, kind = %kind, "Deleted resource");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_managed(&self) -> Result<Vec<ManagedWorkload>> {
        let api = self.deployments();
        let lp = ListParams::default().labels(&self.config.selector());
        let list = self
            .call("list_managed", ResourceKind::Workload, "*", api.list(&lp))
            .await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|deployment| {
                let name = deployment.metadata.name?;
                Some(ManagedWorkload {
                    name,
                    created_at: deployment.metadata.creation_timestamp.map(|t| t.0),
                })
            })
            .collect())
    }
}
