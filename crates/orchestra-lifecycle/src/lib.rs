// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestra Lifecycle - ephemeral workshop instances on Kubernetes
//!
//! This crate provisions, inspects, and tears down short-lived workshop
//! environments. Each instance is a workload, a service and a route that
//! share one generated name and are reachable at `http://{name}.{domain}/`.
//! Every lifecycle transition is appended to the event log in
//! `orchestra-store`; a background reaper deletes instances older than a TTL.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Callers (CLI, front end)                      │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                orchestra-lifecycle (This Crate)                   │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────┐ │
//! │  │  Lifecycle  │  │   Reaper    │  │   Catalog   │  │  Naming  │ │
//! │  │   Manager   │◄─│ (TTL sweep) │  │             │  │          │ │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//!           │                                   │
//!           ▼                                   ▼
//! ┌─────────────────────────┐      ┌───────────────────────────────┐
//! │     Cluster Gateway     │      │        orchestra-store        │
//! │ Deployment/Service/     │      │  instance + instance_event    │
//! │ Ingress (Kubernetes)    │      │  (PostgreSQL or SQLite)       │
//! └─────────────────────────┘      └───────────────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `create` | Provision workload, service and route; record `CREATED` |
//! | `is_ready` | Whether the workload has a ready replica |
//! | `delete` | Remove route, service and workload; record `DELETED` |
//! | `status` / `history` | Durable state and event log of an instance |
//! | `run_reap` | Delete instances whose latest event is older than the TTL |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ORCHESTRA_DATABASE_URL` | (required) | Event store URL |
//! | `ORCHESTRA_DOMAIN` | (required) | Base domain for instance hosts |
//! | `ORCHESTRA_NAMESPACE` | `default` | Namespace for instance objects |
//! | `ORCHESTRA_INSTANCE_LABEL` | `org=workshop` | Label on managed objects |
//! | `ORCHESTRA_INGRESS_CLASS` | - | Ingress class name |
//! | `ORCHESTRA_REQUEST_TIMEOUT_SECS` | `30` | Control-plane call timeout |
//! | `ORCHESTRA_CATALOG_PATH` | - | JSON catalog file |
//! | `ORCHESTRA_REUSE_EXISTING` | `false` | Return a live instance instead of creating |
//! | `ORCHESTRA_REAPER_ENABLED` | `true` | Run the background reaper |
//! | `ORCHESTRA_REAPER_INTERVAL_SECS` | `900` | Seconds between reap passes |
//! | `ORCHESTRA_REAPER_TTL_HOURS` | `8` | Instance lifetime |
//! | `ORCHESTRA_REAPER_SWEEP_ORPHANS` | `false` | Also remove unrecorded workloads |

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for lifecycle operations.
pub mod error;

/// Cluster resource name generation.
pub mod naming;

/// Control-plane facade (Kubernetes and in-memory).
pub mod gateway;

/// Catalog of workshop images.
pub mod catalog;

/// Instance lifecycle manager.
pub mod manager;

/// Background worker deleting expired instances.
pub mod reaper;

/// Embeddable runtime wiring everything together.
pub mod runtime;

pub use catalog::{Catalog, ImageCatalog, StaticCatalog};
pub use error::{Error, Result};
pub use gateway::{ClusterGateway, DeleteReport, GatewayError, KubeGateway, MockGateway};
pub use manager::{
    Deleted, InstanceState, LifecycleConfig, LifecycleManager, Provisioned, ReusePolicy,
};
pub use reaper::{ReapReport, Reaper, ReaperConfig};
pub use runtime::OrchestraRuntime;
