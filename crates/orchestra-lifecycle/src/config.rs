// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for orchestra-lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::KubeGatewayConfig;
use crate::manager::{LifecycleConfig, ReusePolicy};
use crate::reaper::ReaperConfig;

/// Orchestra configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Event store URL (`postgres://...` or `sqlite:...`)
    pub database_url: String,
    /// Base domain; instances are served at `{name}.{domain}`
    pub domain: String,
    /// Namespace instance objects are created in
    pub namespace: String,
    /// Label marking managed objects, as `(key, value)`
    pub instance_label: (String, String),
    /// Ingress class for routes (unset: cluster default)
    pub ingress_class: Option<String>,
    /// Upper bound for a single control-plane call
    pub request_timeout: Duration,
    /// JSON catalog file (unset: catalog references are image references)
    pub catalog_path: Option<PathBuf>,
    /// Default reuse policy for `create`
    pub reuse_policy: ReusePolicy,
    /// Reaper worker settings
    pub reaper: ReaperConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("ORCHESTRA_DATABASE_URL")
            .or_else(|| var("DATABASE_URL"))
            .ok_or(ConfigError::MissingEnvVar(
                "ORCHESTRA_DATABASE_URL or DATABASE_URL",
            ))?;

        let domain = var("ORCHESTRA_DOMAIN")
            .filter(|d| !d.is_empty())
            .ok_or(ConfigError::MissingEnvVar("ORCHESTRA_DOMAIN"))?;

        let namespace = var("ORCHESTRA_NAMESPACE").unwrap_or_else(|| "default".to_string());

        let instance_label = parse_label(
            &var("ORCHESTRA_INSTANCE_LABEL").unwrap_or_else(|| "org=workshop".to_string()),
        )?;

        let ingress_class = var("ORCHESTRA_INGRESS_CLASS").filter(|c| !c.is_empty());

        let timeout_secs = match var("ORCHESTRA_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    var: "ORCHESTRA_REQUEST_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => 30,
        };

        let catalog_path = var("ORCHESTRA_CATALOG_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let reuse_policy = if var("ORCHESTRA_REUSE_EXISTING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
        {
            ReusePolicy::ReuseExisting
        } else {
            ReusePolicy::AlwaysCreate
        };

        Ok(Self {
            database_url,
            domain,
            namespace,
            instance_label,
            ingress_class,
            request_timeout: Duration::from_secs(timeout_secs),
            catalog_path,
            reuse_policy,
            reaper: ReaperConfig::from_vars(&var),
        })
    }

    /// Settings for the Kubernetes gateway.
    pub fn gateway_config(&self) -> KubeGatewayConfig {
        KubeGatewayConfig {
            namespace: self.namespace.clone(),
            label_key: self.instance_label.0.clone(),
            label_value: self.instance_label.1.clone(),
            ingress_class: self.ingress_class.clone(),
            request_timeout: self.request_timeout,
        }
    }

    /// Settings for the lifecycle manager.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            domain: self.domain.clone(),
            reuse_policy: self.reuse_policy,
        }
    }
}

/// Parse `key=value`.
fn parse_label(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::InvalidLabel(raw.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// A variable has a value that cannot be used.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
    /// The instance label is not of the form `key=value`.
    #[error("Invalid instance label '{0}', expected key=value")]
    InvalidLabel(String),
}
