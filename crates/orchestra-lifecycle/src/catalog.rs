// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workshop catalog: resolves a catalog reference to what should run.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::error::{Error, Result};
use crate::gateway::WorkloadSpec;

/// Source of workload specs.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve `catalog_ref`.
    ///
    /// Returns [`Error::CatalogEntryNotFound`] if the reference is unknown.
    async fn lookup(&self, catalog_ref: &str) -> Result<WorkloadSpec>;
}

/// Fixed set of entries, usually loaded from a JSON file:
///
/// ```json
/// {
///   "python-101": { "image": "org/python-101:2024", "env": { "PASSWORD": "..." } },
///   "rust-intro": { "image": "org/rust-intro:latest", "port": 8080 }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<String, WorkloadSpec>,
}

impl StaticCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn with_entry(mut self, catalog_ref: impl Into<String>, spec: WorkloadSpec) -> Self {
        self.entries.insert(catalog_ref.into(), spec);
        self
    }

    /// Parse a JSON object of entries.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, WorkloadSpec> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    /// Load a JSON catalog file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json(&json)?;
        info!(path = %path.display(), entries = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn lookup(&self, catalog_ref: &str) -> Result<WorkloadSpec> {
        self.entries
            .get(catalog_ref)
            .cloned()
            .ok_or_else(|| Error::CatalogEntryNotFound(catalog_ref.to_string()))
    }
}

/// Treats the reference itself as an image (`org/repo:tag`) and runs it with
/// the default port and resource profile.
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    template: Option<WorkloadSpec>,
}

impl ImageCatalog {
    /// Catalog using the default profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog copying port, resources and env from `template`.
    pub fn with_template(template: WorkloadSpec) -> Self {
        Self {
            template: Some(template),
        }
    }
}

#[async_trait]
impl Catalog for ImageCatalog {
    async fn lookup(&self, catalog_ref: &str) -> Result<WorkloadSpec> {
        let image = catalog_ref.trim();
        if image.is_empty() {
            return Err(Error::CatalogEntryNotFound(catalog_ref.to_string()));
        }
        Ok(match &self.template {
            Some(template) => WorkloadSpec {
                image: image.to_string(),
                ..template.clone()
            },
            None => WorkloadSpec::for_image(image),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_static_lookup() {
        let catalog = StaticCatalog::new().with_entry("repo", WorkloadSpec::for_image("org/repo:1"));

        assert_eq!(catalog.lookup("repo").await.unwrap().image, "org/repo:1");
        assert!(matches!(
            catalog.lookup("other").await,
            Err(Error::CatalogEntryNotFound(r)) if r == "other"
        ));
    }

    #[tokio::test]
    async fn test_static_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"python-101": {{"image": "org/python:3", "port": 8080, "env": {{"PASSWORD": "pw"}}}}}}"#
        )
        .unwrap();

        let catalog = StaticCatalog::from_file(file.path()).await.unwrap();
        let spec = catalog.lookup("python-101").await.unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(spec.port, 8080);
        assert_eq!(spec.env.get("PASSWORD").map(String::as_str), Some("pw"));
    }

    #[test]
    fn test_static_invalid_json() {
        assert!(matches!(
            StaticCatalog::from_json("[1, 2]"),
            Err(Error::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_image_catalog_default_profile() {
        let spec = ImageCatalog::new().lookup("org/repo:tag").await.unwrap();

        assert_eq!(spec.image, "org/repo:tag");
        assert_eq!(spec.port, 8787);
        assert_eq!(spec.resources.cpu_limit.as_deref(), Some("1800m"));
    }

    #[tokio::test]
    async fn test_image_catalog_template_and_empty_ref() {
        let mut template = WorkloadSpec::for_image("unused");
        template.port = 3000;
        let catalog = ImageCatalog::with_template(template);

        let spec = catalog.lookup("org/repo").await.unwrap();
        assert_eq!(spec.image, "org/repo");
        assert_eq!(spec.port, 3000);

        assert!(catalog.lookup("  ").await.is_err());
    }
}
