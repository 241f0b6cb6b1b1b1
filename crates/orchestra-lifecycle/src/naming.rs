// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster resource name generation.
//!
//! Names are `{slug}-{suffix}` where the slug is derived from the catalog
//! entry and the suffix is 8 random lowercase letters. No uniqueness check
//! is made here; a collision shows up as a creation failure.
//!
//! Dots and a leading digit survive sanitizing. Kubernetes accepts such
//! names for deployments but not for services (DNS-1035 labels), so an
//! entry like `org/bioc3.12` fails at service creation and leaves its
//! workload behind for `delete` or the orphan sweep. Catalog entries that
//! need a different slug should be renamed in the catalog.

use rand::Rng;

/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 8;

/// Kubernetes object names used for services must fit a DNS label.
pub const MAX_NAME_LEN: usize = 63;

const FALLBACK_SLUG: &str = "instance";

/// Generate a resource name for an instance of `catalog_slug`.
pub fn generate_name(catalog_slug: &str) -> String {
    format!("{}-{}", sanitize_slug(catalog_slug), random_suffix())
}

/// Replace every run of characters outside `[A-Za-z0-9.-]` with a single `-`.
///
/// The result is lowercased, stripped of leading/trailing `-` and `.`, and
/// truncated so that a suffixed name stays within [`MAX_NAME_LEN`].
pub fn sanitize_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut in_run = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            slug.push(c.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            slug.push('-');
            in_run = true;
        }
    }

    let max_slug = MAX_NAME_LEN - SUFFIX_LEN - 1;
    let trimmed = slug.trim_matches(|c| c == '-' || c == '.');
    let truncated = if trimmed.len() > max_slug {
        trimmed[..max_slug].trim_end_matches(|c| c == '-' || c == '.')
    } else {
        trimmed
    };

    if truncated.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        truncated.to_string()
    }
}

/// The repository part of an image reference: `org/repo:tag` → `repo`.
pub fn slug_for_image(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_segment = without_digest
        .rsplit('/')
        .next()
        .unwrap_or(without_digest);
    last_segment.split(':').next().unwrap_or(last_segment)
}

/// Random lowercase ASCII suffix of [`SUFFIX_LEN`] characters.
pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_generated_suffix(name: &str, slug: &str) -> bool {
        let Some(suffix) = name.strip_prefix(&format!("{}-", slug)) else {
            return false;
        };
        suffix.len() == SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_lowercase())
    }

    #[test]
    fn test_generate_name_shape() {
        let name = generate_name("repo");
        assert!(has_generated_suffix(&name, "repo"), "got {}", name);
    }

    #[test]
    fn test_generated_names_differ() {
        let a = generate_name("repo");
        let b = generate_name("repo");
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_replaces_runs() {
        assert_eq!(sanitize_slug("my_repo"), "my-repo");
        assert_eq!(sanitize_slug("a b__c"), "a-b-c");
        assert_eq!(sanitize_slug("v1.2-rc"), "v1.2-rc");
    }

    #[test]
    fn test_sanitize_lowercases_and_trims() {
        assert_eq!(sanitize_slug("PublicDataResources"), "publicdataresources");
        assert_eq!(sanitize_slug("__repo__"), "repo");
        assert_eq!(sanitize_slug(".hidden."), "hidden");
    }

    #[test]
    fn test_sanitize_keeps_leading_digit_and_dots() {
        assert_eq!(sanitize_slug("1000genomes"), "1000genomes");
        assert_eq!(sanitize_slug("bioc3.12"), "bioc3.12");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_slug(""), "instance");
        assert_eq!(sanitize_slug("@@@"), "instance");
    }

    #[test]
    fn test_name_fits_dns_label() {
        let long = "x".repeat(200);
        let name = generate_name(&long);
        assert_eq!(name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_slug_for_image() {
        assert_eq!(slug_for_image("org/repo:tag"), "repo");
        assert_eq!(slug_for_image("org/repo"), "repo");
        assert_eq!(slug_for_image("repo"), "repo");
        assert_eq!(slug_for_image("registry.local:5000/org/repo:1.0"), "repo");
        assert_eq!(slug_for_image("org/repo@sha256:abcdef"), "repo");
    }
}
