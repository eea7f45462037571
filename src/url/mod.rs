//! URL handling module for Sitedown
//!
//! This module provides URL normalization (crawl identity), registrable-domain
//! extraction, wildcard matching for per-host settings, resource-type checks,
//! and the crawl scope filter.

mod domain;
mod matcher;
mod normalize;
mod scope;

pub use domain::{extract_domain, registrable_domain, registrable_domain_of_host};
pub use matcher::{is_document, is_non_page_resource, matches_wildcard, path_extension};
pub use normalize::{normalize, normalize_url, NormalizeOptions, NormalizedUrl, QueryPolicy};
pub use scope::{locale_prefix, Scope, ScopeRejection};

use url::Url;

/// A URL as tracked by the frontier
///
/// `raw` is the string as discovered; `url` carries both the canonical identity
/// and the fetch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub raw: String,
    pub url: NormalizedUrl,
    pub domain: String,
    pub depth: u32,
}

impl UrlRecord {
    /// Normalizes `raw` and builds a record at the given depth
    ///
    /// # Arguments
    ///
    /// * `raw` - Discovered URL string, absolute or relative
    /// * `base` - Base for relative references
    /// * `depth` - Link distance from a seed
    /// * `options` - Normalization options
    pub fn new(
        raw: &str,
        base: Option<&Url>,
        depth: u32,
        options: &NormalizeOptions,
    ) -> crate::UrlResult<Self> {
        let url = normalize(raw, base, options)?;
        let domain = registrable_domain(&url.canonical).ok_or(crate::UrlError::MissingDomain)?;
        Ok(Self {
            raw: raw.to_string(),
            url,
            domain,
            depth,
        })
    }

    /// Canonical identity string
    pub fn key(&self) -> &str {
        self.url.key()
    }
}
