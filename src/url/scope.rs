//! Crawl scope filter
//!
//! Decides whether a normalized URL belongs to the export: host or registrable
//! domain must match a seed, include/exclude patterns must agree, the resource
//! must be a page, and the locale policy must allow its locale prefix.

use crate::config::{CrawlerConfig, LocalePolicyKind, ScopeConfig};
use crate::url::domain::{extract_domain, registrable_domain};
use crate::url::matcher::is_non_page_resource;
use crate::ConfigError;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Why a URL fell outside the crawl scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRejection {
    /// Registrable domain differs from every seed
    ForeignDomain,
    /// Same registrable domain, but subdomains are not allowed
    ForeignHost,
    /// Matched an exclude pattern
    Excluded,
    /// Include patterns are set and none matched
    NotIncluded,
    /// Binary or static resource, not a page
    NotAPage,
    /// Locale prefix outside the allowed set
    Locale,
}

impl fmt::Display for ScopeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ForeignDomain => "foreign domain",
            Self::ForeignHost => "subdomain not allowed",
            Self::Excluded => "matches exclude pattern",
            Self::NotIncluded => "matches no include pattern",
            Self::NotAPage => "not a page",
            Self::Locale => "locale not selected",
        };
        f.write_str(text)
    }
}

/// Scope filter built once per session from the seeds and config
#[derive(Debug, Clone)]
pub struct Scope {
    primary_host: String,
    seed_hosts: HashSet<String>,
    seed_domains: HashSet<String>,
    allow_subdomains: bool,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    locales: Option<Vec<String>>,
}

impl Scope {
    /// Builds the scope filter
    ///
    /// # Arguments
    ///
    /// * `seeds` - Normalized seed URLs; the first one's host is the primary host
    /// * `scope` - Scope section of the config
    /// * `crawler` - Crawler section (locale policy)
    pub fn new(
        seeds: &[Url],
        scope: &ScopeConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self, ConfigError> {
        let seed_hosts: HashSet<String> = seeds.iter().filter_map(extract_domain).collect();
        let seed_domains: HashSet<String> = seeds.iter().filter_map(registrable_domain).collect();
        let primary_host = seeds
            .first()
            .and_then(extract_domain)
            .ok_or_else(|| ConfigError::Validation("at least one seed URL is required".into()))?;

        let locales = match crawler.locale_policy {
            LocalePolicyKind::Restrict => Some(
                crawler
                    .locales
                    .iter()
                    .map(|l| l.to_lowercase().replace('_', "-"))
                    .collect(),
            ),
            _ => None,
        };

        Ok(Self {
            primary_host,
            seed_hosts,
            seed_domains,
            allow_subdomains: scope.allow_subdomains,
            include: compile_patterns(&scope.include)?,
            exclude: compile_patterns(&scope.exclude)?,
            locales,
        })
    }

    /// Host of the first seed; its pages live at the root of the output tree
    pub fn primary_host(&self) -> &str {
        &self.primary_host
    }

    /// Registrable domains of the seeds
    pub fn seed_domains(&self) -> impl Iterator<Item = &str> {
        self.seed_domains.iter().map(String::as_str)
    }

    /// Checks a normalized URL against the scope
    pub fn check(&self, url: &Url) -> Result<(), ScopeRejection> {
        let host = extract_domain(url).ok_or(ScopeRejection::ForeignDomain)?;

        if !self.seed_hosts.contains(&host) {
            let domain = registrable_domain(url).ok_or(ScopeRejection::ForeignDomain)?;
            if !self.seed_domains.contains(&domain) {
                return Err(ScopeRejection::ForeignDomain);
            }
            if !self.allow_subdomains {
                return Err(ScopeRejection::ForeignHost);
            }
        }

        let text = url.as_str();
        if self.exclude.iter().any(|re| re.is_match(text)) {
            return Err(ScopeRejection::Excluded);
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(text)) {
            return Err(ScopeRejection::NotIncluded);
        }

        if is_non_page_resource(url) {
            return Err(ScopeRejection::NotAPage);
        }

        if let Some(allowed) = &self.locales {
            if let Some(prefix) = locale_prefix(url) {
                if !allowed.contains(&prefix) {
                    return Err(ScopeRejection::Locale);
                }
            }
        }

        Ok(())
    }

    /// Returns true if the URL is inside the crawl scope
    pub fn accepts(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }
}

/// Compiles case-insensitive scope patterns
fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
        })
        .collect()
}

/// Returns the locale prefix of a URL path (`/en/`, `/en-US/`, `/pt_BR/`), lowercased
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitedown::url::locale_prefix;
///
/// let url = Url::parse("https://example.com/en-US/guide").unwrap();
/// assert_eq!(locale_prefix(&url), Some("en-us".to_string()));
/// ```
pub fn locale_prefix(url: &Url) -> Option<String> {
    let first = url.path_segments()?.next()?;
    let (language, region) = match first.find(['-', '_']) {
        Some(idx) => (&first[..idx], Some(&first[idx + 1..])),
        None => (first, None),
    };

    let alpha = |s: &str| s.chars().all(|c| c.is_ascii_alphabetic());
    let language_ok = language.len() == 2 && alpha(language);
    let region_ok = region
        .map(|r| (2..=4).contains(&r.len()) && alpha(r))
        .unwrap_or(true);

    if language_ok && region_ok {
        Some(first.to_lowercase().replace('_', "-"))
    } else {
        None
    }
}
