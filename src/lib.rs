//! Sitedown: export websites into a tree of Markdown documents
//!
//! This crate crawls a site politely (robots.txt, per-host limits, crawl delays),
//! isolates the main content of every page, converts it to Markdown with rewritten
//! links and local assets, and keeps an incremental manifest so re-runs only touch
//! what actually changed.

pub mod assets;
pub mod auth;
pub mod config;
pub mod convert;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sitedown operations
///
/// Per-URL problems never surface here; they are classified as a
/// [`state::FailureReason`] and recorded against the URL. This type covers
/// failures that abort a whole session.
#[derive(Debug, Error)]
pub enum SitedownError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Auth error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Manifest store error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output root {path} is not writable: {source}")]
    OutputRootUnwritable {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session error: {0}")]
    Session(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
///
/// Every variant is reported as `invalid_url`: the URL is dropped and never retried.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sitedown operations
pub type Result<T> = std::result::Result<T, SitedownError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{cancel, start_session, ProgressEvent, SessionHandle, SessionSummary};
pub use state::{FailureReason, PageStatus};
pub use url::{normalize, normalize_url, registrable_domain, NormalizedUrl};
