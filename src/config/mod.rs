//! Configuration module for Sitedown
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sitedown::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitedown.toml")).unwrap();
//! println!("Exporting {} seed(s)", config.crawler.seeds.len());
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    AssetsConfig, AuthConfig, Config, CrawlerConfig, ExtractConfig, FetchConfig, HostAuthConfig,
    IncrementalConfig, LocalePolicyKind, MarkdownConfig, OutputConfig, RenderConfig,
    RobotsConfig, ScopeConfig, UserAgentConfig, DEFAULT_QUERY_DENY,
};

pub use parser::{
    compute_config_hash, config_snapshot, load_config, load_config_with_hash, parse_config,
};
pub use validation::validate;
