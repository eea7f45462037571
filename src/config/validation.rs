use crate::config::types::{
    AssetsConfig, AuthConfig, Config, CrawlerConfig, FetchConfig, LocalePolicyKind, OutputConfig,
    ScopeConfig, UserAgentConfig,
};
use crate::ConfigError;
use regex::RegexBuilder;
use std::path::PathBuf;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_scope_config(&config.scope)?;
    validate_fetch_config(&config.fetch)?;
    validate_auth_config(&config.auth)?;
    validate_assets_config(&config.assets)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in &config.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.per_host_concurrency < 1 || config.per_host_concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "per_host_concurrency must be between 1 and 32, got {}",
            config.per_host_concurrency
        )));
    }

    if config.locale_policy == LocalePolicyKind::Restrict && config.locales.is_empty() {
        return Err(ConfigError::Validation(
            "locale_policy 'restrict' needs at least one entry in locales".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    if let Some(email) = &config.contact_email {
        validate_email(email)?;
    }

    Ok(())
}

/// Validates scope patterns
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for pattern in config.include.iter().chain(config.exclude.iter()) {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                ConfigError::InvalidPattern(format!("Invalid scope pattern '{}': {}", pattern, e))
            })?;
    }
    Ok(())
}

/// Validates fetch limits
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_redirects < 1 || config.max_redirects > 50 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be between 1 and 50, got {}",
            config.max_redirects
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) cannot exceed backoff_max_ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    Ok(())
}

/// Validates credential sources
///
/// Each level (global and per host) resolves to exactly one credential kind,
/// so at most one source may be set per level.
fn validate_auth_config(config: &AuthConfig) -> Result<(), ConfigError> {
    validate_single_source(
        "auth",
        &[
            &config.cookies_file,
            &config.headers_file,
            &config.session_file,
        ],
    )?;

    for host in &config.hosts {
        validate_domain_pattern(&host.pattern)?;
        validate_single_source(
            &format!("auth.host '{}'", host.pattern),
            &[&host.cookies_file, &host.headers_file, &host.session_file],
        )?;
    }

    Ok(())
}

fn validate_single_source(label: &str, sources: &[&Option<PathBuf>]) -> Result<(), ConfigError> {
    let set = sources.iter().filter(|s| s.is_some()).count();
    if set > 1 {
        return Err(ConfigError::Validation(format!(
            "{} sets {} credential sources; use a session file to combine cookies and headers",
            label, set
        )));
    }
    Ok(())
}

/// Validates asset settings
fn validate_assets_config(config: &AssetsConfig) -> Result<(), ConfigError> {
    if config.folder.is_empty()
        || config.folder.contains("..")
        || config.folder.starts_with('/')
        || config.folder.contains('\\')
    {
        return Err(ConfigError::Validation(format!(
            "assets folder must be a relative directory name, got '{}'",
            config.folder
        )));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.index_file.is_empty()
        || config.index_file.contains('/')
        || config.index_file.contains('\\')
    {
        return Err(ConfigError::Validation(format!(
            "index_file must be a plain file name, got '{}'",
            config.index_file
        )));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
