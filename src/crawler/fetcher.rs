//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for page content, including:
//! - Building the HTTP client with the configured user agent
//! - Conditional requests from stored validators
//! - Manual redirect handling with loop and hop-limit detection
//! - Retry with exponential backoff, jitter and `Retry-After`
//! - Error classification into failure reasons

use crate::auth::AuthContext;
use crate::config::{Config, FetchConfig};
use crate::crawler::politeness::{jitter, HostLimiter};
use crate::robots::RobotsGate;
use crate::state::{FailureReason, Validators};
use crate::url::registrable_domain;
use chrono::{DateTime, Utc};
use reqwest::header::{
    HeaderMap, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION,
    RETRY_AFTER,
};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Terminal fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Redirect loop at {url} after {hops} hop(s)")]
    RedirectLoop { url: String, hops: u32, cycle: bool },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Redirect target {0} is disallowed by robots.txt")]
    RobotsDenied(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Failure reason recorded for the URL
    ///
    /// A revisited URL is a `redirect_loop`; a chain that merely ran past the
    /// hop limit is `too_many_redirects`.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Network { .. } | Self::Client(_) => FailureReason::Network,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::RedirectLoop { cycle: true, .. } => FailureReason::RedirectLoop,
            Self::RedirectLoop { cycle: false, .. } => FailureReason::TooManyRedirects,
            Self::Status { status, .. } => FailureReason::HttpStatus(*status),
            Self::RobotsDenied(_) => FailureReason::RobotsDenied,
        }
    }

    fn from_reqwest(url: &Url, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// A successful fetch (2xx or 304)
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL that was requested
    pub url: Url,
    /// URL the content was served from, after redirects
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    /// Empty for a 304
    pub body: Vec<u8>,
    /// Validators to store for the next run
    pub validators: Validators,
    /// True if the origin answered 304 to a conditional request
    pub not_modified: bool,
    pub content_type: Option<String>,
}

impl FetchResult {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true if the response looks like an HTML document
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            None => true,
        }
    }
}

/// Builds the HTTP client used for pages, sitemaps and assets
///
/// Redirects are not followed by the client; the fetcher walks them itself so
/// every hop goes through robots.txt and loop detection.
///
/// # Arguments
///
/// * `config` - The resolved configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(config.fetch.connect_timeout_secs))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// One attempt's response, read while the host permit was held
struct Attempt {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Page fetcher
///
/// Shared by all workers. Credentials, robots rules and per-host limits are
/// applied to every request, including each redirect hop.
pub struct Fetcher {
    client: Client,
    auth: Arc<AuthContext>,
    limiter: Arc<HostLimiter>,
    robots: Arc<RobotsGate>,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(
        client: Client,
        auth: Arc<AuthContext>,
        limiter: Arc<HostLimiter>,
        robots: Arc<RobotsGate>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            client,
            auth,
            limiter,
            robots,
            config: config.clone(),
        }
    }

    /// Credentials applied to requests
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Fetches a URL
    ///
    /// # Request Flow
    ///
    /// 1. Wait for a per-host slot (crawl-delay, minimum delay, jitter)
    /// 2. Send GET with credentials and, when given, conditional validators
    /// 3. Follow redirects manually, checking each target against robots.txt
    /// 4. Retry transient failures with backoff
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 304 | Success, `not_modified` set |
    /// | HTTP 429 / 5xx | Retry; `Retry-After` overrides the backoff |
    /// | Other 4xx | Immediate failure |
    /// | Timeout / connection error | Retry |
    /// | Revisited redirect target | Immediate `RedirectLoop` |
    /// | More than `max_redirects` hops | Immediate `RedirectLoop` |
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `validators` - Stored validators for a conditional request
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - 2xx or 304 response
    /// * `Err(FetchError)` - Terminal failure for this URL
    pub async fn fetch(
        &self,
        url: &Url,
        validators: Option<&Validators>,
    ) -> Result<FetchResult, FetchError> {
        let mut current = url.clone();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(current.as_str().to_string());
        let mut hops = 0u32;

        loop {
            let attempt = self.send_with_retry(&current, validators).await?;

            if attempt.status.is_redirection() && attempt.status != StatusCode::NOT_MODIFIED {
                let next = attempt
                    .headers
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or_else(|| FetchError::Status {
                        url: current.to_string(),
                        status: attempt.status.as_u16(),
                    })?;

                hops += 1;
                if !visited.insert(next.as_str().to_string()) {
                    return Err(FetchError::RedirectLoop {
                        url: next.to_string(),
                        hops,
                        cycle: true,
                    });
                }
                if hops > self.config.max_redirects {
                    return Err(FetchError::RedirectLoop {
                        url: next.to_string(),
                        hops,
                        cycle: false,
                    });
                }
                if !self.robots.is_allowed(&next).await {
                    return Err(FetchError::RobotsDenied(next.to_string()));
                }

                tracing::debug!("Redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            let not_modified = attempt.status == StatusCode::NOT_MODIFIED;
            let mut new_validators = validators_from(&attempt.headers);
            if not_modified {
                if let Some(old) = validators {
                    new_validators.etag = new_validators.etag.or_else(|| old.etag.clone());
                    new_validators.last_modified = new_validators
                        .last_modified
                        .or_else(|| old.last_modified.clone());
                }
            }

            let content_type = attempt
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            return Ok(FetchResult {
                url: url.clone(),
                final_url: current,
                status: attempt.status.as_u16(),
                headers: attempt.headers,
                body: attempt.body,
                validators: new_validators,
                not_modified,
                content_type,
            });
        }
    }

    /// Fetches raw bytes without conditional validators (sitemaps, assets)
    pub async fn fetch_bytes(&self, url: &Url) -> Result<FetchResult, FetchError> {
        self.fetch(url, None).await
    }

    async fn send_with_retry(
        &self,
        url: &Url,
        validators: Option<&Validators>,
    ) -> Result<Attempt, FetchError> {
        let domain = registrable_domain(url)
            .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string());
        let crawl_delay = self.robots.crawl_delay(url).await;
        let mut attempt = 0u32;

        loop {
            let result = {
                let _permit = self
                    .limiter
                    .acquire(&domain, crawl_delay)
                    .await
                    .map_err(|e| FetchError::Client(e.to_string()))?;
                tracing::debug!("GET {} (attempt {})", url, attempt + 1);
                self.send_once(url, validators).await
            };

            let retry_in = match result {
                Ok(response) => {
                    let status = response.status;
                    if status.is_success() || status.is_redirection() {
                        return Ok(response);
                    }
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if !retryable || attempt >= self.config.max_retries {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    match self.retry_after(&response.headers) {
                        Some(delay) => {
                            tracing::info!(
                                "{} answered {}, honoring Retry-After of {:?}",
                                url,
                                status,
                                delay
                            );
                            self.limiter.defer(&domain, Instant::now() + delay);
                            delay
                        }
                        None => self.backoff(attempt),
                    }
                }
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    self.backoff(attempt)
                }
            };

            attempt += 1;
            tracing::warn!(
                "Retrying {} in {:?} (attempt {}/{})",
                url,
                retry_in,
                attempt + 1,
                self.config.max_retries + 1
            );
            tokio::time::sleep(retry_in).await;
        }
    }

    async fn send_once(
        &self,
        url: &Url,
        validators: Option<&Validators>,
    ) -> Result<Attempt, FetchError> {
        let mut request = self.auth.apply(self.client.get(url.clone()), url);
        if let Some(validators) = validators {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = if status.is_success() {
            response
                .bytes()
                .await
                .map_err(|e| FetchError::from_reqwest(url, e))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(Attempt {
            status,
            headers,
            body,
        })
    }

    /// Exponential backoff with jitter, capped
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(base.min(self.config.backoff_max_ms)) + jitter(self.config.jitter_ms)
    }

    /// Delay requested by a `Retry-After` header, capped
    fn retry_after(&self, headers: &HeaderMap) -> Option<Duration> {
        let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
        let delay = parse_retry_after(value, Utc::now())?;
        Some(delay.min(Duration::from_secs(self.config.retry_after_cap_secs)))
    }
}

/// Parses a `Retry-After` value: delta seconds or an HTTP date
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn validators_from(headers: &HeaderMap) -> Validators {
    let get = |name: reqwest::header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    Validators {
        etag: get(ETAG),
        last_modified: get(LAST_MODIFIED),
    }
}
