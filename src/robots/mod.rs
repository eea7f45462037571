//! Robots.txt handling module
//!
//! The [`RobotsGate`] fetches robots.txt once per origin and keeps it for the
//! lifetime of the session. Workers racing for the same origin share one fetch.

mod parser;

pub use parser::ParsedRobots;

use crate::config::{Config, RobotsConfig};
use crate::crawler::HostLimiter;
use crate::url::registrable_domain;
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

type RobotsCell = Arc<OnceCell<Arc<ParsedRobots>>>;

/// Session-scoped robots.txt gate
pub struct RobotsGate {
    client: Client,
    agent: String,
    fail_closed: bool,
    ignore: bool,
    limiter: Option<Arc<HostLimiter>>,
    entries: Mutex<HashMap<String, RobotsCell>>,
}

impl RobotsGate {
    /// Creates a gate for the given configuration
    ///
    /// robots.txt requests follow a handful of redirects on their own; they do
    /// not go through the page fetcher's retry machinery.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.header_value())
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .connect_timeout(Duration::from_secs(config.fetch.connect_timeout_secs))
            .redirect(Policy::limited(5))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self::with_client(
            client,
            &config.user_agent.crawler_name,
            &config.robots,
        ))
    }

    /// Creates a gate around an existing client
    pub fn with_client(client: Client, agent: &str, config: &RobotsConfig) -> Self {
        if config.ignore_robots {
            tracing::warn!("robots.txt enforcement disabled by explicit override");
        }

        Self {
            client,
            agent: agent.to_string(),
            fail_closed: config.fail_closed,
            ignore: config.ignore_robots,
            limiter: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Sends robots.txt requests through the per-host limiter
    pub fn with_limiter(mut self, limiter: Arc<HostLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Returns the rules for the URL's origin, fetching them on first use
    pub async fn rules(&self, url: &Url) -> Arc<ParsedRobots> {
        let origin = url.origin().ascii_serialization();
        let cell = {
            let mut entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries.entry(origin.clone()).or_default().clone()
        };

        cell.get_or_init(|| async { Arc::new(self.fetch(&origin).await) })
            .await
            .clone()
    }

    /// Checks whether the URL may be fetched
    ///
    /// Always true when the ignore override is set.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        if self.ignore {
            return true;
        }
        self.rules(url).await.is_allowed(url.as_str(), &self.agent)
    }

    /// Crawl-delay announced for the URL's origin
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        if self.ignore {
            return None;
        }
        self.rules(url).await.crawl_delay(&self.agent)
    }

    /// Sitemap URLs announced by the URL's origin
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        self.rules(url).await.sitemaps().to_vec()
    }

    /// Fetches and parses robots.txt for an origin
    ///
    /// A 4xx means there is no robots.txt and everything is allowed. Server
    /// errors and network failures fall back to the configured policy.
    async fn fetch(&self, origin: &str) -> ParsedRobots {
        let robots_url = format!("{}/robots.txt", origin);
        let domain = Url::parse(origin).ok().and_then(|u| registrable_domain(&u));
        // Callers never hold a permit here, so waiting cannot deadlock
        let _permit = match (&self.limiter, domain) {
            (Some(limiter), Some(domain)) => limiter.acquire(&domain, None).await.ok(),
            _ => None,
        };
        tracing::debug!("Fetching {}", robots_url);

        let failure = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => return ParsedRobots::from_content(&body),
                Err(e) => e.to_string(),
            },
            Ok(response) if response.status().is_client_error() => {
                tracing::debug!(
                    "No robots.txt at {} (HTTP {}), allowing all",
                    origin,
                    response.status()
                );
                return ParsedRobots::allow_all();
            }
            Ok(response) => format!("HTTP {}", response.status()),
            Err(e) => e.to_string(),
        };

        if self.fail_closed {
            tracing::warn!(
                "robots.txt for {} unavailable ({}), denying all",
                origin,
                failure
            );
            ParsedRobots::deny_all()
        } else {
            tracing::warn!(
                "robots.txt for {} unavailable ({}), allowing all",
                origin,
                failure
            );
            ParsedRobots::allow_all()
        }
    }
}
