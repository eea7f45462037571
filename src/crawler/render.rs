//! Script-executing renderer
//!
//! Pages whose static HTML carries almost no text but plenty of script are
//! rendered in a headless browser. The renderer is an optional collaborator:
//! any failure falls back to the static fetch.

use crate::auth::AuthContext;
use crate::config::RenderConfig;
use crate::crawler::politeness::HostLimiter;
use crate::state::FailureReason;
use crate::url::registrable_domain;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering {0} timed out")]
    Timeout(String),

    #[error("Rendering failed: {0}")]
    Failure(String),

    #[error("No renderer available: {0}")]
    Unavailable(String),
}

impl RenderError {
    /// Failure reason recorded if the static result is unusable too
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Timeout(_) => FailureReason::RenderTimeout,
            Self::Failure(_) | Self::Unavailable(_) => FailureReason::RenderFailure,
        }
    }
}

/// When a render counts as settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Done as soon as this selector matches
    pub selector: Option<String>,
    /// Done once the DOM stays unchanged for this long
    pub network_idle: Duration,
    /// Upper bound for the whole render
    pub timeout: Duration,
}

impl From<&RenderConfig> for WaitPolicy {
    fn from(config: &RenderConfig) -> Self {
        Self {
            selector: config.wait_selector.clone(),
            network_idle: Duration::from_millis(config.network_idle_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// A document after script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// URL the browser ended up on
    pub url: Url,
    pub html: String,
}

/// Renders a URL with script execution
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Loads `url` with the session's credentials and returns the settled DOM
    async fn render(
        &self,
        url: &Url,
        auth: &AuthContext,
        wait: &WaitPolicy,
    ) -> Result<RenderedDocument, RenderError>;
}

/// Renders a URL while holding a request slot for its domain
///
/// A browser load is another request burst against the host, so it counts
/// against the per-host limit and waits out the crawl delay like a fetch.
///
/// # Arguments
///
/// * `renderer` - The renderer to use
/// * `limiter` - Per-host limiter shared with the fetcher
/// * `crawl_delay` - Crawl-delay announced by robots.txt for the URL
/// * `url` - Page to render
/// * `auth` - Session credentials
/// * `wait` - When the render counts as settled
pub async fn render_with_permit(
    renderer: &dyn Renderer,
    limiter: &HostLimiter,
    crawl_delay: Option<Duration>,
    url: &Url,
    auth: &AuthContext,
    wait: &WaitPolicy,
) -> Result<RenderedDocument, RenderError> {
    let domain = registrable_domain(url)
        .ok_or_else(|| RenderError::Failure(format!("{} has no host", url)))?;
    let _permit = limiter
        .acquire(&domain, crawl_delay)
        .await
        .map_err(|e| RenderError::Failure(e.to_string()))?;
    renderer.render(url, auth, wait).await
}

/// Element ids and attributes that mark a client-side application shell
const APP_SHELL_MARKERS: &[&str] = &[
    "#root",
    "#app",
    "#__next",
    "#__nuxt",
    "[ng-app]",
    "[data-reactroot]",
    "[data-server-rendered]",
];

/// Decides whether static HTML needs script execution
///
/// True when the visible body text is shorter than `min_static_text` and the
/// document carries scripts or an application shell.
pub fn needs_rendering(html: &str, min_static_text: usize) -> bool {
    let document = Html::parse_document(html);
    if visible_text_len(&document) >= min_static_text {
        return false;
    }

    let has_scripts = Selector::parse("script")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false);
    let has_shell = APP_SHELL_MARKERS.iter().any(|marker| {
        Selector::parse(marker)
            .map(|s| document.select(&s).next().is_some())
            .unwrap_or(false)
    });

    has_scripts || has_shell
}

/// Characters of visible body text, ignoring scripts and styles
pub fn visible_text_len(document: &Html) -> usize {
    let Ok(body) = Selector::parse("body") else {
        return 0;
    };
    let Some(body) = document.select(&body).next() else {
        return 0;
    };

    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value().as_element().map_or(false, |e| {
                    matches!(e.name(), "script" | "style" | "noscript" | "template")
                })
            });
            (!hidden).then(|| text.split_whitespace().map(str::len).sum::<usize>())
        })
        .sum()
}

/// Creates the renderer for a session, if rendering is enabled and available
pub fn create_renderer(config: &RenderConfig) -> Option<Box<dyn Renderer>> {
    if !config.enabled {
        return None;
    }

    #[cfg(feature = "render")]
    {
        Some(Box::new(chrome::ChromeRenderer::new()))
    }

    #[cfg(not(feature = "render"))]
    {
        tracing::warn!(
            "Rendering is enabled but sitedown was built without the `render` feature; using static HTML"
        );
        None
    }
}

#[cfg(feature = "render")]
pub use chrome::ChromeRenderer;

#[cfg(feature = "render")]
mod chrome {
    use super::{RenderError, RenderedDocument, Renderer, WaitPolicy};
    use crate::auth::AuthContext;
    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::{
        CookieParam, Headers, SetExtraHttpHeadersParams,
    };
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::OnceCell;
    use url::Url;

    /// Headless Chrome, launched on first use and shared by all workers
    pub struct ChromeRenderer {
        browser: OnceCell<Browser>,
    }

    impl ChromeRenderer {
        pub fn new() -> Self {
            Self {
                browser: OnceCell::new(),
            }
        }

        async fn browser(&self) -> Result<&Browser, RenderError> {
            self.browser
                .get_or_try_init(|| async {
                    let config = BrowserConfig::builder()
                        .no_sandbox()
                        .arg("--disable-gpu")
                        .build()
                        .map_err(RenderError::Unavailable)?;
                    let (browser, mut handler) = Browser::launch(config)
                        .await
                        .map_err(|e| RenderError::Unavailable(e.to_string()))?;
                    tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if event.is_err() {
                                break;
                            }
                        }
                    });
                    tracing::info!("Launched headless browser");
                    Ok(browser)
                })
                .await
        }

        async fn load(
            page: &Page,
            url: &Url,
            auth: &AuthContext,
            wait: &WaitPolicy,
        ) -> Result<String, RenderError> {
            let failure = |e: chromiumoxide::error::CdpError| RenderError::Failure(e.to_string());

            let headers: HashMap<String, String> = auth
                .headers_for(url)
                .into_iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("cookie"))
                .collect();
            if !headers.is_empty() {
                let value = serde_json::to_value(headers)
                    .map_err(|e| RenderError::Failure(e.to_string()))?;
                page.execute(SetExtraHttpHeadersParams::new(Headers::new(value)))
                    .await
                    .map_err(failure)?;
            }

            for cookie in auth.cookies_for(url) {
                let param = CookieParam::builder()
                    .name(cookie.name.clone())
                    .value(cookie.value.clone())
                    .domain(cookie.domain.clone())
                    .path(cookie.path.clone())
                    .url(url.as_str())
                    .build()
                    .map_err(RenderError::Failure)?;
                page.set_cookie(param).await.map_err(failure)?;
            }

            page.goto(url.as_str()).await.map_err(failure)?;
            page.wait_for_navigation().await.map_err(failure)?;

            let idle = wait_for_idle(page, wait.network_idle);
            match &wait.selector {
                Some(selector) => {
                    tokio::select! {
                        result = wait_for_selector(page, selector) => result?,
                        result = idle => result?,
                    }
                }
                None => idle.await?,
            }

            page.content().await.map_err(failure)
        }
    }

    impl Default for ChromeRenderer {
        fn default() -> Self {
            Self::new()
        }
    }

    async fn wait_for_selector(page: &Page, selector: &str) -> Result<(), RenderError> {
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Waits until the serialized DOM stops changing for `quiet`
    async fn wait_for_idle(page: &Page, quiet: Duration) -> Result<(), RenderError> {
        let mut last = page
            .content()
            .await
            .map_err(|e| RenderError::Failure(e.to_string()))?;
        loop {
            tokio::time::sleep(quiet).await;
            let current = page
                .content()
                .await
                .map_err(|e| RenderError::Failure(e.to_string()))?;
            if current == last {
                return Ok(());
            }
            last = current;
        }
    }

    #[async_trait]
    impl Renderer for ChromeRenderer {
        async fn render(
            &self,
            url: &Url,
            auth: &AuthContext,
            wait: &WaitPolicy,
        ) -> Result<RenderedDocument, RenderError> {
            let browser = self.browser().await?;
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::Failure(e.to_string()))?;

            let outcome = tokio::time::timeout(wait.timeout, Self::load(&page, url, auth, wait)).await;
            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());
            if let Err(e) = page.close().await {
                tracing::debug!("Failed to close render tab for {}: {}", url, e);
            }

            match outcome {
                Ok(Ok(html)) => Ok(RenderedDocument {
                    url: final_url,
                    html,
                }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(RenderError::Timeout(url.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_static_article_not_rendered() {
        let text = "Plenty of server-rendered text. ".repeat(20);
        let html = format!(
            "<html><body><article><p>{}</p></article><script src=\"/app.js\"></script></body></html>",
            text
        );
        assert!(!needs_rendering(&html, 200));
    }

    #[test]
    fn test_app_shell_rendered() {
        let html = r#"<html><body><div id="root"></div><script src="/bundle.js"></script></body></html>"#;
        assert!(needs_rendering(html, 200));
    }

    #[test]
    fn test_short_page_without_scripts_not_rendered() {
        let html = "<html><body><p>Short but complete.</p></body></html>";
        assert!(!needs_rendering(html, 200));
    }

    #[test]
    fn test_script_text_not_counted() {
        let html = format!(
            "<html><body><script>{}</script><style>{}</style><p>hi</p></body></html>",
            "var x = 1;".repeat(100),
            "p { color: red }".repeat(100)
        );
        let document = Html::parse_document(&html);
        assert_eq!(visible_text_len(&document), 2);
    }

    #[test]
    fn test_wait_policy_from_config() {
        let config = RenderConfig {
            wait_selector: Some("main".to_string()),
            network_idle_ms: 300,
            timeout_ms: 5000,
            ..Default::default()
        };
        let wait = WaitPolicy::from(&config);
        assert_eq!(wait.selector.as_deref(), Some("main"));
        assert_eq!(wait.network_idle, Duration::from_millis(300));
        assert_eq!(wait.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_disabled_config_has_no_renderer() {
        assert!(create_renderer(&RenderConfig::default()).is_none());
    }

    #[test]
    fn test_error_reasons() {
        assert_eq!(
            RenderError::Timeout("u".into()).reason(),
            FailureReason::RenderTimeout
        );
        assert_eq!(
            RenderError::Failure("boom".into()).reason(),
            FailureReason::RenderFailure
        );
    }

    /// Renderer double that counts calls and returns canned HTML
    struct FixedRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for FixedRenderer {
        async fn render(
            &self,
            url: &Url,
            _auth: &AuthContext,
            _wait: &WaitPolicy,
        ) -> Result<RenderedDocument, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RenderedDocument {
                url: url.clone(),
                html: "<html><body><main>rendered</main></body></html>".to_string(),
            })
        }
    }

    /// Renderer double that records how many renders overlap
    struct SlowRenderer {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for SlowRenderer {
        async fn render(
            &self,
            url: &Url,
            _auth: &AuthContext,
            _wait: &WaitPolicy,
        ) -> Result<RenderedDocument, RenderError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(RenderedDocument {
                url: url.clone(),
                html: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_renders_respect_host_limit() {
        let renderer = SlowRenderer {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let limiter = HostLimiter::new(1, Duration::ZERO, 0);
        let auth = AuthContext::none();
        let wait = WaitPolicy::from(&RenderConfig::default());
        let a = Url::parse("https://docs.example.com/a").unwrap();
        let b = Url::parse("https://docs.example.com/b").unwrap();
        let c = Url::parse("https://www.example.com/c").unwrap();

        let (ra, rb, rc) = tokio::join!(
            render_with_permit(&renderer, &limiter, None, &a, &auth, &wait),
            render_with_permit(&renderer, &limiter, None, &b, &auth, &wait),
            render_with_permit(&renderer, &limiter, None, &c, &auth, &wait),
        );
        assert!(ra.is_ok() && rb.is_ok() && rc.is_ok());
        assert_eq!(renderer.peak.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.peak_in_flight("example.com"), 1);
    }

    #[tokio::test]
    async fn test_renderer_trait_object() {
        let renderer: Box<dyn Renderer> = Box::new(FixedRenderer {
            calls: AtomicUsize::new(0),
        });
        let url = Url::parse("https://example.com/app").unwrap();
        let wait = WaitPolicy::from(&RenderConfig::default());
        let doc = renderer.render(&url, &AuthContext::none(), &wait).await.unwrap();
        assert!(doc.html.contains("rendered"));
    }
}
