//! Crawler module for the export pipeline
//!
//! This module contains the crawling side of an export session, including:
//! - HTTP fetching with retries, manual redirects and conditional requests
//! - Per-host concurrency limits and crawl delays
//! - The frontier with dedup, depth and page budgets
//! - Sitemap discovery and link extraction
//! - Optional script rendering
//! - Session coordination and progress events

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod politeness;
mod render;
mod session;
mod sitemap;

pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, parse_retry_after, FetchError, FetchResult, Fetcher};
pub use frontier::{EnqueueOutcome, Frontier, SharedFrontier};
pub use parser::{discover_links, resolve_link, DiscoveredLinks};
pub use politeness::{jitter, HostLimiter, HostPermit};
pub use render::{
    create_renderer, needs_rendering, render_with_permit, visible_text_len, RenderError,
    RenderedDocument, Renderer, WaitPolicy,
};
#[cfg(feature = "render")]
pub use render::ChromeRenderer;
pub use session::{
    cancel, cancellation, start_session, CancellationSignal, Canceller, CounterSnapshot, Outcome,
    Phase, ProgressEvent, SessionCounters, SessionHandle, TerminationReason,
};
pub use sitemap::{discover_sitemaps, parse_lastmod, parse_sitemap, SitemapDocument, SitemapUrl};

pub use crate::output::SessionSummary;
