//! Crawl frontier
//!
//! This module handles:
//! - Session-wide deduplication by canonical URL
//! - Depth and page budgets
//! - Two lanes: sitemap entries (freshest first) ahead of link-discovered URLs
//!   (breadth-first, ranked by path within a level)
//! - A synchronized wrapper that workers drain concurrently

use crate::crawler::session::CancellationSignal;
use crate::url::UrlRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Mutex;
use tokio::sync::Notify;
use url::Url;

/// Path fragments of documentation-like sections
const DOC_TERMS: &[&str] = &["doc", "guide", "help", "tutorial", "getting-started"];

/// Path fragments of archives that matter least for a documentation export
const ARCHIVE_TERMS: &[&str] = &["blog", "news", "press"];

/// Fetch priority of a page from its URL; lower is fetched sooner
///
/// The site root comes first, then documentation-like sections, API
/// references, ordinary pages, and blog or news archives last. Each path
/// level and a query string push a URL back a little.
pub fn path_priority(url: &Url) -> u32 {
    let path = url.path().to_lowercase();
    let mut priority = if path.is_empty() || path == "/" {
        10
    } else if DOC_TERMS.iter().any(|term| path.contains(term)) {
        20
    } else if path.contains("api") {
        30
    } else if ARCHIVE_TERMS.iter().any(|term| path.contains(term)) {
        80
    } else {
        100
    };

    let levels = path.matches('/').count() as u32;
    priority += (levels * 5).min(50);
    if url.query().is_some() {
        priority += 10;
    }
    priority
}

/// What happened to a URL offered to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted and waiting to be fetched
    Queued,
    /// Already seen in this session
    Duplicate,
    /// Deeper than the configured maximum
    TooDeep,
    /// The page budget is used up
    BudgetExhausted,
}

/// A sitemap-sourced URL with its freshness
#[derive(Debug, Clone)]
struct SitemapEntry {
    record: UrlRecord,
    lastmod: Option<DateTime<Utc>>,
    seq: u64,
}

// Newer lastmod first; entries without one come last, in insertion order
impl Ord for SitemapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lastmod
            .cmp(&other.lastmod)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SitemapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SitemapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for SitemapEntry {}

/// A link-discovered URL
#[derive(Debug, Clone)]
struct DiscoveredEntry {
    record: UrlRecord,
    priority: u32,
    seq: u64,
}

impl DiscoveredEntry {
    // Max-heap key: shallower link depth, then lower path priority, then arrival
    fn rank(&self) -> Reverse<(u32, u32, u64)> {
        Reverse((self.record.depth, self.priority, self.seq))
    }
}

impl Ord for DiscoveredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for DiscoveredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DiscoveredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for DiscoveredEntry {}

/// Ordered set of pending URLs
///
/// A canonical URL enters at most once per session; `seen` is never pruned.
#[derive(Debug)]
pub struct Frontier {
    seen: HashSet<String>,
    sitemap: BinaryHeap<SitemapEntry>,
    discovered: BinaryHeap<DiscoveredEntry>,
    max_depth: u32,
    max_pages: usize,
    accepted: usize,
    budget_exhausted: bool,
    seq: u64,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Deepest link distance from a seed that is accepted
    /// * `max_pages` - Maximum number of distinct URLs accepted
    pub fn new(max_depth: u32, max_pages: usize) -> Self {
        Self {
            seen: HashSet::new(),
            sitemap: BinaryHeap::new(),
            discovered: BinaryHeap::new(),
            max_depth,
            max_pages,
            accepted: 0,
            budget_exhausted: false,
            seq: 0,
        }
    }

    /// Offers a link-discovered URL
    pub fn enqueue(&mut self, record: UrlRecord) -> EnqueueOutcome {
        let outcome = self.admit(&record);
        if outcome == EnqueueOutcome::Queued {
            self.seq += 1;
            self.discovered.push(DiscoveredEntry {
                priority: path_priority(&record.url.canonical),
                record,
                seq: self.seq,
            });
        }
        outcome
    }

    /// Offers a sitemap URL; these are dequeued before any discovered URL
    pub fn enqueue_sitemap(
        &mut self,
        record: UrlRecord,
        lastmod: Option<DateTime<Utc>>,
    ) -> EnqueueOutcome {
        let outcome = self.admit(&record);
        if outcome == EnqueueOutcome::Queued {
            self.seq += 1;
            self.sitemap.push(SitemapEntry {
                record,
                lastmod,
                seq: self.seq,
            });
        }
        outcome
    }

    /// Removes the next URL to fetch
    pub fn dequeue(&mut self) -> Option<UrlRecord> {
        self.sitemap
            .pop()
            .map(|entry| entry.record)
            .or_else(|| self.discovered.pop().map(|entry| entry.record))
    }

    /// Marks a canonical URL as seen without queueing it
    ///
    /// Used for redirect targets. Returns false if it was already seen.
    pub fn mark_seen(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }

    /// Returns true if the canonical URL was seen this session
    #[cfg(test)]
    pub fn is_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Number of pending URLs
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sitemap.len() + self.discovered.len()
    }

    /// Returns true if nothing is pending
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once a URL was refused because of the page budget
    pub fn budget_exhausted(&self) -> bool {
        self.budget_exhausted
    }

    fn admit(&mut self, record: &UrlRecord) -> EnqueueOutcome {
        if self.seen.contains(record.key()) {
            return EnqueueOutcome::Duplicate;
        }
        // Not marked seen: a shorter path to the same URL may still arrive
        if record.depth > self.max_depth {
            return EnqueueOutcome::TooDeep;
        }
        if self.accepted >= self.max_pages {
            self.budget_exhausted = true;
            return EnqueueOutcome::BudgetExhausted;
        }
        self.seen.insert(record.key().to_string());
        self.accepted += 1;
        EnqueueOutcome::Queued
    }
}

#[derive(Debug)]
struct SharedState {
    frontier: Frontier,
    in_flight: usize,
}

/// Frontier shared by the worker pool
///
/// Every check-and-update runs under one lock. A worker that finds the queue
/// empty waits while other workers are still processing, since they may
/// discover more links; when nothing is queued or in flight the crawl is over.
#[derive(Debug)]
pub struct SharedFrontier {
    state: Mutex<SharedState>,
    notify: Notify,
}

impl SharedFrontier {
    pub fn new(frontier: Frontier) -> Self {
        Self {
            state: Mutex::new(SharedState {
                frontier,
                in_flight: 0,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Offers a link-discovered URL
    pub fn push(&self, record: UrlRecord) -> EnqueueOutcome {
        let outcome = self.lock().frontier.enqueue(record);
        if outcome == EnqueueOutcome::Queued {
            self.notify.notify_waiters();
        }
        outcome
    }

    /// Offers a sitemap URL
    pub fn push_sitemap(
        &self,
        record: UrlRecord,
        lastmod: Option<DateTime<Utc>>,
    ) -> EnqueueOutcome {
        let outcome = self.lock().frontier.enqueue_sitemap(record, lastmod);
        if outcome == EnqueueOutcome::Queued {
            self.notify.notify_waiters();
        }
        outcome
    }

    /// Marks a canonical URL as seen; false if it already was
    pub fn mark_seen(&self, key: &str) -> bool {
        self.lock().frontier.mark_seen(key)
    }

    /// Returns true once the page budget refused a URL
    pub fn budget_exhausted(&self) -> bool {
        self.lock().frontier.budget_exhausted()
    }

    /// Number of pending URLs
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.lock().frontier.len()
    }

    /// Waits for the next URL
    ///
    /// # Returns
    ///
    /// * `Some(UrlRecord)` - A URL to process; call [`SharedFrontier::complete`] afterwards
    /// * `None` - The crawl is exhausted or the session was cancelled
    pub async fn next(&self, cancel: &CancellationSignal) -> Option<UrlRecord> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if cancel.is_cancelled() {
                    return None;
                }
                if let Some(record) = state.frontier.dequeue() {
                    state.in_flight += 1;
                    return Some(record);
                }
                if state.in_flight == 0 {
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Marks a URL returned by [`SharedFrontier::next`] as processed
    pub fn complete(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::session::cancellation;
    use crate::url::NormalizeOptions;
    use std::sync::Arc;

    fn record(raw: &str, depth: u32) -> UrlRecord {
        UrlRecord::new(raw, None, depth, &NormalizeOptions::default()).unwrap()
    }

    fn date(s: &str) -> Option<DateTime<Utc>> {
        Some(DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc))
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut frontier = Frontier::new(5, 100);
        assert_eq!(
            frontier.enqueue(record("https://docs.example.com/Guide/", 1)),
            EnqueueOutcome::Queued
        );
        assert_eq!(
            frontier.enqueue(record("https://DOCS.example.com/guide", 2)),
            EnqueueOutcome::Duplicate
        );
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut frontier = Frontier::new(1, 100);
        assert_eq!(
            frontier.enqueue(record("https://example.com/a/b", 2)),
            EnqueueOutcome::TooDeep
        );
        // A shallower route to the same page is still accepted
        assert_eq!(
            frontier.enqueue(record("https://example.com/a/b", 1)),
            EnqueueOutcome::Queued
        );
    }

    #[test]
    fn test_page_budget() {
        let mut frontier = Frontier::new(5, 2);
        frontier.enqueue(record("https://example.com/1", 0));
        frontier.enqueue(record("https://example.com/2", 1));
        assert!(!frontier.budget_exhausted());

        assert_eq!(
            frontier.enqueue(record("https://example.com/3", 1)),
            EnqueueOutcome::BudgetExhausted
        );
        assert!(frontier.budget_exhausted());

        // Dequeuing does not free budget
        frontier.dequeue();
        assert_eq!(
            frontier.enqueue(record("https://example.com/4", 1)),
            EnqueueOutcome::BudgetExhausted
        );
    }

    #[test]
    fn test_sitemap_freshest_first() {
        let mut frontier = Frontier::new(5, 100);
        frontier.enqueue_sitemap(
            record("https://docs.example.com/guide/intro", 1),
            date("2024-01-01T00:00:00Z"),
        );
        frontier.enqueue_sitemap(
            record("https://docs.example.com/guide/setup", 1),
            date("2024-06-01T00:00:00Z"),
        );
        frontier.enqueue_sitemap(record("https://docs.example.com/faq", 1), None);

        let order: Vec<String> = std::iter::from_fn(|| frontier.dequeue())
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "https://docs.example.com/guide/setup",
                "https://docs.example.com/guide/intro",
                "https://docs.example.com/faq",
            ]
        );
    }

    #[test]
    fn test_sitemap_lane_before_discovered() {
        let mut frontier = Frontier::new(5, 100);
        frontier.enqueue(record("https://example.com/", 0));
        frontier.enqueue(record("https://example.com/linked", 1));
        frontier.enqueue_sitemap(record("https://example.com/mapped", 1), None);

        assert_eq!(frontier.dequeue().unwrap().key(), "https://example.com/mapped");
        assert_eq!(frontier.dequeue().unwrap().key(), "https://example.com/");
        assert_eq!(frontier.dequeue().unwrap().key(), "https://example.com/linked");
        assert!(frontier.dequeue().is_none());
    }

    #[test]
    fn test_discovered_ranked_by_path_within_depth() {
        let mut frontier = Frontier::new(5, 100);
        frontier.enqueue(record("https://example.com/blog/post", 1));
        frontier.enqueue(record("https://example.com/pricing", 1));
        frontier.enqueue(record("https://example.com/api/ref", 1));
        frontier.enqueue(record("https://example.com/guide/intro", 1));
        frontier.enqueue(record("https://example.com/about", 0));

        let order: Vec<String> = std::iter::from_fn(|| frontier.dequeue())
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/about",
                "https://example.com/guide/intro",
                "https://example.com/api/ref",
                "https://example.com/blog/post",
                "https://example.com/pricing",
            ]
        );
    }

    #[test]
    fn test_equal_priority_keeps_arrival_order() {
        let mut frontier = Frontier::new(5, 100);
        frontier.enqueue(record("https://example.com/zeta", 1));
        frontier.enqueue(record("https://example.com/alpha", 1));

        assert_eq!(frontier.dequeue().unwrap().key(), "https://example.com/zeta");
        assert_eq!(frontier.dequeue().unwrap().key(), "https://example.com/alpha");
    }

    #[test]
    fn test_path_priority() {
        let url = |raw: &str| Url::parse(raw).unwrap();
        assert_eq!(path_priority(&url("https://example.com/")), 15);
        assert_eq!(path_priority(&url("https://example.com/docs/install")), 30);
        assert_eq!(path_priority(&url("https://example.com/api/v1")), 40);
        assert_eq!(path_priority(&url("https://example.com/news/2024")), 90);
        assert_eq!(path_priority(&url("https://example.com/pricing")), 105);
        assert_eq!(path_priority(&url("https://example.com/pricing?plan=team")), 115);
        // Depth penalty is capped
        assert_eq!(
            path_priority(&url("https://example.com/a/b/c/d/e/f/g/h/i/j/k/l")),
            150
        );
    }

    #[test]
    fn test_mark_seen() {
        let mut frontier = Frontier::new(5, 100);
        assert!(!frontier.is_seen("https://example.com/target"));
        assert!(frontier.mark_seen("https://example.com/target"));
        assert!(frontier.is_seen("https://example.com/target"));
        assert!(!frontier.mark_seen("https://example.com/target"));
        assert_eq!(
            frontier.enqueue(record("https://example.com/target", 1)),
            EnqueueOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_shared_frontier_waits_for_in_flight_work() {
        let (_cancel, signal) = cancellation();
        let shared = Arc::new(SharedFrontier::new(Frontier::new(5, 100)));
        shared.push(record("https://example.com/", 0));

        let first = shared.next(&signal).await.unwrap();
        assert_eq!(first.key(), "https://example.com/");

        // A second worker blocks until the first one reports its links
        let waiter = {
            let shared = shared.clone();
            let signal = signal.clone();
            tokio::spawn(async move { shared.next(&signal).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        shared.push(record("https://example.com/child", 1));
        shared.complete();

        let second = waiter.await.unwrap().unwrap();
        assert_eq!(second.key(), "https://example.com/child");
        shared.complete();

        assert!(shared.next(&signal).await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_dequeue() {
        let (cancel, signal) = cancellation();
        let shared = SharedFrontier::new(Frontier::new(5, 100));
        shared.push(record("https://example.com/", 0));

        cancel.cancel();
        assert!(shared.next(&signal).await.is_none());
        assert_eq!(shared.pending(), 1);
    }
}
