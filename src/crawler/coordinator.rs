//! Session coordinator - the export pipeline
//!
//! This module drives one export session:
//! - Validating the config and opening the manifest and output root
//! - Seeding the frontier from seeds and sitemaps
//! - Running a pool of workers that fetch, extract, convert and commit pages
//! - Recording every per-URL outcome and writing the session index
//!
//! Per-URL failures are recorded and never stop the pool. Only a manifest
//! store failure aborts the session.

use crate::assets::AssetManager;
use crate::auth::AuthContext;
use crate::config::{config_snapshot, validate, Config, LocalePolicyKind};
use crate::convert::{self, collect_asset_urls, ConvertOptions, LinkResolver, PageSource};
use crate::crawler::fetcher::{build_http_client, FetchError, FetchResult, Fetcher};
use crate::crawler::frontier::{EnqueueOutcome, Frontier, SharedFrontier};
use crate::crawler::parser::discover_links;
use crate::crawler::politeness::HostLimiter;
use crate::crawler::render::{
    create_renderer, needs_rendering, render_with_permit, Renderer, WaitPolicy,
};
use crate::crawler::session::{
    CancellationSignal, Canceller, Outcome, Phase, ProgressEvent, SessionCounters,
    TerminationReason,
};
use crate::crawler::sitemap::discover_sitemaps;
use crate::extract::{extract, ExtractedContent};
use crate::output::{
    check_writable, host_key, relative_link, write_index, FailureEntry, IndexEntry, PathPlanner,
    SessionSummary,
};
use crate::robots::RobotsGate;
use crate::state::{FailureReason, PageStatus, Validators};
use crate::storage::{
    lock_store, ManifestEntry, SharedStore, SqliteStorage, StorageError, StorageResult,
};
use crate::url::{registrable_domain_of_host, NormalizeOptions, Scope, UrlRecord};
use crate::{Result, SitedownError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;
use url::Url;

/// Depth assigned to sitemap entries
const SITEMAP_DEPTH: u32 = 1;

/// Shared network collaborators
struct Network {
    robots: Arc<RobotsGate>,
    limiter: Arc<HostLimiter>,
    fetcher: Arc<Fetcher>,
}

impl Network {
    fn new(config: &Config, scope: &Scope) -> Result<Self> {
        let client = build_http_client(config)?;
        let limiter = Arc::new(HostLimiter::new(
            config.crawler.per_host_concurrency as usize,
            std::time::Duration::from_millis(config.fetch.min_delay_ms),
            config.fetch.jitter_ms,
        ));
        let robots = Arc::new(RobotsGate::new(config)?.with_limiter(limiter.clone()));
        let auth = Arc::new(
            AuthContext::from_config(&config.auth)?.with_header_domains(scope.seed_domains()),
        );
        let fetcher = Arc::new(Fetcher::new(
            client,
            auth,
            limiter.clone(),
            robots.clone(),
            &config.fetch,
        ));
        Ok(Self {
            robots,
            limiter,
            fetcher,
        })
    }
}

/// Result of processing one URL
struct PageOutcome {
    status: PageStatus,
    reason: Option<FailureReason>,
}

impl PageOutcome {
    fn status(status: PageStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    fn failed(reason: FailureReason) -> Self {
        Self {
            status: PageStatus::Failed,
            reason: Some(reason),
        }
    }
}

/// Main session coordinator structure
pub struct Coordinator {
    session_id: String,
    config: Arc<Config>,
    config_hash: String,
    config_json: String,
    root: PathBuf,
    store: SharedStore,
    scope: Scope,
    normalize: NormalizeOptions,
    seeds: Vec<UrlRecord>,
    robots: Arc<RobotsGate>,
    limiter: Arc<HostLimiter>,
    fetcher: Arc<Fetcher>,
    renderer: Option<Box<dyn Renderer>>,
    wait: WaitPolicy,
    assets: Option<AssetManager>,
    planner: Mutex<PathPlanner>,
    frontier: SharedFrontier,
    counters: SessionCounters,
    convert: ConvertOptions,
    events: broadcast::Sender<ProgressEvent>,
    canceller: Canceller,
    signal: CancellationSignal,
    fatal: Mutex<Option<String>>,
}

impl Coordinator {
    /// Creates a coordinator for a new session
    ///
    /// Every session-level precondition is checked here: a failure means the
    /// session never starts.
    ///
    /// # Arguments
    ///
    /// * `config` - The resolved configuration
    /// * `events` - Progress event channel
    /// * `canceller` - Cancel switch, also pulled on a fatal error
    /// * `signal` - Cancellation observed by the workers
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(SitedownError)` - Invalid config, unwritable output root or unusable manifest
    pub fn new(
        config: Config,
        events: broadcast::Sender<ProgressEvent>,
        canceller: Canceller,
        signal: CancellationSignal,
    ) -> Result<Self> {
        validate(&config)?;

        let root = config.output.directory.clone();
        check_writable(&root).map_err(|source| SitedownError::OutputRootUnwritable {
            path: root.display().to_string(),
            source,
        })?;

        let storage = SqliteStorage::new(&config.manifest_path())?;
        let store: SharedStore = Arc::new(Mutex::new(storage));
        let (config_json, config_hash) = config_snapshot(&config)?;

        let normalize = NormalizeOptions::from(&config.scope);
        let seeds = resolve_seeds(&config, &normalize)?;
        let seed_urls: Vec<Url> = seeds.iter().map(|s| s.url.canonical.clone()).collect();
        let scope = Scope::new(&seed_urls, &config.scope, &config.crawler)?;

        let Network {
            robots,
            limiter,
            fetcher,
        } = Network::new(&config, &scope)?;

        let assets = config.assets.download.then(|| {
            AssetManager::new(
                fetcher.clone(),
                robots.clone(),
                store.clone(),
                root.clone(),
                &config.assets.folder,
                config.assets.min_bytes,
            )
        });

        let primary = seed_urls.first().map(host_key).unwrap_or_default();
        let planner = PathPlanner::new(
            &primary,
            &config.output.index_file,
            &config.assets.folder,
        );
        let frontier = SharedFrontier::new(Frontier::new(
            config.crawler.max_depth,
            config.crawler.max_pages as usize,
        ));

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            "Prepared session {} for {} seed(s), exporting to {}",
            session_id,
            seeds.len(),
            root.display()
        );

        Ok(Self {
            session_id,
            renderer: create_renderer(&config.render),
            wait: WaitPolicy::from(&config.render),
            convert: ConvertOptions::from(&config.markdown),
            config: Arc::new(config),
            config_hash,
            config_json,
            root,
            store,
            scope,
            normalize,
            seeds,
            robots,
            limiter,
            fetcher,
            assets,
            planner: Mutex::new(planner),
            frontier,
            counters: SessionCounters::new(),
            events,
            canceller,
            signal,
            fatal: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Lists the URLs a session would start with, without exporting anything
    ///
    /// Seeds and in-scope sitemap entries, in the order workers would take them,
    /// capped by the page budget. Nothing is written to the output root.
    pub async fn dry_run(config: &Config) -> Result<Vec<String>> {
        validate(config)?;
        let normalize = NormalizeOptions::from(&config.scope);
        let seeds = resolve_seeds(config, &normalize)?;
        let seed_urls: Vec<Url> = seeds.iter().map(|s| s.url.canonical.clone()).collect();
        let scope = Scope::new(&seed_urls, &config.scope, &config.crawler)?;
        let network = Network::new(config, &scope)?;

        let mut frontier = Frontier::new(config.crawler.max_depth, config.crawler.max_pages as usize);
        for seed in seeds {
            frontier.enqueue(seed);
        }
        if config.crawler.use_sitemaps {
            let entries = discover_sitemaps(&network.fetcher, &network.robots, &seed_urls).await;
            for entry in entries {
                if let Some(record) = sitemap_record(&entry.loc, &scope, &normalize) {
                    frontier.enqueue_sitemap(record, entry.lastmod);
                }
            }
        }

        let mut urls = Vec::new();
        while let Some(record) = frontier.dequeue() {
            urls.push(record.key().to_string());
        }
        Ok(urls)
    }

    /// Runs the session to completion
    ///
    /// # Process
    ///
    /// 1. Record the session start in the manifest
    /// 2. Seed the frontier (seeds, then sitemap entries)
    /// 3. Drain the frontier with `concurrency` workers
    /// 4. Record the end of the session and write the index
    ///
    /// # Returns
    ///
    /// * `Ok(SessionSummary)` - Completed, cancelled or stopped by the page budget
    /// * `Err(SitedownError)` - The manifest became unusable mid-session
    pub async fn run(self) -> Result<SessionSummary> {
        let started_at = Utc::now();
        let clock = Instant::now();

        lock_store(&self.store).begin_session(
            &self.session_id,
            &self.config_hash,
            &self.config_json,
        )?;
        tracing::info!("Starting session {}", self.session_id);

        let queued = self.seed().await;
        self.emit(Phase::Discovery, None, Outcome::Queued(queued));

        let coordinator = Arc::new(self);
        let workers = coordinator.config.crawler.concurrency.max(1);
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.worker(worker).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        coordinator.finish(started_at, clock).await
    }

    /// Loads seeds and sitemap entries into the frontier
    async fn seed(&self) -> usize {
        let mut queued = 0;
        for seed in &self.seeds {
            if self.offer(seed.clone(), None) {
                queued += 1;
            }
        }

        if self.config.crawler.use_sitemaps {
            let seed_urls: Vec<Url> = self.seeds.iter().map(|s| s.url.canonical.clone()).collect();
            let entries = discover_sitemaps(&self.fetcher, &self.robots, &seed_urls).await;
            tracing::info!("Sitemaps listed {} URL(s)", entries.len());
            for entry in entries {
                if let Some(record) = sitemap_record(&entry.loc, &self.scope, &self.normalize) {
                    if self.offer(record, Some(entry.lastmod)) {
                        queued += 1;
                    }
                }
            }
        }

        tracing::info!("Queued {} URL(s) from seeds and sitemaps", queued);
        queued
    }

    /// Offers a URL to the frontier; `Some(lastmod)` puts it in the sitemap lane
    fn offer(&self, record: UrlRecord, sitemap: Option<Option<DateTime<Utc>>>) -> bool {
        let key = record.key().to_string();
        let outcome = match sitemap {
            Some(lastmod) => self.frontier.push_sitemap(record, lastmod),
            None => self.frontier.push(record),
        };
        match outcome {
            EnqueueOutcome::Queued => {
                self.counters.record_discovered();
                true
            }
            EnqueueOutcome::BudgetExhausted => {
                tracing::debug!("Page budget reached, not queueing {}", key);
                false
            }
            EnqueueOutcome::Duplicate | EnqueueOutcome::TooDeep => false,
        }
    }

    /// One worker: takes URLs until the frontier is drained or the session stops
    async fn worker(&self, worker: u32) {
        tracing::debug!("Worker {} started", worker);
        while let Some(record) = self.frontier.next(&self.signal).await {
            let url = record.key().to_string();

            match self.process(&record).await {
                Ok(outcome) => {
                    self.counters.record_status(outcome.status);
                    self.emit(
                        Phase::Fetch,
                        Some(url),
                        Outcome::from_status(outcome.status, outcome.reason),
                    );
                }
                Err(e) => {
                    tracing::error!("Aborting session {}: {}", self.session_id, e);
                    self.set_fatal(e.to_string());
                    self.canceller.cancel();
                }
            }

            self.frontier.complete();
        }
        tracing::debug!("Worker {} finished", worker);
    }

    /// Processes one URL through the whole pipeline
    ///
    /// # Returns
    ///
    /// * `Ok(PageOutcome)` - Final status of the URL, including recorded failures
    /// * `Err(SitedownError)` - The manifest store failed; fatal to the session
    async fn process(&self, record: &UrlRecord) -> Result<PageOutcome> {
        let key = record.key();
        let target = &record.url.target;

        if !self.robots.is_allowed(target).await {
            tracing::info!("URL {} disallowed by robots.txt", target);
            self.record_failure(key, FailureReason::RobotsDenied, "disallowed by robots.txt")?;
            return Ok(PageOutcome::status(PageStatus::RobotsDenied));
        }

        let previous = lock_store(&self.store).entry(key)?;
        let validators = self.conditional_validators(key, previous.as_ref())?;

        let response = match self.fetcher.fetch(target, validators.as_ref()).await {
            Ok(response) => response,
            Err(FetchError::RobotsDenied(next)) => {
                tracing::info!("Redirect from {} to {} disallowed by robots.txt", target, next);
                let detail = format!("redirect target {} disallowed by robots.txt", next);
                self.record_failure(key, FailureReason::RobotsDenied, &detail)?;
                return Ok(PageOutcome::status(PageStatus::RobotsDenied));
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", target, e);
                let reason = e.reason();
                self.record_failure(key, reason, &e.to_string())?;
                return Ok(PageOutcome::failed(reason));
            }
        };
        self.counters.record_fetch(response.body.len());

        if let Some(alias) = self.redirect_alias(record, &response) {
            tracing::debug!("{} redirects to already known {}", key, alias);
            return Ok(PageOutcome::status(PageStatus::Alias));
        }

        if response.not_modified {
            return self.replay_cached(record, &response).await;
        }

        if !response.is_html() {
            let detail = format!(
                "unsupported content type {}",
                response.content_type.as_deref().unwrap_or("unknown")
            );
            tracing::info!("Skipping {}: {}", target, detail);
            self.record_failure(key, FailureReason::NoExtractableContent, &detail)?;
            return Ok(PageOutcome::failed(FailureReason::NoExtractableContent));
        }

        let html = self.rendered_html(&response).await;
        let content = match extract(&html, &response.final_url, self.config.extract.min_text_chars) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("{}", e);
                self.record_failure(key, FailureReason::NoExtractableContent, &e.to_string())?;
                return Ok(PageOutcome::failed(FailureReason::NoExtractableContent));
            }
        };

        let discovered = discover_links(&html, &response.final_url);

        if let Some(canonical) = self.declared_alias(record, &content) {
            tracing::info!("{} declares canonical {}, exporting only that", key, canonical.key());
            self.offer(canonical, None);
            return Ok(PageOutcome::status(PageStatus::Alias));
        }

        let file_path = {
            let mut planner = lock(&self.planner);
            let store = lock_store(&self.store);
            planner.assign(key, &record.url.canonical, &*store)?
        };

        let assets = self.acquire_assets(&content, key).await;

        let mut links = PageLinks {
            coordinator: self,
            from_file: &file_path,
            assets,
            pages: Vec::new(),
        };
        let source = PageSource {
            url: response.final_url.clone(),
            canonical_url: content
                .canonical_url
                .clone()
                .unwrap_or_else(|| record.url.canonical.clone()),
            fetched_at: Utc::now(),
        };
        let document = convert::convert(&content, &source, &mut links, &self.convert);
        let hash = match document.content_hash() {
            Ok(hash) => hash,
            Err(e) => {
                self.record_failure(key, FailureReason::Io, &e.to_string())?;
                return Ok(PageOutcome::failed(FailureReason::Io));
            }
        };

        let status = match previous.as_ref() {
            Some(entry)
                if entry.content_hash == hash
                    && entry.file_path == file_path
                    && self.root.join(&file_path).is_file() =>
            {
                lock_store(&self.store).mark_cached(
                    key,
                    &self.session_id,
                    PageStatus::Unchanged,
                    &response.validators,
                )?;
                tracing::debug!("{} unchanged", key);
                PageOutcome::status(PageStatus::Unchanged)
            }
            _ => {
                let bytes = match document.render() {
                    Ok(rendered) => rendered.into_bytes(),
                    Err(e) => {
                        self.record_failure(key, FailureReason::Io, &e.to_string())?;
                        return Ok(PageOutcome::failed(FailureReason::Io));
                    }
                };
                let entry = ManifestEntry {
                    url: key.to_string(),
                    final_url: response.final_url.to_string(),
                    domain: record.domain.clone(),
                    file_path: file_path.clone(),
                    content_hash: hash,
                    validators: response.validators.clone(),
                    http_status: response.status,
                    status: PageStatus::Exported,
                    title: Some(content.title.clone()),
                    description: content.description.clone(),
                    canonical_url: content.canonical_url.as_ref().map(Url::to_string),
                    locale: content.locale.clone(),
                    first_fetched_at: previous
                        .as_ref()
                        .map(|p| p.first_fetched_at.clone())
                        .unwrap_or_else(|| source.fetched_at.to_rfc3339()),
                    last_fetched_at: source.fetched_at.to_rfc3339(),
                    last_session: Some(self.session_id.clone()),
                    revision: previous.as_ref().map_or(0, |p| p.revision),
                };
                self.commit(&entry, previous.as_ref().map(|p| p.revision), &bytes)?
            }
        };

        let mut outbound = links.pages;
        for link in &discovered.links {
            if let Some(child) = self.child_record(link, &discovered.base, record.depth + 1) {
                if !outbound.iter().any(|u| u == child.key()) {
                    outbound.push(child.key().to_string());
                }
                self.offer(child, None);
            }
        }
        if status.status != PageStatus::Failed {
            lock_store(&self.store).replace_links(key, &outbound)?;
        }

        Ok(status)
    }

    /// Validators to send, or None for an unconditional fetch
    fn conditional_validators(
        &self,
        key: &str,
        previous: Option<&ManifestEntry>,
    ) -> Result<Option<Validators>> {
        let incremental = &self.config.incremental;
        if !incremental.enabled {
            return Ok(None);
        }
        let Some(entry) = previous else {
            return Ok(None);
        };
        // A page whose file went missing must be fetched in full
        if !self.root.join(&entry.file_path).is_file() {
            return Ok(None);
        }
        if lock_store(&self.store).should_refetch(key, incremental.force_refetch)? {
            return Ok(None);
        }
        Ok(Some(entry.validators.clone()))
    }

    /// Detects a redirect onto a URL the session already knows
    ///
    /// The final URL is marked seen so it is not fetched again on its own.
    fn redirect_alias(&self, record: &UrlRecord, response: &FetchResult) -> Option<String> {
        if response.final_url == response.url {
            return None;
        }
        let landed = UrlRecord::new(response.final_url.as_str(), None, record.depth, &self.normalize).ok()?;
        if landed.key() == record.key() {
            return None;
        }
        (!self.frontier.mark_seen(landed.key())).then(|| landed.key().to_string())
    }

    /// Replays stored links for a page the origin reported as not modified
    async fn replay_cached(&self, record: &UrlRecord, response: &FetchResult) -> Result<PageOutcome> {
        let key = record.key();
        let links = {
            let mut store = lock_store(&self.store);
            store.mark_cached(key, &self.session_id, PageStatus::NotModified, &response.validators)?;
            store.links_from(key)?
        };
        tracing::debug!("{} not modified, replaying {} link(s)", key, links.len());

        for link in links {
            if let Some(child) = self.child_record(&link, &record.url.canonical, record.depth + 1) {
                self.offer(child, None);
            }
        }
        Ok(PageOutcome::status(PageStatus::NotModified))
    }

    /// Static HTML, or the rendered DOM when the page looks script-driven
    async fn rendered_html(&self, response: &FetchResult) -> String {
        let html = response.text();
        let Some(renderer) = &self.renderer else {
            return html;
        };
        if !needs_rendering(&html, self.config.render.min_static_text) {
            return html;
        }

        let crawl_delay = self.robots.crawl_delay(&response.final_url).await;
        match render_with_permit(
            renderer.as_ref(),
            &self.limiter,
            crawl_delay,
            &response.final_url,
            self.fetcher.auth(),
            &self.wait,
        )
        .await
        {
            Ok(rendered) => {
                tracing::debug!("Rendered {}", response.final_url);
                rendered.html
            }
            Err(e) => {
                tracing::warn!(
                    "Rendering {} failed ({}), using static HTML: {}",
                    response.final_url,
                    e.reason().code(),
                    e
                );
                html
            }
        }
    }

    /// A declared canonical that should replace this page, under the canonical policy
    fn declared_alias(&self, record: &UrlRecord, content: &ExtractedContent) -> Option<UrlRecord> {
        if self.config.crawler.locale_policy != LocalePolicyKind::Canonical {
            return None;
        }
        let declared = content.canonical_url.as_ref()?;
        let canonical = UrlRecord::new(declared.as_str(), None, record.depth, &self.normalize).ok()?;
        if canonical.key() == record.key() || !self.scope.accepts(&canonical.url.canonical) {
            return None;
        }
        Some(canonical)
    }

    /// Downloads the assets referenced by extracted content
    ///
    /// # Returns
    ///
    /// Asset URL to path relative to the output root, for the assets stored
    async fn acquire_assets(&self, content: &ExtractedContent, page: &str) -> HashMap<String, String> {
        let mut stored = HashMap::new();
        let Some(assets) = &self.assets else {
            return stored;
        };

        let urls = collect_asset_urls(
            &content.main_html,
            &content.base,
            self.config.assets.include_documents,
        );
        for url in urls {
            match assets.acquire(&url, page).await {
                Ok(Some(asset)) => {
                    if asset.newly_stored {
                        self.counters.record_asset();
                    }
                    stored.insert(url.to_string(), asset.path);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("Keeping {} external: {}", url, e),
            }
        }
        stored
    }

    /// Normalizes a discovered link into an in-scope frontier record
    fn child_record(&self, link: &str, base: &Url, depth: u32) -> Option<UrlRecord> {
        let child = match UrlRecord::new(link, Some(base), depth, &self.normalize) {
            Ok(child) => child,
            Err(e) => {
                tracing::trace!("Dropping link {}: {}", link, e);
                return None;
            }
        };
        match self.scope.check(&child.url.canonical) {
            Ok(()) => Some(child),
            Err(rejection) => {
                tracing::trace!("Out of scope {}: {}", child.key(), rejection);
                None
            }
        }
    }

    /// Commits a page, retrying once on a revision conflict
    fn commit(
        &self,
        entry: &ManifestEntry,
        expected_revision: Option<i64>,
        bytes: &[u8],
    ) -> Result<PageOutcome> {
        let first = lock_store(&self.store).commit(entry, expected_revision, bytes, &self.root);
        let result = match first {
            Err(StorageError::WriteConflict(url)) => {
                tracing::warn!("Write conflict on {}, retrying", url);
                let mut store = lock_store(&self.store);
                let current = store.entry(&entry.url)?.map(|e| e.revision);
                store.commit(entry, current, bytes, &self.root)
            }
            other => other,
        };

        match result {
            Ok(revision) => {
                tracing::info!("Exported {} to {} (revision {})", entry.url, entry.file_path, revision);
                Ok(PageOutcome::status(PageStatus::Exported))
            }
            Err(StorageError::WriteConflict(url)) => {
                self.record_failure(&url, FailureReason::WriteConflict, "manifest entry kept changing")?;
                Ok(PageOutcome::failed(FailureReason::WriteConflict))
            }
            Err(StorageError::Io(e)) => {
                tracing::error!("Failed to write {}: {}", entry.file_path, e);
                self.record_failure(&entry.url, FailureReason::Io, &e.to_string())?;
                Ok(PageOutcome::failed(FailureReason::Io))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn record_failure(&self, url: &str, reason: FailureReason, detail: &str) -> StorageResult<()> {
        lock_store(&self.store).record_failure(&self.session_id, url, reason, detail)
    }

    fn emit(&self, phase: Phase, url: Option<String>, outcome: Outcome) {
        // No subscribers is fine
        let _ = self.events.send(ProgressEvent {
            session_id: self.session_id.clone(),
            phase,
            url,
            outcome,
        });
    }

    fn set_fatal(&self, message: String) {
        let mut fatal = lock(&self.fatal);
        if fatal.is_none() {
            *fatal = Some(message);
        }
    }

    /// Records the end of the session and writes the index
    async fn finish(&self, started_at: DateTime<Utc>, clock: Instant) -> Result<SessionSummary> {
        let fatal = lock(&self.fatal).clone();
        let termination = if fatal.is_some() {
            TerminationReason::Fatal
        } else if self.signal.is_cancelled() {
            TerminationReason::Cancelled
        } else if self.frontier.budget_exhausted() {
            TerminationReason::PageBudgetReached
        } else {
            TerminationReason::Completed
        };

        let counters = self.counters.snapshot();
        let counters_json = serde_json::to_string(&counters)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let (pages, failures) = {
            let mut store = lock_store(&self.store);
            store.finish_session(&self.session_id, termination.as_str(), &counters_json)?;
            (
                store.session_pages(&self.session_id)?,
                store.session_failures(&self.session_id)?,
            )
        };

        let summary = SessionSummary {
            session_id: self.session_id.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_secs: clock.elapsed().as_secs_f64(),
            termination,
            counters,
            pages: pages
                .into_iter()
                .map(|page| IndexEntry {
                    url: page.url,
                    path: page.file_path,
                    title: page.title,
                    status: page.status.to_db_string().to_string(),
                })
                .collect(),
            failures: failures
                .into_iter()
                .map(|failure| FailureEntry {
                    url: failure.url,
                    reason: failure.reason.to_db_string(),
                    detail: failure.detail,
                })
                .collect(),
        };

        if let Err(e) = write_index(&self.root, &self.config.output.index_file, &summary) {
            tracing::warn!("Failed to write session index: {}", e);
        }

        tracing::info!(
            "Session {} {}: {} exported, {} unchanged, {} not modified, {} failed in {:.1}s",
            self.session_id,
            termination.as_str(),
            summary.counters.exported,
            summary.counters.unchanged,
            summary.counters.not_modified,
            summary.counters.failed,
            summary.duration_secs
        );
        let domain = registrable_domain_of_host(self.scope.primary_host());
        tracing::debug!(
            "Peak concurrency against {}: {} request(s)",
            domain,
            self.limiter.peak_in_flight(&domain)
        );

        match fatal {
            Some(message) => {
                self.emit(Phase::Failed, None, Outcome::SessionFinished(termination));
                Err(SitedownError::Session(message))
            }
            None => {
                self.emit(Phase::Complete, None, Outcome::SessionFinished(termination));
                Ok(summary)
            }
        }
    }
}

/// Rewrites links of the page being converted
///
/// In-scope pages get their output path claimed on first reference, so links
/// point at the file the target will be exported to.
struct PageLinks<'a> {
    coordinator: &'a Coordinator,
    from_file: &'a str,
    /// Asset URL to path relative to the output root
    assets: HashMap<String, String>,
    /// Canonical keys of the pages linked from the content
    pages: Vec<String>,
}

impl LinkResolver for PageLinks<'_> {
    fn resolve_page(&mut self, url: &Url) -> Option<String> {
        let c = self.coordinator;
        let target = UrlRecord::new(url.as_str(), None, 0, &c.normalize).ok()?;
        c.scope.check(&target.url.canonical).ok()?;

        let path = {
            let mut planner = lock(&c.planner);
            let store = lock_store(&c.store);
            match planner.assign(target.key(), &target.url.canonical, &*store) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Cannot assign a path to {}: {}", target.key(), e);
                    return None;
                }
            }
        };

        if !self.pages.iter().any(|p| p == target.key()) {
            self.pages.push(target.key().to_string());
        }
        Some(relative_link(self.from_file, &path))
    }

    fn resolve_asset(&self, url: &Url) -> Option<String> {
        self.assets
            .get(url.as_str())
            .map(|path| relative_link(self.from_file, path))
    }
}

/// Normalizes the configured seeds at depth 0
fn resolve_seeds(config: &Config, options: &NormalizeOptions) -> Result<Vec<UrlRecord>> {
    config
        .crawler
        .seeds
        .iter()
        .map(|seed| UrlRecord::new(seed, None, 0, options).map_err(SitedownError::from))
        .collect()
}

/// Normalizes and scope-checks a sitemap location
fn sitemap_record(loc: &str, scope: &Scope, options: &NormalizeOptions) -> Option<UrlRecord> {
    let record = UrlRecord::new(loc, None, SITEMAP_DEPTH, options).ok()?;
    if scope.accepts(&record.url.canonical) {
        Some(record)
    } else {
        tracing::trace!("Sitemap entry {} is out of scope", loc);
        None
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
