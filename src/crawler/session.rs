//! Export sessions
//!
//! A session is one pipeline run. Callers start it, observe it through a
//! broadcast stream of immutable [`ProgressEvent`]s, cancel it, and finally
//! wait for its [`SessionSummary`].

use crate::config::Config;
use crate::crawler::coordinator::Coordinator;
use crate::output::SessionSummary;
use crate::state::{FailureReason, PageStatus};
use crate::{Result, SitedownError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Capacity of the progress event channel; slow subscribers skip ahead
const EVENT_CAPACITY: usize = 1024;

/// Creates a linked cancel switch and signal
pub fn cancellation() -> (Canceller, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller(Arc::new(tx)), CancellationSignal(rx))
}

/// Triggers cancellation of a session
#[derive(Debug, Clone)]
pub struct Canceller(Arc<watch::Sender<bool>>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observes cancellation; cloned into every worker
#[derive(Debug, Clone)]
pub struct CancellationSignal(watch::Receiver<bool>);

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the session is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // The switch is gone without firing; nothing can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The frontier ran dry
    Completed,
    /// The page budget refused further URLs
    PageBudgetReached,
    /// Cancelled by the caller
    Cancelled,
    /// A session-level failure (manifest store unreachable)
    Fatal,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PageBudgetReached => "page_budget_reached",
            Self::Cancelled => "cancelled",
            Self::Fatal => "fatal",
        }
    }
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// URLs accepted into the frontier
    pub discovered: u64,
    /// Responses received (200 or 304)
    pub fetched: u64,
    pub exported: u64,
    pub unchanged: u64,
    pub not_modified: u64,
    #[serde(default)]
    pub aliased: u64,
    pub robots_denied: u64,
    pub failed: u64,
    pub bytes_fetched: u64,
    pub assets_stored: u64,
}

/// Running counters, updated by all workers
#[derive(Debug, Default)]
pub struct SessionCounters {
    discovered: AtomicU64,
    fetched: AtomicU64,
    exported: AtomicU64,
    unchanged: AtomicU64,
    not_modified: AtomicU64,
    aliased: AtomicU64,
    robots_denied: AtomicU64,
    failed: AtomicU64,
    bytes_fetched: AtomicU64,
    assets_stored: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a response and its body size
    pub fn record_fetch(&self, bytes: usize) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_asset(&self) {
        self.assets_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts the final status of a URL
    pub fn record_status(&self, status: PageStatus) {
        let counter = match status {
            PageStatus::Exported => &self.exported,
            PageStatus::Unchanged => &self.unchanged,
            PageStatus::NotModified => &self.not_modified,
            PageStatus::Alias => &self.aliased,
            PageStatus::RobotsDenied => &self.robots_denied,
            PageStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            discovered: load(&self.discovered),
            fetched: load(&self.fetched),
            exported: load(&self.exported),
            unchanged: load(&self.unchanged),
            not_modified: load(&self.not_modified),
            aliased: load(&self.aliased),
            robots_denied: load(&self.robots_denied),
            failed: load(&self.failed),
            bytes_fetched: load(&self.bytes_fetched),
            assets_stored: load(&self.assets_stored),
        }
    }
}

/// Pipeline phase an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Seeds and sitemaps loaded into the frontier
    Discovery,
    /// One URL finished processing
    Fetch,
    /// The session finished
    Complete,
    /// The session aborted
    Failed,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// URLs queued by seeds and sitemaps
    Queued(usize),
    Exported,
    Unchanged,
    NotModified,
    Alias,
    RobotsDenied,
    Failed(FailureReason),
    SessionFinished(TerminationReason),
}

impl Outcome {
    /// Outcome for a final page status; failures carry their reason separately
    pub fn from_status(status: PageStatus, reason: Option<FailureReason>) -> Self {
        match status {
            PageStatus::Exported => Self::Exported,
            PageStatus::Unchanged => Self::Unchanged,
            PageStatus::NotModified => Self::NotModified,
            PageStatus::Alias => Self::Alias,
            PageStatus::RobotsDenied => Self::RobotsDenied,
            PageStatus::Failed => Self::Failed(reason.unwrap_or(FailureReason::Network)),
        }
    }
}

/// Immutable progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub session_id: String,
    pub phase: Phase,
    /// URL the event is about; None for session-level events
    pub url: Option<String>,
    pub outcome: Outcome,
}

/// A running session
pub struct SessionHandle {
    session_id: String,
    events: broadcast::Sender<ProgressEvent>,
    initial: Option<broadcast::Receiver<ProgressEvent>>,
    canceller: Canceller,
    task: JoinHandle<Result<SessionSummary>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The receiver subscribed when the session started
    ///
    /// It sees every event from the first one. Later calls fall back to a fresh
    /// subscription.
    pub fn events(&mut self) -> broadcast::Receiver<ProgressEvent> {
        self.initial
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Adds an observer that sees events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Stops workers from taking new URLs; in-flight work finishes
    pub fn cancel(&self) {
        tracing::info!("Cancelling session {}", self.session_id);
        self.canceller.cancel();
    }

    /// A cancel switch that can be moved elsewhere (e.g. a signal handler)
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Waits for the session to end
    pub async fn wait(self) -> Result<SessionSummary> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SitedownError::Session(format!("session task failed: {}", e))),
        }
    }
}

/// Starts an export session
///
/// Setup problems (invalid config, unwritable output root, unreachable
/// manifest store) are returned here; everything after that is reported
/// through the handle. Must be called inside a Tokio runtime.
///
/// # Arguments
///
/// * `config` - Resolved configuration
///
/// # Returns
///
/// * `Ok(SessionHandle)` - The session is running
/// * `Err(SitedownError)` - The session could not start
pub fn start_session(config: Config) -> Result<SessionHandle> {
    let (events, initial) = broadcast::channel(EVENT_CAPACITY);
    let (canceller, signal) = cancellation();

    let coordinator = Coordinator::new(config, events.clone(), canceller.clone(), signal)?;
    let session_id = coordinator.session_id().to_string();
    let task = tokio::spawn(coordinator.run());

    Ok(SessionHandle {
        session_id,
        events,
        initial: Some(initial),
        canceller,
        task,
    })
}

/// Cancels a running session
pub fn cancel(handle: &SessionHandle) {
    handle.cancel();
}
