//! Storage module for the incremental manifest
//!
//! This module persists everything a re-run needs to stay cheap:
//! - Manifest entries (validators, content hash, output path) per canonical URL
//! - Outbound links, replayed for pages served from cache
//! - Content-addressed asset records and their references
//! - Session records and per-URL failures

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ManifestStore, StorageError, StorageResult};

use crate::state::{FailureReason, PageStatus, Validators};
use std::sync::{Arc, Mutex, MutexGuard};

/// Manifest store shared by the workers of one session
pub type SharedStore = Arc<Mutex<dyn ManifestStore + Send>>;

/// Locks the shared store, recovering the guard if a worker panicked
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, dyn ManifestStore + Send + 'static> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Persistent projection of an exported page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Canonical URL, the manifest key
    pub url: String,
    /// URL the content was finally served from
    pub final_url: String,
    pub domain: String,
    /// Output path relative to the output root, `/`-separated
    pub file_path: String,
    pub content_hash: String,
    pub validators: Validators,
    pub http_status: u16,
    pub status: PageStatus,
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical_url: Option<String>,
    pub locale: Option<String>,
    pub first_fetched_at: String,
    pub last_fetched_at: String,
    pub last_session: Option<String>,
    pub revision: i64,
}

/// A stored asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Hex SHA-256 of the asset bytes
    pub hash: String,
    pub byte_len: u64,
    /// Path relative to the output root
    pub stored_path: String,
    pub content_type: Option<String>,
}

/// A session row
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub config_json: String,
    pub termination: Option<String>,
    pub counters_json: Option<String>,
}

/// A recorded per-URL failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub url: String,
    pub reason: FailureReason,
    pub detail: String,
    pub recorded_at: String,
}
