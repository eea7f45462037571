//! Storage traits and error types
//!
//! This module defines the trait interface for manifest backends and the
//! associated error type.

use crate::state::{FailureReason, PageStatus, Validators};
use crate::storage::{AssetRecord, FailureRecord, ManifestEntry, SessionRecord};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Manifest entry for {0} changed underneath this commit")]
    WriteConflict(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of prior crawl state
///
/// One instance is opened per session and shared by the workers behind a
/// mutex; every check-and-update happens under that lock.
pub trait ManifestStore {
    // ===== Sessions =====

    /// Records the start of a session with its resolved configuration
    fn begin_session(
        &mut self,
        session_id: &str,
        config_hash: &str,
        config_json: &str,
    ) -> StorageResult<()>;

    /// Records the end of a session
    ///
    /// # Arguments
    ///
    /// * `termination` - Termination reason code
    /// * `counters_json` - Final counters, serialized
    fn finish_session(
        &mut self,
        session_id: &str,
        termination: &str,
        counters_json: &str,
    ) -> StorageResult<()>;

    /// Gets a session record
    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord>;

    // ===== Pages =====

    /// Gets the manifest entry for a canonical URL
    fn entry(&self, url: &str) -> StorageResult<Option<ManifestEntry>>;

    /// Decides whether a URL needs an unconditional fetch
    ///
    /// True when there is no entry, the entry carries no validators, or the
    /// caller forces a refetch. False means a conditional request is enough.
    fn should_refetch(&self, url: &str, force: bool) -> StorageResult<bool> {
        if force {
            return Ok(true);
        }
        Ok(self
            .entry(url)?
            .map_or(true, |entry| entry.validators.is_empty()))
    }

    /// Atomically writes a page file and its manifest entry
    ///
    /// The file lands at `root/entry.file_path`. Either both the file and the
    /// row are updated, or neither is.
    ///
    /// # Arguments
    ///
    /// * `entry` - New manifest state for the page
    /// * `expected_revision` - Revision read before processing; `None` for a new page
    /// * `file_bytes` - Full document content
    /// * `root` - Output root directory
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - The new revision
    /// * `Err(StorageError::WriteConflict)` - The entry changed since it was read
    fn commit(
        &mut self,
        entry: &ManifestEntry,
        expected_revision: Option<i64>,
        file_bytes: &[u8],
        root: &Path,
    ) -> StorageResult<i64>;

    /// Refreshes an entry whose content did not change (304 or identical hash)
    fn mark_cached(
        &mut self,
        url: &str,
        session_id: &str,
        status: PageStatus,
        validators: &Validators,
    ) -> StorageResult<()>;

    /// Returns the URL that owns an output path, if any
    fn path_owner(&self, file_path: &str) -> StorageResult<Option<String>>;

    /// Entries touched by a session, ordered by file path
    fn session_pages(&self, session_id: &str) -> StorageResult<Vec<ManifestEntry>>;

    // ===== Links =====

    /// Replaces the stored outbound links of a page
    fn replace_links(&mut self, from_url: &str, to_urls: &[String]) -> StorageResult<()>;

    /// Stored outbound links of a page
    fn links_from(&self, from_url: &str) -> StorageResult<Vec<String>>;

    // ===== Assets =====

    /// Looks up an asset by content hash
    fn asset_by_hash(&self, hash: &str) -> StorageResult<Option<AssetRecord>>;

    /// Looks up the asset an origin URL resolved to previously
    fn asset_by_origin(&self, origin_url: &str) -> StorageResult<Option<AssetRecord>>;

    /// Inserts an asset record (no-op if the hash is known)
    fn insert_asset(&mut self, asset: &AssetRecord) -> StorageResult<()>;

    /// Records that `page_url` references the asset through `origin_url`
    fn add_asset_ref(&mut self, hash: &str, origin_url: &str, page_url: &str)
        -> StorageResult<()>;

    // ===== Failures =====

    /// Records a per-URL failure or skip
    fn record_failure(
        &mut self,
        session_id: &str,
        url: &str,
        reason: FailureReason,
        detail: &str,
    ) -> StorageResult<()>;

    /// Failures recorded by a session, in order
    fn session_failures(&self, session_id: &str) -> StorageResult<Vec<FailureRecord>>;
}
