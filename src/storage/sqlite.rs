//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ManifestStore trait.

use crate::output::StagedFile;
use crate::state::{FailureReason, PageStatus, Validators};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ManifestStore, StorageError, StorageResult};
use crate::storage::{AssetRecord, FailureRecord, ManifestEntry, SessionRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const ENTRY_COLUMNS: &str = "url, final_url, domain, file_path, content_hash, etag, last_modified,
     http_status, status, title, description, canonical_url, locale, first_fetched_at,
     last_fetched_at, last_session, revision";

/// SQLite manifest backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the manifest database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ManifestEntry> {
    Ok(ManifestEntry {
        url: row.get(0)?,
        final_url: row.get(1)?,
        domain: row.get(2)?,
        file_path: row.get(3)?,
        content_hash: row.get(4)?,
        validators: Validators {
            etag: row.get(5)?,
            last_modified: row.get(6)?,
        },
        http_status: row.get(7)?,
        status: PageStatus::from_db_string(&row.get::<_, String>(8)?)
            .unwrap_or(PageStatus::Exported),
        title: row.get(9)?,
        description: row.get(10)?,
        canonical_url: row.get(11)?,
        locale: row.get(12)?,
        first_fetched_at: row.get(13)?,
        last_fetched_at: row.get(14)?,
        last_session: row.get(15)?,
        revision: row.get(16)?,
    })
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<AssetRecord> {
    Ok(AssetRecord {
        hash: row.get(0)?,
        byte_len: row.get::<_, i64>(1)?.max(0) as u64,
        stored_path: row.get(2)?,
        content_type: row.get(3)?,
    })
}

/// Inserts or updates an entry, checking the revision it was read at
fn upsert_entry(
    conn: &Connection,
    entry: &ManifestEntry,
    expected_revision: Option<i64>,
) -> StorageResult<i64> {
    match expected_revision {
        None => {
            let inserted = conn.execute(
                "INSERT INTO pages (url, final_url, domain, file_path, content_hash, etag,
                 last_modified, http_status, status, title, description, canonical_url, locale,
                 first_fetched_at, last_fetched_at, last_session, revision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 1)
                 ON CONFLICT(url) DO NOTHING",
                params![
                    entry.url,
                    entry.final_url,
                    entry.domain,
                    entry.file_path,
                    entry.content_hash,
                    entry.validators.etag,
                    entry.validators.last_modified,
                    entry.http_status,
                    entry.status.to_db_string(),
                    entry.title,
                    entry.description,
                    entry.canonical_url,
                    entry.locale,
                    entry.first_fetched_at,
                    entry.last_fetched_at,
                    entry.last_session,
                ],
            )?;
            if inserted == 0 {
                return Err(StorageError::WriteConflict(entry.url.clone()));
            }
            Ok(1)
        }
        Some(revision) => {
            let updated = conn.execute(
                "UPDATE pages SET final_url = ?2, domain = ?3, file_path = ?4, content_hash = ?5,
                 etag = ?6, last_modified = ?7, http_status = ?8, status = ?9, title = ?10,
                 description = ?11, canonical_url = ?12, locale = ?13, last_fetched_at = ?14,
                 last_session = ?15, revision = revision + 1
                 WHERE url = ?1 AND revision = ?16",
                params![
                    entry.url,
                    entry.final_url,
                    entry.domain,
                    entry.file_path,
                    entry.content_hash,
                    entry.validators.etag,
                    entry.validators.last_modified,
                    entry.http_status,
                    entry.status.to_db_string(),
                    entry.title,
                    entry.description,
                    entry.canonical_url,
                    entry.locale,
                    entry.last_fetched_at,
                    entry.last_session,
                    revision,
                ],
            )?;
            if updated == 0 {
                return Err(StorageError::WriteConflict(entry.url.clone()));
            }
            Ok(revision + 1)
        }
    }
}

impl ManifestStore for SqliteStorage {
    // ===== Sessions =====

    fn begin_session(
        &mut self,
        session_id: &str,
        config_hash: &str,
        config_json: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, started_at, config_hash, config_json) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, Utc::now().to_rfc3339(), config_hash, config_json],
        )?;
        Ok(())
    }

    fn finish_session(
        &mut self,
        session_id: &str,
        termination: &str,
        counters_json: &str,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sessions SET finished_at = ?1, termination = ?2, counters_json = ?3 WHERE id = ?4",
            params![Utc::now().to_rfc3339(), termination, counters_json, session_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, config_json, termination, counters_json
                 FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        config_json: row.get(4)?,
                        termination: row.get(5)?,
                        counters_json: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    // ===== Pages =====

    fn entry(&self, url: &str) -> StorageResult<Option<ManifestEntry>> {
        let sql = format!("SELECT {} FROM pages WHERE url = ?1", ENTRY_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![url], entry_from_row)
            .optional()?)
    }

    fn commit(
        &mut self,
        entry: &ManifestEntry,
        expected_revision: Option<i64>,
        file_bytes: &[u8],
        root: &Path,
    ) -> StorageResult<i64> {
        let target = root.join(&entry.file_path);
        let mut staged = StagedFile::stage(&target, file_bytes)?;

        let tx = match self.conn.transaction() {
            Ok(tx) => tx,
            Err(e) => {
                staged.rollback();
                return Err(e.into());
            }
        };

        let revision = match upsert_entry(&tx, entry, expected_revision) {
            Ok(revision) => revision,
            Err(e) => {
                drop(tx);
                staged.rollback();
                return Err(e);
            }
        };

        if let Err(e) = staged.publish() {
            drop(tx);
            staged.rollback();
            return Err(e.into());
        }

        if let Err(e) = tx.commit() {
            staged.rollback();
            return Err(e.into());
        }

        staged.finish();
        tracing::trace!("Committed {} revision {}", entry.url, revision);
        Ok(revision)
    }

    fn mark_cached(
        &mut self,
        url: &str,
        session_id: &str,
        status: PageStatus,
        validators: &Validators,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE pages SET status = ?1, last_session = ?2, last_fetched_at = ?3,
             etag = COALESCE(?4, etag), last_modified = COALESCE(?5, last_modified)
             WHERE url = ?6",
            params![
                status.to_db_string(),
                session_id,
                Utc::now().to_rfc3339(),
                validators.etag,
                validators.last_modified,
                url,
            ],
        )?;
        Ok(())
    }

    fn path_owner(&self, file_path: &str) -> StorageResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT url FROM pages WHERE file_path = ?1",
                params![file_path],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn session_pages(&self, session_id: &str) -> StorageResult<Vec<ManifestEntry>> {
        let sql = format!(
            "SELECT {} FROM pages WHERE last_session = ?1 ORDER BY file_path",
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![session_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ===== Links =====

    fn replace_links(&mut self, from_url: &str, to_urls: &[String]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM page_links WHERE from_url = ?1", params![from_url])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO page_links (from_url, to_url) VALUES (?1, ?2)",
            )?;
            for to_url in to_urls {
                stmt.execute(params![from_url, to_url])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn links_from(&self, from_url: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT to_url FROM page_links WHERE from_url = ?1 ORDER BY rowid")?;
        let links = stmt
            .query_map(params![from_url], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(links)
    }

    // ===== Assets =====

    fn asset_by_hash(&self, hash: &str) -> StorageResult<Option<AssetRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT hash, byte_len, stored_path, content_type FROM assets WHERE hash = ?1",
                params![hash],
                asset_from_row,
            )
            .optional()?)
    }

    fn asset_by_origin(&self, origin_url: &str) -> StorageResult<Option<AssetRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT a.hash, a.byte_len, a.stored_path, a.content_type
                 FROM assets a JOIN asset_refs r ON r.hash = a.hash
                 WHERE r.origin_url = ?1 LIMIT 1",
                params![origin_url],
                asset_from_row,
            )
            .optional()?)
    }

    fn insert_asset(&mut self, asset: &AssetRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO assets (hash, byte_len, stored_path, content_type, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                asset.hash,
                asset.byte_len as i64,
                asset.stored_path,
                asset.content_type,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn add_asset_ref(
        &mut self,
        hash: &str,
        origin_url: &str,
        page_url: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO asset_refs (hash, origin_url, page_url) VALUES (?1, ?2, ?3)",
            params![hash, origin_url, page_url],
        )?;
        Ok(())
    }

    // ===== Failures =====

    fn record_failure(
        &mut self,
        session_id: &str,
        url: &str,
        reason: FailureReason,
        detail: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO failures (session_id, url, reason, detail, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                url,
                reason.to_db_string(),
                detail,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn session_failures(&self, session_id: &str) -> StorageResult<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, reason, detail, recorded_at FROM failures WHERE session_id = ?1 ORDER BY id",
        )?;
        let failures = stmt
            .query_map(params![session_id], |row| {
                let reason: String = row.get(1)?;
                Ok(FailureRecord {
                    url: row.get(0)?,
                    reason: FailureReason::from_db_string(&reason)
                        .unwrap_or(FailureReason::Io),
                    detail: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(failures)
    }
}
