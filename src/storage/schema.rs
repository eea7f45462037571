//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sitedown manifest.

/// SQL schema for the manifest database
pub const SCHEMA_SQL: &str = r#"
-- One row per export session
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    config_json TEXT NOT NULL,
    termination TEXT,
    counters_json TEXT
);

-- Manifest entries, keyed by canonical URL
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    final_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    file_path TEXT NOT NULL UNIQUE,
    content_hash TEXT NOT NULL,
    etag TEXT,
    last_modified TEXT,
    http_status INTEGER NOT NULL,
    status TEXT NOT NULL,
    title TEXT,
    description TEXT,
    canonical_url TEXT,
    locale TEXT,
    first_fetched_at TEXT NOT NULL,
    last_fetched_at TEXT NOT NULL,
    last_session TEXT,
    revision INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_pages_session ON pages(last_session);

-- Outbound in-scope links, replayed when a page is served from cache
CREATE TABLE IF NOT EXISTS page_links (
    from_url TEXT NOT NULL,
    to_url TEXT NOT NULL,
    PRIMARY KEY (from_url, to_url)
);

-- Content-addressed assets
CREATE TABLE IF NOT EXISTS assets (
    hash TEXT PRIMARY KEY,
    byte_len INTEGER NOT NULL,
    stored_path TEXT NOT NULL,
    content_type TEXT,
    first_seen_at TEXT NOT NULL
);

-- Which origin URLs resolved to an asset, and from which page
CREATE TABLE IF NOT EXISTS asset_refs (
    hash TEXT NOT NULL REFERENCES assets(hash),
    origin_url TEXT NOT NULL,
    page_url TEXT NOT NULL,
    PRIMARY KEY (hash, origin_url, page_url)
);

CREATE INDEX IF NOT EXISTS idx_asset_refs_origin ON asset_refs(origin_url);

-- Per-URL failures with their reason codes
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    url TEXT NOT NULL,
    reason TEXT NOT NULL,
    detail TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_session ON failures(session_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["sessions", "pages", "page_links", "assets", "asset_refs", "failures"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }

        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
