//! Content-addressed asset storage
//!
//! Referenced media is downloaded once, hashed, and stored as
//! `<folder>/<sha256>.<ext>` under the output root. Identical bytes reached
//! through different URLs share one file. Tiny responses are treated as
//! tracking pixels and skipped.

use crate::crawler::{FetchError, Fetcher};
use crate::output::write_atomic;
use crate::robots::RobotsGate;
use crate::storage::{lock_store, AssetRecord, SharedStore, StorageError};
use crate::url::path_extension;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use url::Url;

/// Extensions kept as-is when the asset URL carries one
const KNOWN_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "avif", "bmp", "pdf", "doc", "docx",
    "xls", "xlsx", "ppt", "pptx", "odt", "epub", "zip", "tar", "gz", "tgz", "rar", "7z",
];

/// Asset acquisition errors
///
/// None of these fail the referencing page; the reference stays absolute.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset disallowed by robots.txt: {0}")]
    RobotsDenied(String),

    #[error("Asset fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Asset manifest error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write asset: {0}")]
    Io(#[from] std::io::Error),
}

/// Where an asset ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Path relative to the output root
    pub path: String,
    pub hash: String,
    /// True if this call wrote the file
    pub newly_stored: bool,
}

/// Downloads, deduplicates and stores assets for one session
pub struct AssetManager {
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsGate>,
    store: SharedStore,
    root: PathBuf,
    folder: String,
    min_bytes: u64,
    /// Origin URL to stored path for this session; None if skipped
    seen: Mutex<HashMap<String, Option<StoredAsset>>>,
}

impl AssetManager {
    /// # Arguments
    ///
    /// * `root` - Output root directory
    /// * `folder` - Asset folder under the root
    /// * `min_bytes` - Assets smaller than this are skipped
    pub fn new(
        fetcher: Arc<Fetcher>,
        robots: Arc<RobotsGate>,
        store: SharedStore,
        root: PathBuf,
        folder: &str,
        min_bytes: u64,
    ) -> Self {
        Self {
            fetcher,
            robots,
            store,
            root,
            folder: folder.trim_matches('/').to_string(),
            min_bytes,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires an asset referenced by a page
    ///
    /// # Process
    ///
    /// 1. Reuse the result of an earlier acquisition in this session
    /// 2. Reuse the stored file an earlier session resolved this URL to
    /// 3. Check robots.txt and download
    /// 4. Skip bodies below the size threshold
    /// 5. Hash; reuse an existing file with that hash or write a new one
    ///
    /// # Returns
    ///
    /// * `Ok(Some(StoredAsset))` - Local copy available
    /// * `Ok(None)` - Skipped as a tracking pixel
    /// * `Err(AssetError)` - Not stored; the caller keeps the absolute URL
    pub async fn acquire(
        &self,
        url: &Url,
        page_url: &str,
    ) -> Result<Option<StoredAsset>, AssetError> {
        let origin = url.as_str();

        if let Some(cached) = self.cached(origin) {
            if let Some(asset) = &cached {
                lock_store(&self.store).add_asset_ref(&asset.hash, origin, page_url)?;
            }
            return Ok(cached.map(|asset| StoredAsset {
                newly_stored: false,
                ..asset
            }));
        }

        let previous = lock_store(&self.store).asset_by_origin(origin)?;
        if let Some(record) = previous {
            if self.root.join(&record.stored_path).is_file() {
                tracing::trace!("Reusing stored asset {} for {}", record.stored_path, origin);
                let asset = StoredAsset {
                    path: record.stored_path,
                    hash: record.hash,
                    newly_stored: false,
                };
                lock_store(&self.store).add_asset_ref(&asset.hash, origin, page_url)?;
                self.remember(origin, Some(asset.clone()));
                return Ok(Some(asset));
            }
        }

        if !self.robots.is_allowed(url).await {
            return Err(AssetError::RobotsDenied(origin.to_string()));
        }

        let response = self.fetcher.fetch_bytes(url).await?;
        if (response.body.len() as u64) < self.min_bytes {
            tracing::debug!(
                "Skipping {} ({} bytes, below {})",
                origin,
                response.body.len(),
                self.min_bytes
            );
            self.remember(origin, None);
            return Ok(None);
        }

        let hash = hex::encode(Sha256::digest(&response.body));
        let asset = {
            let mut store = lock_store(&self.store);
            let asset = match store.asset_by_hash(&hash)? {
                Some(existing) => {
                    let target = self.root.join(&existing.stored_path);
                    let newly_stored = !target.is_file();
                    if newly_stored {
                        write_atomic(&target, &response.body)?;
                    }
                    StoredAsset {
                        path: existing.stored_path,
                        hash: hash.clone(),
                        newly_stored,
                    }
                }
                None => {
                    let extension = asset_extension(url, response.content_type.as_deref());
                    let path = format!("{}/{}.{}", self.folder, hash, extension);
                    write_atomic(&self.root.join(&path), &response.body)?;
                    store.insert_asset(&AssetRecord {
                        hash: hash.clone(),
                        byte_len: response.body.len() as u64,
                        stored_path: path.clone(),
                        content_type: response.content_type.clone(),
                    })?;
                    StoredAsset {
                        path,
                        hash: hash.clone(),
                        newly_stored: true,
                    }
                }
            };
            store.add_asset_ref(&hash, origin, page_url)?;
            asset
        };

        if asset.newly_stored {
            tracing::debug!("Stored asset {} as {}", origin, asset.path);
        }
        self.remember(origin, Some(asset.clone()));
        Ok(Some(asset))
    }

    fn cached(&self, origin: &str) -> Option<Option<StoredAsset>> {
        let seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.get(origin).cloned()
    }

    fn remember(&self, origin: &str, asset: Option<StoredAsset>) {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.insert(origin.to_string(), asset);
    }
}

/// File extension for a stored asset
///
/// Taken from the URL when it carries a known one, else from the content type,
/// else `bin`.
pub fn asset_extension(url: &Url, content_type: Option<&str>) -> String {
    if let Some(ext) = path_extension(url).filter(|e| KNOWN_EXTENSIONS.contains(&e.as_str())) {
        return if ext == "jpeg" { "jpg".to_string() } else { ext };
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/avif" => "avif",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        _ => "bin",
    }
    .to_string()
}
