//! URL to output path mapping
//!
//! Every exported page gets a `.md` path under the output root that mirrors its
//! URL path. Paths are assigned once and then reused: the manifest remembers
//! what earlier sessions chose, and the planner remembers what this session has
//! handed out.

use crate::storage::{ManifestStore, StorageResult};
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use url::Url;

/// Segments longer than this are truncated with a hash suffix
const MAX_SEGMENT_LEN: usize = 100;

/// Numbered suffixes tried before falling back to a hash suffix
const MAX_NUMBERED_SUFFIX: u32 = 99;

/// Extensions dropped from the last path segment
const STRIPPED_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx"];

/// Assigns collision-free output paths to URLs
#[derive(Debug)]
pub struct PathPlanner {
    primary_host: String,
    index_file: String,
    assets_folder: String,
    /// Lowercased path -> owning canonical URL
    claimed: HashMap<String, String>,
    /// Canonical URL -> assigned path
    assigned: HashMap<String, String>,
}

impl PathPlanner {
    /// Creates a planner
    ///
    /// # Arguments
    ///
    /// * `primary_host` - Host (with non-default port) exported at the root
    /// * `index_file` - Session index file name, reserved
    /// * `assets_folder` - Asset folder name, reserved
    pub fn new(primary_host: &str, index_file: &str, assets_folder: &str) -> Self {
        Self {
            primary_host: primary_host.to_ascii_lowercase(),
            index_file: index_file.to_string(),
            assets_folder: assets_folder.trim_matches('/').to_string(),
            claimed: HashMap::new(),
            assigned: HashMap::new(),
        }
    }

    /// Maps a URL to its preferred path, ignoring collisions
    ///
    /// # Examples
    ///
    /// ```
    /// use sitedown::output::PathPlanner;
    /// use url::Url;
    ///
    /// let planner = PathPlanner::new("docs.example.com", "SUMMARY.md", "assets");
    /// let url = Url::parse("https://docs.example.com/guide/setup.html").unwrap();
    /// assert_eq!(planner.url_to_relative_path(&url), "guide/setup.md");
    /// ```
    pub fn url_to_relative_path(&self, url: &Url) -> String {
        let mut parts: Vec<String> = Vec::new();

        let host = host_key(url);
        if host != self.primary_host {
            parts.push(sanitize_segment(&host.replace(':', "_")));
        }

        let mut segments: Vec<String> = url
            .path_segments()
            .map(|s| {
                s.map(|seg| sanitize_segment(&percent_decode_str(seg).decode_utf8_lossy()))
                    .filter(|seg| !seg.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut stem = segments.pop().unwrap_or_else(|| "index".to_string());
        if let Some((base, ext)) = stem.rsplit_once('.') {
            if !base.is_empty() && STRIPPED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                stem = base.to_string();
            }
        }

        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            let query = sanitize_segment(&percent_decode_str(query).decode_utf8_lossy().replace(['=', '&'], "-"));
            if !query.is_empty() {
                stem = format!("{}_{}", stem, query);
            }
        }

        segments.push(stem);
        parts.extend(segments.into_iter().map(|seg| truncate_segment(&seg)));

        let mut path = parts.join("/");
        if self.is_reserved_dir(&path) {
            path = format!("_{}", path);
        }
        format!("{}.md", path)
    }

    /// Returns the path for a URL, assigning and claiming one if needed
    ///
    /// A path recorded in the manifest by an earlier session is reused.
    /// Otherwise the preferred path is tried, then `-1` ... `-99` suffixes,
    /// then a truncated stem with a hash of the URL.
    pub fn assign(
        &mut self,
        key: &str,
        url: &Url,
        store: &dyn ManifestStore,
    ) -> StorageResult<String> {
        if let Some(path) = self.assigned.get(key) {
            return Ok(path.clone());
        }

        if let Some(entry) = store.entry(key)? {
            self.claim(key, &entry.file_path);
            return Ok(entry.file_path);
        }

        let preferred = self.url_to_relative_path(url);
        let stem = preferred.trim_end_matches(".md").to_string();

        let mut candidates = std::iter::once(preferred)
            .chain((1..=MAX_NUMBERED_SUFFIX).map(|n| format!("{}-{}.md", stem, n)));

        let chosen = loop {
            match candidates.next() {
                Some(candidate) => {
                    if self.is_free(&candidate, key, store)? {
                        break candidate;
                    }
                }
                None => {
                    let short: String = stem.chars().take(50).collect();
                    break format!("{}-{}.md", short, short_hash(key));
                }
            }
        };

        self.claim(key, &chosen);
        Ok(chosen)
    }

    /// Path already assigned to a URL in this session
    pub fn assigned(&self, key: &str) -> Option<&str> {
        self.assigned.get(key).map(String::as_str)
    }

    fn claim(&mut self, key: &str, path: &str) {
        self.claimed.insert(path.to_lowercase(), key.to_string());
        self.assigned.insert(key.to_string(), path.to_string());
    }

    fn is_free(&self, path: &str, key: &str, store: &dyn ManifestStore) -> StorageResult<bool> {
        if path.eq_ignore_ascii_case(&self.index_file) || path.eq_ignore_ascii_case("session.json") {
            return Ok(false);
        }
        if let Some(owner) = self.claimed.get(&path.to_lowercase()) {
            return Ok(owner == key);
        }
        Ok(store.path_owner(path)?.map_or(true, |owner| owner == key))
    }

    fn is_reserved_dir(&self, path: &str) -> bool {
        let first = path.split('/').next().unwrap_or_default();
        path.contains('/') && first.eq_ignore_ascii_case(&self.assets_folder)
    }
}

/// Host with a non-default port, lowercased
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// Replaces characters that are unsafe in file names
///
/// `<>:"/\|?*` and control characters become `_`, runs of `_` collapse, and
/// leading or trailing `.` and `_` are trimmed.
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        let c = if c.is_control() || "<>:\"/\\|?*".contains(c) {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn truncate_segment(segment: &str) -> String {
    if segment.chars().count() <= MAX_SEGMENT_LEN {
        return segment.to_string();
    }
    let head: String = segment.chars().take(MAX_SEGMENT_LEN - 9).collect();
    format!("{}-{}", head, short_hash(segment))
}

fn short_hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))[..8].to_string()
}

/// Relative link from one output file to another
///
/// Both arguments are `/`-separated paths relative to the output root.
/// Spaces are percent-encoded so the link survives Markdown parsing.
pub fn relative_link(from_file: &str, to_file: &str) -> String {
    let from_dirs: Vec<&str> = from_file.split('/').collect();
    let from_dirs = &from_dirs[..from_dirs.len().saturating_sub(1)];
    let to_parts: Vec<&str> = to_file.split('/').collect();

    let common = from_dirs
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(to_parts.len().saturating_sub(1));

    let mut link: Vec<&str> = std::iter::repeat("..")
        .take(from_dirs.len() - common)
        .collect();
    link.extend(&to_parts[common..]);
    link.join("/").replace(' ', "%20")
}
