//! HTML to Markdown conversion
//!
//! Converts extracted content into a Markdown document with:
//! - Headings, lists, quotes, fenced code (language hints kept) and tables
//! - Tables with merged cells embedded as raw HTML
//! - In-scope links rewritten to relative output paths, external links absolute
//! - Optional YAML front matter and table of contents

mod front_matter;
mod links;
mod markdown;
mod toc;

pub use front_matter::{merge_tags, FrontMatter};
pub use links::{collect_asset_urls, image_source, AbsoluteLinks, LinkResolver};
pub use markdown::{code_language, tidy, MarkdownWriter};
pub use toc::{render_toc, slugify, Heading, Slugger, TOC_SLUG};

use crate::config::MarkdownConfig;
use crate::extract::ExtractedContent;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Conversion errors
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to serialize front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

/// Conversion settings
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub front_matter: bool,
    pub toc: bool,
    pub tags: Vec<String>,
}

impl From<&MarkdownConfig> for ConvertOptions {
    fn from(config: &MarkdownConfig) -> Self {
        Self {
            front_matter: config.front_matter,
            toc: config.toc,
            tags: config.tags.clone(),
        }
    }
}

/// Where a page came from
#[derive(Debug, Clone)]
pub struct PageSource {
    /// URL the content was served from
    pub url: Url,
    /// Canonical URL the page is exported under
    pub canonical_url: Url,
    pub fetched_at: DateTime<Utc>,
}

/// A converted page
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    pub front_matter: Option<FrontMatter>,
    pub body: String,
    /// Asset URLs rewritten to local copies
    pub referenced_assets: Vec<Url>,
}

impl MarkdownDocument {
    /// Full file content: front matter block followed by the body
    pub fn render(&self) -> Result<String, ConvertError> {
        match &self.front_matter {
            Some(front_matter) => Ok(format!("{}\n{}", front_matter.to_block()?, self.body)),
            None => Ok(self.body.clone()),
        }
    }

    /// Hex SHA-256 over the front matter (without fetch timestamp) and body
    ///
    /// Two fetches of unchanged content hash identically even though their
    /// rendered files differ in `fetched_at`.
    pub fn content_hash(&self) -> Result<String, ConvertError> {
        let mut hasher = Sha256::new();
        if let Some(front_matter) = &self.front_matter {
            hasher.update(front_matter.to_stable_block()?.as_bytes());
        }
        hasher.update(self.body.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Converts extracted content to Markdown
///
/// # Arguments
///
/// * `content` - Output of [`crate::extract::extract`]
/// * `source` - Served and canonical URLs plus the fetch time
/// * `resolver` - Maps in-scope pages and acquired assets to relative paths
/// * `options` - Front matter, table of contents and tag settings
pub fn convert(
    content: &ExtractedContent,
    source: &PageSource,
    resolver: &mut dyn LinkResolver,
    options: &ConvertOptions,
) -> MarkdownDocument {
    let mut writer = MarkdownWriter::new(&source.url, &content.base, resolver);
    if options.toc {
        writer.reserve_slug(TOC_SLUG);
    }

    let mut body = writer.convert(&content.main_html);
    if options.toc {
        if let Some(toc) = render_toc(writer.headings()) {
            body = format!("{}\n{}", toc, body);
        }
    }
    let referenced_assets = writer.into_assets();

    let front_matter = options.front_matter.then(|| FrontMatter {
        source_url: source.url.to_string(),
        canonical_url: source.canonical_url.to_string(),
        title: content.title.clone(),
        description: content.description.clone(),
        fetched_at: FrontMatter::format_timestamp(source.fetched_at),
        tags: merge_tags(&options.tags, &content.keywords),
        locale: content.locale.clone(),
    });

    MarkdownDocument {
        front_matter,
        body,
        referenced_assets,
    }
}
