//! Link and asset reference handling for conversion

use crate::url::is_document;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Maps URLs found in the content to paths in the output tree
///
/// Paths are relative to the document being converted. Returning None keeps the
/// reference absolute.
pub trait LinkResolver {
    /// Output path of an in-scope page
    fn resolve_page(&mut self, url: &Url) -> Option<String>;

    /// Output path of an acquired asset
    fn resolve_asset(&self, url: &Url) -> Option<String>;
}

/// Resolver that keeps every reference absolute
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsoluteLinks;

impl LinkResolver for AbsoluteLinks {
    fn resolve_page(&mut self, _url: &Url) -> Option<String> {
        None
    }

    fn resolve_asset(&self, _url: &Url) -> Option<String> {
        None
    }
}

/// Source URL of an image, preferring a lazy-load attribute over a `data:` placeholder
pub fn image_source(img: &ElementRef<'_>, base: &Url) -> Option<Url> {
    let el = img.value();
    let src = el
        .attr("src")
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with("data:"))
        .or_else(|| el.attr("data-src").map(str::trim))
        .filter(|s| !s.is_empty() && !s.starts_with("data:"))?;

    base.join(src)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Collects the asset URLs referenced by extracted content
///
/// Images are always collected. Links to documents (pdf, office files,
/// archives) are collected only when `include_documents` is set; otherwise they
/// stay external links.
///
/// # Arguments
///
/// * `main_html` - Extracted content HTML
/// * `base` - Base for resolving relative references
/// * `include_documents` - Also collect linked documents
pub fn collect_asset_urls(main_html: &str, base: &Url, include_documents: bool) -> Vec<Url> {
    let fragment = Html::parse_fragment(main_html);
    let mut urls: Vec<Url> = Vec::new();

    let mut push = |url: Url| {
        if !urls.contains(&url) {
            urls.push(url);
        }
    };

    if let Ok(selector) = Selector::parse("img") {
        for img in fragment.select(&selector) {
            if let Some(url) = image_source(&img, base) {
                push(url);
            }
        }
    }

    if include_documents {
        if let Ok(selector) = Selector::parse("a[href]") {
            for link in fragment.select(&selector) {
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                if let Ok(url) = base.join(href.trim()) {
                    if matches!(url.scheme(), "http" | "https") && is_document(&url) {
                        push(url);
                    }
                }
            }
        }
    }

    urls
}

/// Same document, ignoring the fragment
pub fn same_document(a: &Url, b: &Url) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

/// Makes a link destination safe to embed in `[text](dest)`
pub fn escape_destination(dest: &str) -> String {
    dest.replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
}
