//! Link discovery
//!
//! Links are discovered over the whole document, navigation included, since
//! menus and sidebars are how most sites expose their pages. Conversion later
//! rewrites only the links inside the extracted content.

use crate::extract::document_base;
use scraper::{Html, Selector};
use url::Url;

/// Links found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLinks {
    /// Base used to resolve relative references (`<base href>` or the page URL)
    pub base: Url,

    /// Absolute http(s) URLs, in document order, without duplicates
    pub links: Vec<String>,
}

/// Extracts followable links from an HTML document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href>` and `<area href>` anywhere in the document
/// - `<link rel="canonical">`, `<link rel="next">` and `<link rel="prev">`
///
/// **Exclude:**
/// - `<a href download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` references
/// - Fragment-only references
///
/// `rel="nofollow"` links are followed; they only hint at search ranking.
///
/// # Arguments
///
/// * `html` - The HTML content
/// * `page_url` - URL the document was served from
///
/// # Example
///
/// ```
/// use sitedown::crawler::discover_links;
/// use url::Url;
///
/// let html = r#"<html><body><a href="/page">Link</a></body></html>"#;
/// let page = Url::parse("https://example.com/").unwrap();
/// let found = discover_links(html, &page);
/// assert_eq!(found.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn discover_links(html: &str, page_url: &Url) -> DiscoveredLinks {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);
    let mut links: Vec<String> = Vec::new();

    let mut push = |href: &str| {
        if let Some(url) = resolve_link(href, &base) {
            if !links.contains(&url) {
                links.push(url);
            }
        }
    };

    if let Ok(selector) = Selector::parse("a[href], area[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(selector) = Selector::parse("link[href]") {
        for element in document.select(&selector) {
            let rel = element.value().attr("rel").unwrap_or_default().to_ascii_lowercase();
            if rel
                .split_whitespace()
                .any(|r| matches!(r, "canonical" | "next" | "prev"))
            {
                if let Some(href) = element.value().attr("href") {
                    push(href);
                }
            }
        }
    }

    DiscoveredLinks { base, links }
}

/// Resolves a reference to an absolute http(s) URL
///
/// Returns None for references that never lead to a page:
/// - `javascript:`, `mailto:`, `tel:` and `data:` schemes
/// - Fragment-only references (same page anchors)
/// - Unparseable references
pub fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/docs/page").unwrap()
    }

    fn links(html: &str) -> Vec<String> {
        discover_links(html, &base_url()).links
    }

    #[test]
    fn test_absolute_and_relative_links() {
        let html = r#"<body>
            <a href="https://other.com/page">A</a>
            <a href="/root">B</a>
            <a href="sibling">C</a>
            <a href="../up">D</a>
        </body>"#;
        assert_eq!(
            links(html),
            vec![
                "https://other.com/page",
                "https://example.com/root",
                "https://example.com/docs/sibling",
                "https://example.com/up",
            ]
        );
    }

    #[test]
    fn test_navigation_links_are_discovered() {
        let html = r#"<body><nav><a href="/guide">Guide</a></nav><main>text</main></body>"#;
        assert_eq!(links(html), vec!["https://example.com/guide"]);
    }

    #[test]
    fn test_special_schemes_skipped() {
        let html = r##"<body>
            <a href="javascript:void(0)">x</a>
            <a href="JavaScript:alert(1)">x</a>
            <a href="mailto:test@example.com">x</a>
            <a href="tel:+1234567890">x</a>
            <a href="data:text/html,hi">x</a>
            <a href="#section">x</a>
            <a href="ftp://example.com/file">x</a>
        </body>"##;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_download_links_skipped() {
        let html = r#"<body><a href="/file.pdf" download>Download</a></body>"#;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_nofollow_followed() {
        let html = r#"<body><a href="/page" rel="nofollow">Link</a></body>"#;
        assert_eq!(links(html), vec!["https://example.com/page"]);
    }

    #[test]
    fn test_duplicates_collapsed() {
        let html = r#"<body><a href="/a">1</a><a href="/a">2</a><a href="/b">3</a></body>"#;
        assert_eq!(links(html).len(), 2);
    }

    #[test]
    fn test_link_relations() {
        let html = r#"<head>
            <link rel="canonical" href="https://example.com/canonical">
            <link rel="next" href="/docs/page-2">
            <link rel="stylesheet" href="/style.css">
        </head><body></body>"#;
        assert_eq!(
            links(html),
            vec!["https://example.com/canonical", "https://example.com/docs/page-2"]
        );
    }

    #[test]
    fn test_base_href_respected() {
        let html = r#"<head><base href="https://example.com/v2/"></head>
            <body><a href="intro">Intro</a></body>"#;
        let found = discover_links(html, &base_url());
        assert_eq!(found.base.as_str(), "https://example.com/v2/");
        assert_eq!(found.links, vec!["https://example.com/v2/intro"]);
    }
}
