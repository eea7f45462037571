//! Main-content extraction
//!
//! Separates the primary content of a page from site chrome. The pipeline is:
//!
//! 1. Read document metadata (title, description, canonical, locale, keywords)
//! 2. Strip boilerplate: scripts, styles, navigation, footers, banners, cookie
//!    notices and share widgets
//! 3. Try each [`Strategy`] in order until one yields enough text
//!
//! Extraction never fetches anything; it works on the HTML it is given.

mod metadata;
mod strategy;

pub use metadata::{collapse_whitespace, normalize_locale, read_metadata, PageMetadata};
pub use strategy::{text_len, Strategy};

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// Title used when a page has none
pub const UNTITLED: &str = "Untitled";

/// Longest description derived from the page text
const MAX_DERIVED_DESCRIPTION: usize = 200;

/// Paragraphs shorter than this are not used as a description
const MIN_DESCRIPTION_PARAGRAPH: usize = 20;

/// Elements removed wherever they appear
const ALWAYS_REMOVED: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "nav", "footer", "aside", "button",
    "svg", "dialog", "select", "input", "textarea",
];

/// Landmark roles that mark site chrome
const BOILERPLATE_ROLES: &[&str] = &[
    "navigation",
    "banner",
    "complementary",
    "contentinfo",
    "search",
    "dialog",
    "alertdialog",
];

/// Class or id tokens that mark site chrome
const BOILERPLATE_WORDS: &[&str] = &[
    "nav",
    "navbar",
    "navigation",
    "menu",
    "sidebar",
    "breadcrumb",
    "breadcrumbs",
    "ad",
    "ads",
    "advert",
    "advertisement",
    "banner",
    "cookie",
    "cookies",
    "consent",
    "share",
    "sharing",
    "social",
    "popup",
    "modal",
    "newsletter",
    "skip",
];

/// Forms with more text than this wrap the page rather than being a widget
const MAX_BOILERPLATE_FORM_TEXT: usize = 500;

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No extractable content in {0}")]
    NoExtractableContent(String),
}

/// The main content of a page and the metadata needed to export it
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// Page title, [`UNTITLED`] if the page has none
    pub title: String,
    pub description: Option<String>,
    pub canonical_url: Option<Url>,
    pub locale: Option<String>,
    pub keywords: Vec<String>,

    /// Base for resolving references inside `main_html`
    pub base: Url,

    /// Inner HTML of the selected content root
    pub main_html: String,

    /// Strategy that produced the content
    pub strategy: Strategy,

    /// Non-whitespace characters of text in the content
    pub text_len: usize,
}

/// Extracts the main content of a page
///
/// # Arguments
///
/// * `html` - Raw or rendered HTML
/// * `page_url` - URL the document was served from
/// * `min_text_chars` - Text below which a strategy result counts as near-empty
///
/// # Returns
///
/// * `Ok(ExtractedContent)` - Content from the first strategy that produced enough text
/// * `Err(ExtractError::NoExtractableContent)` - Even the cleaned body is empty
pub fn extract(
    html: &str,
    page_url: &Url,
    min_text_chars: usize,
) -> Result<ExtractedContent, ExtractError> {
    let mut document = Html::parse_document(html);
    let base = document_base(&document, page_url);
    let metadata = read_metadata(&document, &base);

    strip_boilerplate(&mut document);

    let (strategy, root) = Strategy::ORDER
        .iter()
        .find_map(|strategy| {
            strategy
                .select(&document, min_text_chars)
                .map(|root| (*strategy, root))
        })
        .ok_or_else(|| ExtractError::NoExtractableContent(page_url.to_string()))?;

    tracing::debug!("Extracted {} with {} strategy", page_url, strategy);

    let description = metadata.description.or_else(|| first_paragraph(&root));

    Ok(ExtractedContent {
        title: metadata.title.unwrap_or_else(|| UNTITLED.to_string()),
        description,
        canonical_url: metadata.canonical_url,
        locale: metadata.locale,
        keywords: metadata.keywords,
        base,
        main_html: root.inner_html(),
        strategy,
        text_len: text_len(&root),
    })
}

/// Resolves the document base from `<base href>`, falling back to the page URL
pub fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|base| base.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

/// Detaches boilerplate elements from the document tree
fn strip_boilerplate(document: &mut Html) {
    let Ok(all) = Selector::parse("body *") else {
        return;
    };

    let doomed: Vec<_> = document
        .select(&all)
        .filter(is_boilerplate)
        .map(|el| el.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn is_boilerplate(element: &ElementRef<'_>) -> bool {
    let el = element.value();
    let name = el.name();

    if matches!(name, "html" | "body" | "main" | "article") || holds_main_content(element) {
        return false;
    }

    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }

    if ALWAYS_REMOVED.contains(&name) {
        return true;
    }

    match name {
        "header" => return !inside_content(element),
        "form" => return text_len(element) <= MAX_BOILERPLATE_FORM_TEXT,
        _ => {}
    }

    if el
        .attr("role")
        .map_or(false, |role| BOILERPLATE_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()))
    {
        return true;
    }

    el.classes()
        .chain(el.id())
        .any(|token| has_boilerplate_word(token))
}

/// Splits a class or id into words (`site-nav`, `cookie_banner`) and checks each
fn has_boilerplate_word(token: &str) -> bool {
    token
        .to_ascii_lowercase()
        .split(|c: char| c == '-' || c == '_')
        .any(|word| BOILERPLATE_WORDS.contains(&word))
}

fn holds_main_content(element: &ElementRef<'_>) -> bool {
    Selector::parse("main, article, [role=main]")
        .map(|selector| element.select(&selector).next().is_some())
        .unwrap_or(false)
}

fn inside_content(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "article" | "main"))
}

/// First substantial paragraph of the content, shortened for use as a description
fn first_paragraph(root: &ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("p").ok()?;
    let text = root
        .select(&selector)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .find(|t| t.chars().count() > MIN_DESCRIPTION_PARAGRAPH)?;

    if text.chars().count() <= MAX_DERIVED_DESCRIPTION {
        return Some(text);
    }
    let cut: String = text.chars().take(MAX_DERIVED_DESCRIPTION).collect();
    Some(format!("{}...", cut.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://docs.example.com/guide/intro").unwrap()
    }

    const BODY_TEXT: &str =
        "Sitedown turns a documentation site into plain Markdown files you can read offline.";

    #[test]
    fn test_semantic_extraction_drops_chrome() {
        let html = format!(
            r#"<html><head><title>Intro</title></head><body>
                <header><a href="/">Logo</a></header>
                <nav><a href="/a">A</a><a href="/b">B</a></nav>
                <main><h1>Intro</h1><p>{}</p>
                    <div class="share-buttons">Share on social</div>
                </main>
                <footer>Copyright</footer>
                <script>var x = 1;</script>
            </body></html>"#,
            BODY_TEXT
        );
        let content = extract(&html, &page_url(), 50).unwrap();

        assert_eq!(content.strategy, Strategy::Semantic);
        assert_eq!(content.title, "Intro");
        assert!(content.main_html.contains(BODY_TEXT));
        assert!(!content.main_html.contains("Share on social"));
        assert!(!content.main_html.contains("Logo"));
    }

    #[test]
    fn test_header_inside_article_kept() {
        let html = format!(
            "<body><article><header><h1>Post title</h1></header><p>{}</p></article></body>",
            BODY_TEXT
        );
        let content = extract(&html, &page_url(), 50).unwrap();
        assert!(content.main_html.contains("Post title"));
    }

    #[test]
    fn test_wrapper_with_boilerplate_class_kept() {
        let html = format!(
            r#"<body><div class="page-menu-wrapper"><main><p>{}</p></main></div></body>"#,
            BODY_TEXT
        );
        let content = extract(&html, &page_url(), 50).unwrap();
        assert!(content.main_html.contains(BODY_TEXT));
    }

    #[test]
    fn test_cookie_banner_removed() {
        assert!(has_boilerplate_word("cookie-banner"));
        assert!(has_boilerplate_word("site_nav"));
        assert!(!has_boilerplate_word("navigator"));
        assert!(!has_boilerplate_word("address"));
    }

    #[test]
    fn test_body_fallback_for_bare_page() {
        let content = extract("<html><body>Short note</body></html>", &page_url(), 50).unwrap();
        assert_eq!(content.strategy, Strategy::Body);
        assert_eq!(content.title, UNTITLED);
        assert!(content.main_html.contains("Short note"));
    }

    #[test]
    fn test_empty_page_fails() {
        let err = extract(
            "<html><body><nav><a href='/'>Home</a></nav><script>x()</script></body></html>",
            &page_url(),
            50,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::NoExtractableContent(_)));
    }

    #[test]
    fn test_description_from_first_paragraph() {
        let long = "word ".repeat(80);
        let html = format!("<body><main><p>tiny</p><p>{}</p></main></body>", long);
        let content = extract(&html, &page_url(), 50).unwrap();
        let description = content.description.unwrap();
        assert!(description.ends_with("..."));
        assert!(description.chars().count() <= MAX_DERIVED_DESCRIPTION + 3);
    }

    #[test]
    fn test_meta_description_wins() {
        let html = format!(
            r#"<head><meta name="description" content="From meta"></head><body><main><p>{}</p></main></body>"#,
            BODY_TEXT
        );
        let content = extract(&html, &page_url(), 50).unwrap();
        assert_eq!(content.description.as_deref(), Some("From meta"));
    }

    #[test]
    fn test_base_href_recorded() {
        let html = format!(
            r#"<head><base href="/v2/"></head><body><main><p>{}</p></main></body>"#,
            BODY_TEXT
        );
        let content = extract(&html, &page_url(), 50).unwrap();
        assert_eq!(content.base.as_str(), "https://docs.example.com/v2/");
    }
}
