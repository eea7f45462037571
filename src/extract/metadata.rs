use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Document-level metadata read from `<head>` and the root element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical_url: Option<Url>,
    pub locale: Option<String>,
    pub keywords: Vec<String>,
}

/// Reads title, description, canonical link, locale and keywords
///
/// Title falls back from `<title>` to the first `<h1>` to `og:title`.
/// Description falls back from the meta description to `og:description`; the
/// caller may still fill it from the extracted text. Locale falls back from
/// `<html lang>` to the content-language meta to `og:locale`.
pub fn read_metadata(document: &Html, base: &Url) -> PageMetadata {
    let title = first_text(document, "title")
        .or_else(|| first_text(document, "h1"))
        .or_else(|| meta_content(document, "og:title"));

    let description =
        meta_content(document, "description").or_else(|| meta_content(document, "og:description"));

    let canonical_url = select_all(document, "link[href]")
        .into_iter()
        .find(|link| has_rel(link, "canonical"))
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"));

    let locale = select_first(document, "html")
        .and_then(|html| html.value().attr("lang"))
        .map(str::to_string)
        .filter(|l| !l.trim().is_empty())
        .or_else(|| meta_content(document, "content-language"))
        .or_else(|| meta_content(document, "og:locale"))
        .map(|l| normalize_locale(&l));

    let keywords = meta_content(document, "keywords")
        .map(|k| {
            k.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    PageMetadata {
        title,
        description,
        canonical_url,
        locale,
        keywords,
    }
}

/// Lowercases a locale tag and uses `-` as separator (`pt_BR` -> `pt-br`)
pub fn normalize_locale(locale: &str) -> String {
    locale.trim().to_lowercase().replace('_', "-")
}

/// Content of a `<meta>` matched by `name`, `property` or `http-equiv`, case-insensitively
fn meta_content(document: &Html, key: &str) -> Option<String> {
    select_all(document, "meta[content]")
        .into_iter()
        .find(|meta| {
            ["name", "property", "http-equiv"].iter().any(|attr| {
                meta.value()
                    .attr(attr)
                    .map_or(false, |v| v.trim().eq_ignore_ascii_case(key))
            })
        })
        .and_then(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|c| !c.is_empty())
}

fn has_rel(element: &ElementRef<'_>, rel: &str) -> bool {
    element
        .value()
        .attr("rel")
        .map_or(false, |r| r.split_whitespace().any(|r| r.eq_ignore_ascii_case(rel)))
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    select_first(document, selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn select_all<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Collapses runs of whitespace into single spaces and trims
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
