//! Sitemap discovery
//!
//! Elements are matched by local name, so prefixed namespaces (`<sm:url>`)
//! parse like the default one. Only `<loc>` and `<lastmod>` are read.

use crate::crawler::fetcher::Fetcher;
use crate::robots::RobotsGate;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Well-known sitemap locations tried for every seed origin
const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// Deepest level of nested sitemap indexes that is followed
pub const MAX_INDEX_DEPTH: u32 = 3;

/// Upper bound on sitemap files fetched per session
const MAX_SITEMAPS: usize = 100;

/// A page listed in a sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// A parsed sitemap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of further sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page entries
    UrlSet(Vec<SitemapUrl>),
}

/// Parses a sitemap or sitemap index
///
/// # Examples
///
/// ```
/// use sitedown::crawler::{parse_sitemap, SitemapDocument};
///
/// let xml = "<urlset><url><loc>https://example.com/a?x=1&amp;y=2</loc></url></urlset>";
/// match parse_sitemap(xml) {
///     SitemapDocument::UrlSet(urls) => assert_eq!(urls[0].loc, "https://example.com/a?x=1&y=2"),
///     SitemapDocument::Index(_) => unreachable!(),
/// }
/// ```
pub fn parse_sitemap(xml: &str) -> SitemapDocument {
    let mut reader = Reader::from_str(xml);
    let mut is_index = false;
    let mut entries: Vec<SitemapUrl> = Vec::new();
    let mut entry: Option<RawEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"url" | b"sitemap" => entry = Some(RawEntry::default()),
                b"loc" if entry.is_some() => {
                    field = Some(Field::Loc);
                    text.clear();
                }
                b"lastmod" if entry.is_some() => {
                    field = Some(Field::Lastmod);
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) if field.is_some() => {
                if let Ok(chunk) = e.decode() {
                    text.push_str(&chunk);
                }
            }
            Ok(Event::CData(e)) if field.is_some() => {
                if let Ok(chunk) = e.decode() {
                    text.push_str(&chunk);
                }
            }
            Ok(Event::GeneralRef(e)) if field.is_some() => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else if let Some(value) = e
                    .decode()
                    .ok()
                    .and_then(|name| resolve_predefined_entity(&name))
                {
                    text.push_str(value);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" | b"lastmod" => {
                    if let (Some(field), Some(entry)) = (field.take(), entry.as_mut()) {
                        let value = text.trim().to_string();
                        match field {
                            Field::Loc => entry.loc = value,
                            Field::Lastmod => entry.lastmod = value,
                        }
                    }
                }
                b"url" | b"sitemap" => {
                    if let Some(done) = entry.take().filter(|e| !e.loc.is_empty()) {
                        entries.push(SitemapUrl {
                            lastmod: parse_lastmod(&done.lastmod),
                            loc: done.loc,
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    "Malformed sitemap XML at byte {}: {}",
                    reader.error_position(),
                    e
                );
                break;
            }
            Ok(_) => {}
        }
    }

    if is_index {
        SitemapDocument::Index(entries.into_iter().map(|e| e.loc).collect())
    } else {
        SitemapDocument::UrlSet(entries)
    }
}

#[derive(Default)]
struct RawEntry {
    loc: String,
    lastmod: String,
}

enum Field {
    Loc,
    Lastmod,
}

/// Parses a `<lastmod>` value: an RFC 3339 timestamp or a `YYYY-MM-DD` date
pub fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Collects sitemap entries for the seed origins
///
/// Tries the well-known locations and every `Sitemap:` line of each origin's
/// robots.txt, following indexes up to [`MAX_INDEX_DEPTH`]. Fetch and parse
/// failures are logged and skipped.
///
/// # Arguments
///
/// * `fetcher` - Page fetcher (per-host limits and credentials apply)
/// * `robots` - Robots gate, for announced sitemaps
/// * `seeds` - Seed URLs; one set of candidates per distinct origin
///
/// # Returns
///
/// Page entries in discovery order; not yet normalized or scope-filtered
pub async fn discover_sitemaps(
    fetcher: &Fetcher,
    robots: &RobotsGate,
    seeds: &[Url],
) -> Vec<SitemapUrl> {
    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    let mut origins = HashSet::new();

    for seed in seeds {
        let origin = seed.origin().ascii_serialization();
        if !origins.insert(origin.clone()) {
            continue;
        }
        for path in SITEMAP_PATHS {
            queue.push_back((format!("{}{}", origin, path), 0));
        }
        for announced in robots.sitemaps(seed).await {
            queue.push_back((announced, 0));
        }
    }

    let mut processed = HashSet::new();
    let mut entries = Vec::new();

    while let Some((location, depth)) = queue.pop_front() {
        if processed.len() >= MAX_SITEMAPS {
            tracing::warn!("Sitemap limit of {} reached, skipping the rest", MAX_SITEMAPS);
            break;
        }
        if !processed.insert(location.clone()) {
            continue;
        }

        let url = match Url::parse(&location) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping invalid sitemap location {}: {}", location, e);
                continue;
            }
        };

        let xml = match fetcher.fetch_bytes(&url).await {
            Ok(result) => result.text(),
            Err(e) => {
                tracing::debug!("No sitemap at {}: {}", url, e);
                continue;
            }
        };

        match parse_sitemap(&xml) {
            SitemapDocument::Index(children) => {
                if depth >= MAX_INDEX_DEPTH {
                    tracing::warn!("Sitemap index {} nested too deep, not following", url);
                    continue;
                }
                tracing::debug!("Sitemap index {} lists {} sitemap(s)", url, children.len());
                queue.extend(children.into_iter().map(|child| (child, depth + 1)));
            }
            SitemapDocument::UrlSet(urls) => {
                tracing::info!("Sitemap {} lists {} URL(s)", url, urls.len());
                entries.extend(urls);
            }
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://docs.example.com/guide/intro</loc>
    <lastmod>2024-01-01</lastmod>
  </url>
  <url><loc><![CDATA[https://docs.example.com/guide/setup?a=1&b=2]]></loc>
    <lastmod>2024-06-01T12:00:00+02:00</lastmod></url>
  <url>
    <loc>https://docs.example.com/search?q=a&amp;page=2</loc>
  </url>
</urlset>"#;

        let SitemapDocument::UrlSet(urls) = parse_sitemap(xml) else {
            panic!("expected urlset");
        };
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].loc, "https://docs.example.com/guide/intro");
        assert_eq!(urls[0].lastmod, parse_lastmod("2024-01-01T00:00:00Z"));
        assert_eq!(urls[1].loc, "https://docs.example.com/guide/setup?a=1&b=2");
        assert_eq!(urls[1].lastmod, parse_lastmod("2024-06-01T10:00:00Z"));
        assert_eq!(urls[2].loc, "https://docs.example.com/search?q=a&page=2");
        assert_eq!(urls[2].lastmod, None);
    }

    #[test]
    fn test_parse_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/sitemap-docs.xml</loc></sitemap>
  <sitemap>
    <loc>https://example.com/sitemap-blog.xml</loc>
    <lastmod>2024-01-01</lastmod>
  </sitemap>
</sitemapindex>"#;

        assert_eq!(
            parse_sitemap(xml),
            SitemapDocument::Index(vec![
                "https://example.com/sitemap-docs.xml".to_string(),
                "https://example.com/sitemap-blog.xml".to_string(),
            ])
        );
    }

    #[test]
    fn test_numeric_character_references() {
        let xml = "<urlset><url><loc>https://example.com/a?x=1&#38;y=2</loc></url>\
                   <url><loc>https://example.com/b?x=1&#x26;y=2</loc></url></urlset>";
        let SitemapDocument::UrlSet(urls) = parse_sitemap(xml) else {
            panic!("expected urlset");
        };
        assert_eq!(urls[0].loc, "https://example.com/a?x=1&y=2");
        assert_eq!(urls[1].loc, "https://example.com/b?x=1&y=2");
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://example.com/a</sm:loc><sm:lastmod>2024-02-01</sm:lastmod></sm:url>
</sm:urlset>"#;
        assert_eq!(
            parse_sitemap(xml),
            SitemapDocument::UrlSet(vec![SitemapUrl {
                loc: "https://example.com/a".to_string(),
                lastmod: parse_lastmod("2024-02-01"),
            }])
        );

        let index = r#"<s:sitemapindex xmlns:s="http://www.sitemaps.org/schemas/sitemap/0.9">
  <s:sitemap><s:loc>https://example.com/docs.xml</s:loc></s:sitemap>
</s:sitemapindex>"#;
        assert_eq!(
            parse_sitemap(index),
            SitemapDocument::Index(vec!["https://example.com/docs.xml".to_string()])
        );
    }

    #[test]
    fn test_parse_lastmod_formats() {
        assert!(parse_lastmod("2024-03-05").is_some());
        assert!(parse_lastmod("2024-03-05T10:00:00Z").is_some());
        assert!(parse_lastmod("2024-03-05T10:00+01:00").is_some());
        assert!(parse_lastmod("yesterday").is_none());
        assert!(parse_lastmod("2024-03-05").unwrap() < parse_lastmod("2024-03-06").unwrap());
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert_eq!(parse_sitemap("<html>not a sitemap</html>"), SitemapDocument::UrlSet(vec![]));
        assert_eq!(parse_sitemap("<urlset><url><loc>"), SitemapDocument::UrlSet(vec![]));
    }

    mod discovery {
        use super::super::*;
        use crate::auth::AuthContext;
        use crate::config::{FetchConfig, RobotsConfig};
        use crate::crawler::politeness::HostLimiter;
        use reqwest::{redirect::Policy, Client};
        use std::sync::Arc;
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_discover_follows_robots_and_indexes() {
            let server = MockServer::start().await;
            let base = server.uri();

            Mock::given(method("GET"))
                .and(path("/robots.txt"))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    "User-agent: *\nAllow: /\nSitemap: {}/maps/index.xml\n",
                    base
                )))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/maps/index.xml"))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    "<sitemapindex><sitemap><loc>{}/maps/pages.xml</loc></sitemap></sitemapindex>",
                    base
                )))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/maps/pages.xml"))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    "<urlset><url><loc>{0}/a</loc></url><url><loc>{0}/b</loc></url></urlset>",
                    base
                )))
                .mount(&server)
                .await;

            let client = Client::builder().redirect(Policy::none()).build().unwrap();
            let robots = Arc::new(RobotsGate::with_client(
                client.clone(),
                "sitedown",
                &RobotsConfig::default(),
            ));
            let fetcher = Fetcher::new(
                client,
                Arc::new(AuthContext::none()),
                Arc::new(HostLimiter::new(4, Duration::ZERO, 0)),
                robots.clone(),
                &FetchConfig {
                    max_retries: 0,
                    ..Default::default()
                },
            );

            let seed = Url::parse(&format!("{}/", base)).unwrap();
            let entries = discover_sitemaps(&fetcher, &robots, &[seed]).await;
            let locs: Vec<&str> = entries.iter().map(|e| e.loc.as_str()).collect();
            assert_eq!(locs, vec![format!("{}/a", base), format!("{}/b", base)]);
        }
    }
}
