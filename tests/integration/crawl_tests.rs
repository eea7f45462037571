//! Integration tests for export sessions
//!
//! These tests use wiremock to create mock HTTP servers and run full
//! sessions end-to-end against a temporary output root.

use sitedown::config::{Config, LocalePolicyKind};
use sitedown::crawler::{Outcome, Phase, ProgressEvent, TerminationReason};
use sitedown::{start_session, SessionSummary};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for a session seeded at the server root
fn create_test_config(server: &MockServer, out: &Path) -> Config {
    let mut config = Config::with_seeds([format!("{}/", server.uri())]);
    config.output.directory = out.to_path_buf();
    config.crawler.use_sitemaps = false;
    config.crawler.concurrency = 4;
    config.fetch.max_retries = 0;
    config.fetch.jitter_ms = 0;
    config.fetch.timeout_secs = 5;
    config.fetch.backoff_base_ms = 10;
    config.fetch.backoff_max_ms = 10;
    config
}

/// A page whose main content is long enough to be extracted
fn page(title: &str, body: &str) -> String {
    format!(
        r#"<html lang="en"><head><title>{title}</title></head><body>
        <nav><a href="/">Home</a></nav>
        <main>
            <h1>{title}</h1>
            <p>This page explains {title} in enough words to count as real content for the export.</p>
            {body}
        </main>
        <footer>Copyright</footer>
        </body></html>"#
    )
}

async fn serve(server: &MockServer, p: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn serve_guide(server: &MockServer) {
    serve(
        server,
        "/",
        page(
            "Home",
            r#"<p>Start with the <a href="/guide/intro">introduction</a> or jump to <a href="/guide/setup">setup</a>.</p>"#,
        ),
    )
    .await;
    serve(server, "/guide/intro", page("Intro", "<p>Read this first.</p>")).await;
    serve(server, "/guide/setup", page("Setup", "<p>Install the tool.</p>")).await;
}

async fn run(config: Config) -> SessionSummary {
    start_session(config)
        .expect("session should start")
        .wait()
        .await
        .expect("session should finish")
}

async fn run_with_events(config: Config) -> (SessionSummary, Vec<ProgressEvent>) {
    let mut handle = start_session(config).expect("session should start");
    let mut events = handle.events();
    let summary = handle.wait().await.expect("session should finish");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    (summary, seen)
}

fn read(root: &Path, file: &str) -> String {
    std::fs::read_to_string(root.join(file))
        .unwrap_or_else(|e| panic!("missing {}: {}", file, e))
}

#[tokio::test]
async fn test_export_site_tree() {
    let server = MockServer::start().await;
    serve_guide(&server).await;
    let out = TempDir::new().unwrap();

    let summary = run(create_test_config(&server, out.path())).await;

    assert_eq!(summary.termination, TerminationReason::Completed);
    assert_eq!(summary.counters.exported, 3);
    assert_eq!(summary.counters.failed, 0);
    assert_eq!(summary.pages.len(), 3);

    let home = read(out.path(), "index.md");
    assert!(home.starts_with("---\n"));
    assert!(home.contains("title: Home"));
    assert!(home.contains("[introduction](guide/intro.md)"));
    assert!(home.contains("[setup](guide/setup.md)"));
    assert!(!home.contains("Copyright"));

    let intro = read(out.path(), "guide/intro.md");
    assert!(intro.contains("# Intro"));
    assert!(intro.contains("Read this first."));

    let index = read(out.path(), "SUMMARY.md");
    assert!(index.contains("[guide/intro.md](guide/intro.md)"));
    assert!(out.path().join("session.json").is_file());
}

#[tokio::test]
async fn test_rerun_with_not_modified_rewrites_nothing() {
    let server = MockServer::start().await;
    for p in ["/", "/guide/intro", "/guide/setup"] {
        Mock::given(method("GET"))
            .and(path(p))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304).insert_header("etag", "\"v1\""))
            .with_priority(1)
            .mount(&server)
            .await;
    }
    let home = page("Home", r#"<p><a href="/guide/intro">Intro</a> and <a href="/guide/setup">Setup</a></p>"#);
    for (p, html) in [
        ("/", home),
        ("/guide/intro", page("Intro", "")),
        ("/guide/setup", page("Setup", "")),
    ] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html)
                    .insert_header("content-type", "text/html")
                    .insert_header("etag", "\"v1\""),
            )
            .mount(&server)
            .await;
    }
    let out = TempDir::new().unwrap();

    let first = run(create_test_config(&server, out.path())).await;
    assert_eq!(first.counters.exported, 3);
    let before = read(out.path(), "guide/intro.md");

    let second = run(create_test_config(&server, out.path())).await;
    assert_eq!(second.counters.exported, 0);
    assert_eq!(second.counters.not_modified, 3);
    assert_eq!(read(out.path(), "guide/intro.md"), before);
    assert!(second.pages.iter().all(|p| p.status == "not_modified"));
}

#[tokio::test]
async fn test_identical_output_is_not_rewritten() {
    let server = MockServer::start().await;
    serve_guide(&server).await;
    let out = TempDir::new().unwrap();

    run(create_test_config(&server, out.path())).await;
    let before = read(out.path(), "guide/setup.md");

    let second = run(create_test_config(&server, out.path())).await;
    assert_eq!(second.counters.exported, 0);
    assert_eq!(second.counters.unchanged, 3);
    // fetched_at would differ if the file had been rewritten
    assert_eq!(read(out.path(), "guide/setup.md"), before);
}

#[tokio::test]
async fn test_force_refetch_still_skips_identical_output() {
    let server = MockServer::start().await;
    serve_guide(&server).await;
    let out = TempDir::new().unwrap();

    run(create_test_config(&server, out.path())).await;

    let mut config = create_test_config(&server, out.path());
    config.incremental.force_refetch = true;
    let second = run(config).await;
    assert_eq!(second.counters.fetched, 3);
    assert_eq!(second.counters.unchanged, 3);
}

#[tokio::test]
async fn test_robots_disallow_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(&server)
        .await;
    serve(
        &server,
        "/",
        page("Home", r#"<p><a href="/private/notes">Notes</a> <a href="/public">Public</a></p>"#),
    )
    .await;
    serve(&server, "/public", page("Public", "")).await;
    Mock::given(method("GET"))
        .and(path("/private/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page("Secret", "")))
        .expect(0)
        .mount(&server)
        .await;
    let out = TempDir::new().unwrap();

    let summary = run(create_test_config(&server, out.path())).await;

    assert_eq!(summary.counters.exported, 2);
    assert_eq!(summary.counters.robots_denied, 1);
    assert_eq!(summary.counters.failed, 0);
    assert!(!out.path().join("private/notes.md").exists());
    assert!(summary
        .failures
        .iter()
        .any(|f| f.url.ends_with("/private/notes") && f.reason == "robots_denied"));
}

#[tokio::test]
async fn test_redirect_loop_fails_only_that_url() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        page("Home", r#"<p><a href="/loop-a">Loop</a> <a href="/ok">Fine</a></p>"#),
    )
    .await;
    serve(&server, "/ok", page("Fine", "")).await;
    Mock::given(method("GET"))
        .and(path("/loop-a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop-b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loop-b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop-a"))
        .mount(&server)
        .await;
    let out = TempDir::new().unwrap();

    let summary = run(create_test_config(&server, out.path())).await;

    assert_eq!(summary.termination, TerminationReason::Completed);
    assert_eq!(summary.counters.exported, 2);
    assert_eq!(summary.counters.failed, 1);
    let failure = summary
        .failures
        .iter()
        .find(|f| f.url.ends_with("/loop-a"))
        .expect("loop should be recorded");
    assert_eq!(failure.reason, "redirect_loop");
    assert!(!out.path().join("loop-a.md").exists());
}

#[tokio::test]
async fn test_missing_page_is_isolated() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        page("Home", r#"<p><a href="/gone">Gone</a> <a href="/here">Here</a></p>"#),
    )
    .await;
    serve(&server, "/here", page("Here", "")).await;
    let out = TempDir::new().unwrap();

    let summary = run(create_test_config(&server, out.path())).await;

    assert_eq!(summary.counters.exported, 2);
    assert!(summary
        .failures
        .iter()
        .any(|f| f.url.ends_with("/gone") && f.reason == "http_status:404"));
    assert!(!out.path().join("gone.md").exists());
}

#[tokio::test]
async fn test_per_host_limit_serializes_requests() {
    let server = MockServer::start().await;
    let links: String = (1..=4)
        .map(|n| format!(r#"<a href="/slow/{n}">Page {n}</a> "#))
        .collect();
    serve(&server, "/", page("Home", &format!("<p>{}</p>", links))).await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/slow/\d$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page("Slow", ""))
                .insert_header("content-type", "text/html")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server, out.path());
    config.crawler.concurrency = 8;
    config.crawler.per_host_concurrency = 2;

    let started = Instant::now();
    let summary = run(config).await;

    assert_eq!(summary.counters.exported, 5);
    // Four 200ms pages two at a time take at least two rounds
    assert!(started.elapsed() >= Duration::from_millis(390));
}

#[tokio::test]
async fn test_identical_assets_stored_once() {
    let server = MockServer::start().await;
    let png: Vec<u8> = [0x89, b'P', b'N', b'G'].iter().copied().chain(0..60).collect();
    for p in ["/img/a.png", "/img/b.png"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(png.clone())
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;
    }
    serve(
        &server,
        "/",
        page("Home", r#"<p><img src="/img/a.png" alt="Logo"> <a href="/about">About</a></p>"#),
    )
    .await;
    serve(&server, "/about", page("About", r#"<p><img src="/img/b.png" alt="Copy"></p>"#)).await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server, out.path());
    config.assets.download = true;
    config.assets.min_bytes = 8;
    let summary = run(config).await;

    assert_eq!(summary.counters.assets_stored, 1);
    let stored: Vec<_> = std::fs::read_dir(out.path().join("assets"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with(".png"));

    let home = read(out.path(), "index.md");
    let about = read(out.path(), "about.md");
    assert!(home.contains(&format!("![Logo](assets/{})", stored[0])));
    assert!(about.contains(&format!("![Copy](assets/{})", stored[0])));
}

#[tokio::test]
async fn test_sitemap_entries_fetched_first() {
    let server = MockServer::start().await;
    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>{uri}/intro</loc><lastmod>2024-01-01</lastmod></url>
            <url><loc>{uri}/setup</loc><lastmod>2024-05-01</lastmod></url>
            <url><loc>https://elsewhere.example.org/page</loc></url>
        </urlset>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sitemap)
                .insert_header("content-type", "application/xml"),
        )
        .mount(&server)
        .await;
    serve(&server, "/", page("Home", "")).await;
    serve(&server, "/intro", page("Intro", "")).await;
    serve(&server, "/setup", page("Setup", "")).await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server, out.path());
    config.crawler.use_sitemaps = true;
    config.crawler.concurrency = 1;
    let (summary, events) = run_with_events(config).await;

    assert_eq!(summary.counters.exported, 3);
    assert!(matches!(
        events.first().map(|e| &e.outcome),
        Some(Outcome::Queued(3))
    ));

    let order: Vec<String> = events
        .iter()
        .filter(|e| e.phase == Phase::Fetch)
        .filter_map(|e| e.url.clone())
        .collect();
    assert_eq!(order.len(), 3);
    // Newest sitemap entry first, the seed after the sitemap lane
    assert!(order[0].ends_with("/setup"));
    assert!(order[1].ends_with("/intro"));

    assert!(matches!(
        events.last().map(|e| &e.outcome),
        Some(Outcome::SessionFinished(TerminationReason::Completed))
    ));
}

#[tokio::test]
async fn test_merged_cell_table_kept_as_html() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        page(
            "Home",
            r#"<table>
                <tr><th>Plan</th><th>Price</th></tr>
                <tr><td colspan="2">Contact us for pricing</td></tr>
            </table>
            <table>
                <tr><th>Key</th><th>Value</th></tr>
                <tr><td>depth</td><td>5</td></tr>
            </table>"#,
        ),
    )
    .await;
    let out = TempDir::new().unwrap();

    run(create_test_config(&server, out.path())).await;

    let home = read(out.path(), "index.md");
    assert!(home.contains("<table>"));
    assert!(home.contains("colspan=\"2\""));
    assert!(home.contains("| Key | Value |"));
    assert!(home.contains("| depth | 5 |"));
}

#[tokio::test]
async fn test_canonical_policy_exports_only_canonical() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        page("Home", r#"<p><a href="/en/intro">Intro</a></p>"#),
    )
    .await;
    let localized = page("Intro", "").replace(
        "</title>",
        &format!(r#"</title><link rel="canonical" href="{}/intro">"#, server.uri()),
    );
    serve(&server, "/en/intro", localized).await;
    serve(&server, "/intro", page("Intro", "")).await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server, out.path());
    config.crawler.locale_policy = LocalePolicyKind::Canonical;
    let summary = run(config).await;

    assert_eq!(summary.counters.aliased, 1);
    assert!(out.path().join("intro.md").is_file());
    assert!(!out.path().join("en/intro.md").exists());
}

#[tokio::test]
async fn test_page_budget_stops_session() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        page("Home", r#"<p><a href="/a">A</a> <a href="/b">B</a> <a href="/c">C</a></p>"#),
    )
    .await;
    for p in ["/a", "/b", "/c"] {
        serve(&server, p, page("Child", "")).await;
    }
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server, out.path());
    config.crawler.max_pages = 2;
    let summary = run(config).await;

    assert_eq!(summary.termination, TerminationReason::PageBudgetReached);
    assert_eq!(summary.counters.exported, 2);
    assert_eq!(summary.counters.discovered, 2);
}

#[tokio::test]
async fn test_cancelled_session_reports_cancellation() {
    let server = MockServer::start().await;
    serve_guide(&server).await;
    let out = TempDir::new().unwrap();

    let handle = start_session(create_test_config(&server, out.path())).unwrap();
    sitedown::cancel(&handle);
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.termination, TerminationReason::Cancelled);
    assert_eq!(summary.counters.exported, 0);
    assert!(out.path().join("SUMMARY.md").is_file());
}

#[tokio::test]
async fn test_unwritable_output_root_fails_to_start() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "x").unwrap();

    let result = start_session(create_test_config(&server, &blocker.join("out")));
    assert!(matches!(
        result,
        Err(sitedown::SitedownError::OutputRootUnwritable { .. })
    ));
}
