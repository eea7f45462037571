//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate. Crawl-delay and
//! Sitemap lines are not covered by it and are scanned here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Longest crawl-delay honored, in seconds
const MAX_CRAWL_DELAY_SECS: f64 = 600.0;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Absolute URLs from `Sitemap:` lines
    sitemaps: Vec<String>,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        let sitemaps = directives(content)
            .filter(|(key, _)| key == "sitemap")
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
            .collect();

        Self {
            content: content.to_string(),
            sitemaps,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is absent or, under the default policy, unreachable.
    pub fn allow_all() -> Self {
        Self::from_content("")
    }

    /// Creates a ParsedRobots that denies everything
    ///
    /// Used for unreachable robots.txt when the gate is configured fail-closed.
    pub fn deny_all() -> Self {
        Self::from_content("User-agent: *\nDisallow: /\n")
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check
    /// * `user_agent` - The robots product token (e.g. "sitedown")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group. Consecutive
    /// `User-agent` lines share one group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_open = false;
        let mut specific: Option<f64> = None;
        let mut wildcard: Option<f64> = None;

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    if !group_open {
                        group.clear();
                    }
                    group.push(value.to_lowercase());
                    group_open = true;
                }
                "crawl-delay" => {
                    group_open = false;
                    let Ok(secs) = value.parse::<f64>() else {
                        continue;
                    };
                    if !secs.is_finite() || secs < 0.0 {
                        continue;
                    }
                    if group.iter().any(|g| g != "*" && agent.contains(g.as_str())) {
                        specific = Some(secs);
                    } else if group.iter().any(|g| g == "*") {
                        wildcard = Some(secs);
                    }
                }
                _ => group_open = false,
            }
        }

        specific
            .or(wildcard)
            .map(|secs| Duration::from_secs_f64(secs.min(MAX_CRAWL_DELAY_SECS)))
    }

    /// Sitemap URLs announced by this robots.txt
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Yields `(lowercased key, trimmed value)` pairs, skipping comments
fn directives(content: &str) -> impl Iterator<Item = (String, &str)> {
    content.lines().filter_map(|line| {
        let line = line.split('#').next().unwrap_or("").trim();
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/any/path", "sitedown"));
        assert!(robots.sitemaps().is_empty());
    }

    #[test]
    fn test_deny_all() {
        let robots = ParsedRobots::deny_all();
        assert!(!robots.is_allowed("https://example.com/", "sitedown"));
    }

    #[test]
    fn test_parse_disallow_specific() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("https://example.com/", "sitedown"));
        assert!(robots.is_allowed("https://example.com/page", "sitedown"));
        assert!(!robots.is_allowed("https://example.com/admin", "sitedown"));
        assert!(!robots.is_allowed("https://example.com/admin/users", "sitedown"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let robots =
            ParsedRobots::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed("https://example.com/private", "sitedown"));
        assert!(robots.is_allowed("https://example.com/private/public", "sitedown"));
    }

    #[test]
    fn test_specific_user_agent_group() {
        let robots =
            ParsedRobots::from_content("User-agent: sitedown\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(!robots.is_allowed("https://example.com/page", "sitedown"));
        assert!(robots.is_allowed("https://example.com/page", "otherbot"));
    }

    #[test]
    fn test_garbage_allows() {
        let robots = ParsedRobots::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("https://example.com/any", "sitedown"));
    }

    #[test]
    fn test_crawl_delay_wildcard_and_specific() {
        let robots = ParsedRobots::from_content(
            "User-agent: sitedown\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10",
        );
        assert_eq!(robots.crawl_delay("sitedown"), Some(Duration::from_secs(5)));
        assert_eq!(robots.crawl_delay("otherbot"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_after_rules() {
        let robots =
            ParsedRobots::from_content("User-agent: *\nDisallow: /admin\nCrawl-delay: 2.5");
        assert_eq!(robots.crawl_delay("sitedown"), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let robots = ParsedRobots::from_content("User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3");
        assert_eq!(robots.crawl_delay("bota"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotB"), Some(Duration::from_secs(3)));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_rejects_garbage() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: soon\nCrawl-delay: -4");
        assert_eq!(robots.crawl_delay("sitedown"), None);
    }

    #[test]
    fn test_sitemap_lines() {
        let robots = ParsedRobots::from_content(
            "Sitemap: https://example.com/sitemap.xml # main\nUser-agent: *\nDisallow:\nsitemap: https://example.com/news.xml",
        );
        assert_eq!(
            robots.sitemaps(),
            &[
                "https://example.com/sitemap.xml".to_string(),
                "https://example.com/news.xml".to_string()
            ]
        );
    }
}
