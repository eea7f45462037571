use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Query parameters dropped from every URL unless a config overrides the list
pub const DEFAULT_QUERY_DENY: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Main configuration structure for Sitedown
///
/// Only `[crawler].seeds` is required; every other key has a default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub user_agent: UserAgentConfig,
    pub scope: ScopeConfig,
    pub fetch: FetchConfig,
    pub robots: RobotsConfig,
    pub auth: AuthConfig,
    pub render: RenderConfig,
    pub extract: ExtractConfig,
    pub markdown: MarkdownConfig,
    pub assets: AssetsConfig,
    pub output: OutputConfig,
    pub incremental: IncrementalConfig,
}

impl Config {
    /// Creates a configuration with default settings for the given seeds
    pub fn with_seeds<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::default();
        config.crawler.seeds = seeds.into_iter().map(Into::into).collect();
        config
    }

    /// Path of the SQLite manifest, defaulting to a file inside the output root
    pub fn manifest_path(&self) -> PathBuf {
        self.output
            .manifest_path
            .clone()
            .unwrap_or_else(|| self.output.directory.join(".sitedown-manifest.db"))
    }
}

/// Crawl frontier and worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Seed URLs the crawl starts from
    pub seeds: Vec<String>,

    /// Maximum link depth from a seed
    pub max_depth: u32,

    /// Maximum number of distinct URLs accepted into the frontier
    pub max_pages: u32,

    /// Number of concurrent workers
    pub concurrency: u32,

    /// Maximum simultaneous requests to one registrable domain
    pub per_host_concurrency: u32,

    /// Whether sitemap.xml files are consulted before link discovery
    pub use_sitemaps: bool,

    /// How locale-prefixed and canonicalized variants are treated
    pub locale_policy: LocalePolicyKind,

    /// Locales kept under the `restrict` policy (e.g. "en", "en-us")
    pub locales: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: 5,
            max_pages: 1000,
            concurrency: 8,
            per_host_concurrency: 4,
            use_sitemaps: true,
            locale_policy: LocalePolicyKind::Distinct,
            locales: Vec::new(),
        }
    }
}

/// Locale and canonical variant policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalePolicyKind {
    /// Every locale-prefixed path is its own page
    Distinct,
    /// Pages declaring a different in-scope canonical URL are exported only under the canonical
    Canonical,
    /// Locale-prefixed paths outside `locales` are out of scope
    Restrict,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    pub contact_email: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "sitedown".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            contact_email: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `Name/Version (+ContactURL; ContactEmail)`, with the comment
    /// omitted when no contact details are configured.
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = self
            .contact_url
            .iter()
            .map(|u| format!("+{}", u))
            .chain(self.contact_email.iter().cloned())
            .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}

/// Crawl scope configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScopeConfig {
    /// Accept any host under the seed's registrable domain
    pub allow_subdomains: bool,

    /// Regular expressions; when non-empty a URL must match one of them
    pub include: Vec<String>,

    /// Regular expressions; a matching URL is rejected
    pub exclude: Vec<String>,

    /// Query parameters to keep; empty keeps everything not denied
    pub query_allow: Vec<String>,

    /// Query parameters always dropped (`utm_*` is always dropped too)
    pub query_deny: Vec<String>,

    /// Fold path case when computing URL identity
    pub case_insensitive_paths: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            allow_subdomains: false,
            include: Vec::new(),
            exclude: Vec::new(),
            query_allow: Vec::new(),
            query_deny: DEFAULT_QUERY_DENY.iter().map(|s| s.to_string()).collect(),
            case_insensitive_paths: true,
        }
    }
}

/// HTTP fetch behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Base of the exponential backoff in milliseconds
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff in milliseconds
    pub backoff_max_ms: u64,

    /// Maximum random delay added before each request in milliseconds
    pub jitter_ms: u64,

    /// Upper bound for an honored Retry-After header in seconds
    pub retry_after_cap_secs: u64,

    /// Maximum redirect hops per request
    pub max_redirects: u32,

    /// Minimum delay between requests to the same registrable domain
    pub min_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            connect_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            jitter_ms: 250,
            retry_after_cap_secs: 60,
            max_redirects: 10,
            min_delay_ms: 0,
        }
    }
}

/// robots.txt handling
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RobotsConfig {
    /// Deny everything on a domain whose robots.txt could not be retrieved
    pub fail_closed: bool,

    /// Explicit override that disables robots.txt enforcement entirely
    pub ignore_robots: bool,
}

/// Credential sources
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuthConfig {
    /// Netscape cookie jar or JSON domain -> name -> value map
    pub cookies_file: Option<PathBuf>,

    /// Flat JSON header map
    pub headers_file: Option<PathBuf>,

    /// Browser storage-state JSON produced by an interactive login
    pub session_file: Option<PathBuf>,

    /// Per-host credential overrides
    #[serde(rename = "host")]
    pub hosts: Vec<HostAuthConfig>,
}

/// Credential override for hosts matching a domain pattern
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostAuthConfig {
    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub pattern: String,
    pub cookies_file: Option<PathBuf>,
    pub headers_file: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
}

/// Script-executing renderer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RenderConfig {
    /// Render pages whose static HTML looks script-driven
    pub enabled: bool,

    /// CSS selector whose appearance satisfies the wait policy
    pub wait_selector: Option<String>,

    /// Quiet period with no DOM changes that counts as network idle
    pub network_idle_ms: u64,

    /// Upper bound for one render in milliseconds
    pub timeout_ms: u64,

    /// Static pages with less visible text than this are rendered
    pub min_static_text: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wait_selector: None,
            network_idle_ms: 500,
            timeout_ms: 15_000,
            min_static_text: 200,
        }
    }
}

/// Content extraction thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractConfig {
    /// Text length below which a strategy's result counts as near-empty
    pub min_text_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { min_text_chars: 50 }
    }
}

/// Markdown output options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MarkdownConfig {
    /// Prepend a YAML front matter block
    pub front_matter: bool,

    /// Generate a table of contents from headings
    pub toc: bool,

    /// Tags added to every document's front matter
    pub tags: Vec<String>,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            front_matter: true,
            toc: true,
            tags: Vec::new(),
        }
    }
}

/// Asset download configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AssetsConfig {
    /// Download referenced images
    pub download: bool,

    /// Assets smaller than this are treated as tracking pixels and skipped
    pub min_bytes: u64,

    /// Folder under the output root holding content-addressed assets
    pub folder: String,

    /// Also download linked documents (pdf, office files, archives)
    pub include_documents: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            download: false,
            min_bytes: 1024,
            folder: "assets".to_string(),
            include_documents: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory of the exported tree
    pub directory: PathBuf,

    /// Path to the SQLite manifest; defaults to a file inside `directory`
    pub manifest_path: Option<PathBuf>,

    /// Session index file name, relative to `directory`
    pub index_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./export"),
            manifest_path: None,
            index_file: "SUMMARY.md".to_string(),
        }
    }
}

/// Incremental re-crawl behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IncrementalConfig {
    /// Send stored validators as conditional request headers
    pub enabled: bool,

    /// Ignore stored validators and fetch everything unconditionally
    pub force_refetch: bool,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force_refetch: false,
        }
    }
}
