//! Authentication context
//!
//! Credentials are resolved once per session from the `[auth]` section and
//! never change afterwards. Each level (global, or a per-host override) resolves
//! to exactly one kind of credential.
//!
//! Global headers only travel to the seeds' registrable domains; a host outside
//! them gets headers only through an override that names it. Cookies carry
//! their own domain and are matched per cookie.

mod cookies;
mod session;

pub use cookies::{parse_cookie_file, parse_json_cookies, parse_netscape, Cookie};
pub use session::{parse_session, BrowserSession};

use crate::config::AuthConfig;
use crate::url::{matches_wildcard, registrable_domain_of_host};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::RequestBuilder;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Errors raised while loading credential files
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid cookie file: {0}")]
    CookieJar(String),

    #[error("Invalid header file: {0}")]
    Headers(String),

    #[error("Invalid session file: {0}")]
    Session(String),
}

/// Resolved credentials for one level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    NoAuth,
    Cookies(Vec<Cookie>),
    Headers(Vec<(String, String)>),
    BrowserSession(BrowserSession),
}

impl Credentials {
    /// Loads the single configured source, if any
    fn load(
        cookies_file: Option<&Path>,
        headers_file: Option<&Path>,
        session_file: Option<&Path>,
    ) -> Result<Self, AuthError> {
        if let Some(path) = cookies_file {
            return Ok(Self::Cookies(parse_cookie_file(&read(path)?)?));
        }
        if let Some(path) = headers_file {
            return Ok(Self::Headers(parse_headers(&read(path)?)?));
        }
        if let Some(path) = session_file {
            let session = parse_session(&read(path)?)?;
            check_headers(&session.headers)?;
            return Ok(Self::BrowserSession(session));
        }
        Ok(Self::NoAuth)
    }

    fn cookies(&self) -> &[Cookie] {
        match self {
            Self::Cookies(cookies) => cookies,
            Self::BrowserSession(session) => &session.cookies,
            _ => &[],
        }
    }

    fn headers(&self) -> &[(String, String)] {
        match self {
            Self::Headers(headers) => headers,
            Self::BrowserSession(session) => &session.headers,
            _ => &[],
        }
    }
}

/// Immutable credentials applied to every fetch of a session
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    default: Credentials,
    overrides: Vec<(String, Credentials)>,
    // Empty means unrestricted
    header_domains: HashSet<String>,
}

impl AuthContext {
    /// A context that sends no credentials
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a context from explicit credentials
    pub fn new(default: Credentials, overrides: Vec<(String, Credentials)>) -> Self {
        Self {
            default,
            overrides,
            header_domains: HashSet::new(),
        }
    }

    /// Limits global headers to hosts under the given registrable domains
    pub fn with_header_domains<'a, I>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.header_domains = domains.into_iter().map(str::to_ascii_lowercase).collect();
        self
    }

    /// Loads every configured credential file
    ///
    /// # Returns
    ///
    /// * `Ok(AuthContext)` - Credentials resolved for the session
    /// * `Err(AuthError)` - A file is missing or malformed
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let default = Credentials::load(
            config.cookies_file.as_deref(),
            config.headers_file.as_deref(),
            config.session_file.as_deref(),
        )?;

        let overrides = config
            .hosts
            .iter()
            .map(|host| {
                Credentials::load(
                    host.cookies_file.as_deref(),
                    host.headers_file.as_deref(),
                    host.session_file.as_deref(),
                )
                .map(|credentials| (host.pattern.to_ascii_lowercase(), credentials))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(default, overrides))
    }

    /// Credentials in effect for a host: the first matching override, else the default
    pub fn credentials_for(&self, host: &str) -> &Credentials {
        self.override_for(host).unwrap_or(&self.default)
    }

    fn override_for(&self, host: &str) -> Option<&Credentials> {
        let host = host.to_ascii_lowercase();
        self.overrides
            .iter()
            .find(|(pattern, _)| matches_wildcard(pattern, &host))
            .map(|(_, credentials)| credentials)
    }

    /// Header credentials for a host, honoring the global header domains
    fn headers_of(&self, host: &str) -> &[(String, String)] {
        if let Some(credentials) = self.override_for(host) {
            return credentials.headers();
        }
        if self.header_domains.is_empty()
            || self
                .header_domains
                .contains(&registrable_domain_of_host(host))
        {
            return self.default.headers();
        }
        &[]
    }

    /// Cookies that domain-match the URL
    pub fn cookies_for(&self, url: &Url) -> Vec<&Cookie> {
        let host = url.host_str().unwrap_or_default();
        self.credentials_for(host)
            .cookies()
            .iter()
            .filter(|c| c.matches(host, url.path()))
            .collect()
    }

    /// Headers to send with a request for the URL, including an assembled `Cookie` header
    pub fn headers_for(&self, url: &Url) -> Vec<(String, String)> {
        let host = url.host_str().unwrap_or_default();
        let mut headers = self.headers_of(host).to_vec();

        let cookies = self.cookies_for(url);
        if !cookies.is_empty() {
            let value = cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("Cookie".to_string(), value));
        }

        headers
    }

    /// Adds the URL's credentials to a request
    pub fn apply(&self, mut request: RequestBuilder, url: &Url) -> RequestBuilder {
        for (name, value) in self.headers_for(url) {
            request = request.header(name, value);
        }
        request
    }

    /// Returns true when no level carries credentials
    pub fn is_empty(&self) -> bool {
        self.default == Credentials::NoAuth
            && self
                .overrides
                .iter()
                .all(|(_, credentials)| *credentials == Credentials::NoAuth)
    }
}

/// Parses a flat JSON header map
pub fn parse_headers(content: &str) -> Result<Vec<(String, String)>, AuthError> {
    let map: BTreeMap<String, String> =
        serde_json::from_str(content).map_err(|e| AuthError::Headers(e.to_string()))?;
    let headers: Vec<(String, String)> = map.into_iter().collect();
    check_headers(&headers)?;
    Ok(headers)
}

fn check_headers(headers: &[(String, String)]) -> Result<(), AuthError> {
    for (name, value) in headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AuthError::Headers(format!("invalid header name '{}'", name)))?;
        HeaderValue::from_str(value)
            .map_err(|_| AuthError::Headers(format!("invalid value for header '{}'", name)))?;
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, AuthError> {
    std::fs::read_to_string(path).map_err(|source| AuthError::Io {
        path: path.to_path_buf(),
        source,
    })
}
