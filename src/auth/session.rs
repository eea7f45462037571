//! Browser session files
//!
//! An interactive login collaborator saves the browser's storage state. Only
//! the cookies and an optional header map are used; everything else in the
//! file is ignored.

use super::cookies::Cookie;
use super::AuthError;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<SessionCookie>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SessionCookie {
    name: String,
    value: String,
    domain: String,
    #[serde(default)]
    path: Option<String>,
}

/// Cookies and headers restored from a browser session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserSession {
    pub cookies: Vec<Cookie>,
    pub headers: Vec<(String, String)>,
}

/// Parses a storage-state JSON document
///
/// Cookie domains with a leading dot apply to subdomains, matching browser
/// semantics.
pub fn parse_session(content: &str) -> Result<BrowserSession, AuthError> {
    let state: StorageState =
        serde_json::from_str(content).map_err(|e| AuthError::Session(e.to_string()))?;

    let cookies = state
        .cookies
        .into_iter()
        .map(|c| Cookie {
            include_subdomains: c.domain.starts_with('.'),
            domain: c.domain.trim_start_matches('.').to_ascii_lowercase(),
            path: c.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".to_string()),
            name: c.name,
            value: c.value,
        })
        .collect();

    Ok(BrowserSession {
        cookies,
        headers: state.headers.into_iter().collect(),
    })
}
