//! Cookie file parsing
//!
//! Two formats are accepted: the Netscape cookie jar exported by browsers and
//! curl, and a JSON map of domain -> cookie name -> value.

use super::AuthError;
use std::collections::BTreeMap;

/// A cookie to send with matching requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercased domain without a leading dot
    pub domain: String,
    /// Also sent to subdomains of `domain`
    pub include_subdomains: bool,
    pub path: String,
}

impl Cookie {
    /// Checks whether the cookie applies to a request for `host` and `path`
    pub fn matches(&self, host: &str, path: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let domain_ok = host == self.domain
            || (self.include_subdomains && host.ends_with(&format!(".{}", self.domain)));
        domain_ok && path.starts_with(&self.path)
    }
}

/// Parses a cookie file, detecting the format from its content
pub fn parse_cookie_file(content: &str) -> Result<Vec<Cookie>, AuthError> {
    if content.trim_start().starts_with('{') {
        parse_json_cookies(content)
    } else {
        parse_netscape(content)
    }
}

/// Parses a Netscape cookie jar
///
/// Each line holds seven tab-separated fields: domain, include-subdomains flag,
/// path, secure flag, expiry, name, value. `#HttpOnly_` prefixed lines are
/// cookies; other `#` lines are comments.
pub fn parse_netscape(content: &str) -> Result<Vec<Cookie>, AuthError> {
    let mut cookies = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = match line.strip_prefix("#HttpOnly_") {
            Some(rest) => rest,
            None if line.starts_with('#') || line.trim().is_empty() => continue,
            None => line,
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return Err(AuthError::CookieJar(format!(
                "line {}: expected 7 tab-separated fields, found {}",
                index + 1,
                fields.len()
            )));
        }

        let domain = fields[0].trim();
        if domain.is_empty() {
            return Err(AuthError::CookieJar(format!("line {}: empty domain", index + 1)));
        }

        cookies.push(Cookie {
            name: fields[5].to_string(),
            value: fields[6].to_string(),
            include_subdomains: fields[1].eq_ignore_ascii_case("TRUE") || domain.starts_with('.'),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            path: if fields[2].is_empty() {
                "/".to_string()
            } else {
                fields[2].to_string()
            },
        });
    }

    Ok(cookies)
}

/// Parses a JSON map of `{ "domain": { "name": "value" } }`
///
/// Cookies from this format apply to the domain and its subdomains.
pub fn parse_json_cookies(content: &str) -> Result<Vec<Cookie>, AuthError> {
    let map: BTreeMap<String, BTreeMap<String, String>> =
        serde_json::from_str(content).map_err(|e| AuthError::CookieJar(e.to_string()))?;

    Ok(map
        .into_iter()
        .flat_map(|(domain, values)| {
            let domain = domain.trim_start_matches('.').to_ascii_lowercase();
            values.into_iter().map(move |(name, value)| Cookie {
                name,
                value,
                domain: domain.clone(),
                include_subdomains: true,
                path: "/".to_string(),
            })
        })
        .collect())
}
