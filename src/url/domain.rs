use url::{Host, Url};

/// Extracts the host from a URL, lowercased
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitedown::url::extract_domain;
///
/// let url = Url::parse("https://Sub.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the registrable domain of a URL (public suffix plus one label)
///
/// IP addresses, `localhost` and single-label hosts are their own registrable
/// domain. Hosts that are themselves a public suffix also map to themselves.
///
/// # Arguments
///
/// * `url` - The URL to inspect
///
/// # Returns
///
/// * `Some(String)` - The registrable domain, lowercased
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitedown::url::registrable_domain;
///
/// let url = Url::parse("https://docs.example.co.uk/intro").unwrap();
/// assert_eq!(registrable_domain(&url), Some("example.co.uk".to_string()));
/// ```
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => Some(registrable_domain_of_host(domain)),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

/// Registrable domain for a bare host name
pub fn registrable_domain_of_host(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if !host.contains('.') || host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    psl::domain_str(&host)
        .map(|d| d.to_string())
        .unwrap_or(host)
}
