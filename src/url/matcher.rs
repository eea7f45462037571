use url::Url;

/// Extensions of resources that are never exported as pages
const NON_PAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "avif", "bmp", "pdf", "doc", "docx",
    "xls", "xlsx", "ppt", "pptx", "odt", "epub", "zip", "tar", "gz", "tgz", "rar", "7z", "mp3",
    "mp4", "avi", "mov", "wmv", "flv", "webm", "wav", "exe", "dmg", "deb", "rpm", "msi", "iso",
    "css", "js", "woff", "woff2", "ttf", "eot", "json", "xml",
];

/// Linked documents the asset manager downloads only when explicitly enabled
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "epub", "zip", "tar", "gz", "tgz",
    "rar", "7z",
];

/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches the bare domain and any subdomain
///
/// # Examples
///
/// ```
/// use sitedown::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Lowercased extension of the last path segment, if any
pub fn path_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Returns true if the URL points at a binary or static resource rather than a page
pub fn is_non_page_resource(url: &Url) -> bool {
    path_extension(url)
        .map(|ext| NON_PAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Returns true if the URL points at a downloadable document (pdf, office, archive)
pub fn is_document(url: &Url) -> bool {
    path_extension(url)
        .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_subdomains() {
        assert!(matches_wildcard("*.example.com", "example.com"));
        assert!(matches_wildcard("*.example.com", "blog.example.com"));
        assert!(matches_wildcard("*.example.com", "deep.nested.sub.example.com"));
    }

    #[test]
    fn test_wildcard_no_match_partial() {
        assert!(!matches_wildcard("*.example.com", "myexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
        assert!(!matches_wildcard("*.example.com", ""));
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(path_extension(&url("https://a.com/x/file.PDF")), Some("pdf".into()));
        assert_eq!(path_extension(&url("https://a.com/x/page")), None);
        assert_eq!(path_extension(&url("https://a.com/x/.hidden")), None);
        assert_eq!(path_extension(&url("https://a.com/")), None);
    }

    #[test]
    fn test_non_page_resources() {
        assert!(is_non_page_resource(&url("https://a.com/logo.png")));
        assert!(is_non_page_resource(&url("https://a.com/app.js?v=2")));
        assert!(!is_non_page_resource(&url("https://a.com/guide/intro")));
        assert!(!is_non_page_resource(&url("https://a.com/guide/intro.html")));
    }

    #[test]
    fn test_documents() {
        assert!(is_document(&url("https://a.com/report.pdf")));
        assert!(is_document(&url("https://a.com/data.xlsx")));
        assert!(!is_document(&url("https://a.com/photo.jpg")));
    }
}
