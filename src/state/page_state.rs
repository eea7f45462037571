/// Page outcome and failure classification
///
/// Every URL a session touches ends in exactly one `PageStatus`. Failed URLs also
/// carry a `FailureReason` whose stable code appears in the manifest and the summary.
use std::fmt;

/// Final outcome of one URL in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStatus {
    /// Converted output changed (or is new) and was written
    Exported,

    /// Fetched with 200 but the converted output hash matched the manifest
    Unchanged,

    /// Origin answered 304 to a conditional request
    NotModified,

    /// Declared a different in-scope canonical URL and was exported only under that URL
    Alias,

    /// Disallowed by robots.txt; recorded, not an error
    RobotsDenied,

    /// Terminal failure; see the accompanying `FailureReason`
    Failed,
}

impl PageStatus {
    /// Returns true for outcomes that skipped writing because nothing changed
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Unchanged | Self::NotModified)
    }

    /// Returns true if the page has a file in the output tree
    pub fn has_output(&self) -> bool {
        matches!(self, Self::Exported | Self::Unchanged | Self::NotModified)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Exported => "exported",
            Self::Unchanged => "unchanged",
            Self::NotModified => "not_modified",
            Self::Alias => "alias",
            Self::RobotsDenied => "robots_denied",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "exported" => Some(Self::Exported),
            "unchanged" => Some(Self::Unchanged),
            "not_modified" => Some(Self::NotModified),
            "alias" => Some(Self::Alias),
            "robots_denied" => Some(Self::RobotsDenied),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Why a URL failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Malformed input; dropped without retry
    InvalidUrl,
    /// Disallowed by robots.txt
    RobotsDenied,
    /// Connection-level failure after all retries
    Network,
    /// Request timed out after all retries
    Timeout,
    /// Redirect chain exceeded the hop limit
    TooManyRedirects,
    /// Redirect chain revisited a URL
    RedirectLoop,
    /// Non-retryable HTTP status, or a retryable one that never cleared
    HttpStatus(u16),
    /// Renderer failed and the static fetch was unusable too
    RenderFailure,
    /// Renderer timed out and the static fetch was unusable too
    RenderTimeout,
    /// No strategy produced any main content
    NoExtractableContent,
    /// Manifest commit conflicted twice
    WriteConflict,
    /// Local filesystem error while writing the page
    Io,
}

impl FailureReason {
    /// Stable snake_case reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::RobotsDenied => "robots_denied",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::TooManyRedirects => "too_many_redirects",
            Self::RedirectLoop => "redirect_loop",
            Self::HttpStatus(_) => "http_status",
            Self::RenderFailure => "render_failure",
            Self::RenderTimeout => "render_timeout",
            Self::NoExtractableContent => "no_extractable_content",
            Self::WriteConflict => "write_conflict",
            Self::Io => "io",
        }
    }

    /// Converts the reason to its database string representation
    ///
    /// HTTP statuses keep their code (`http_status:404`).
    pub fn to_db_string(&self) -> String {
        match self {
            Self::HttpStatus(code) => format!("http_status:{}", code),
            other => other.code().to_string(),
        }
    }

    /// Parses a reason from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        if let Some(code) = s.strip_prefix("http_status:") {
            return code.parse().ok().map(Self::HttpStatus);
        }

        match s {
            "invalid_url" => Some(Self::InvalidUrl),
            "robots_denied" => Some(Self::RobotsDenied),
            "network" => Some(Self::Network),
            "timeout" => Some(Self::Timeout),
            "too_many_redirects" => Some(Self::TooManyRedirects),
            "redirect_loop" => Some(Self::RedirectLoop),
            "render_failure" => Some(Self::RenderFailure),
            "render_timeout" => Some(Self::RenderTimeout),
            "no_extractable_content" => Some(Self::NoExtractableContent),
            "write_conflict" => Some(Self::WriteConflict),
            "io" => Some(Self::Io),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_db_string())
    }
}

/// Origin-issued validators used for conditional requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    /// `ETag` response header
    pub etag: Option<String>,
    /// `Last-Modified` response header, kept verbatim
    pub last_modified: Option<String>,
}

impl Validators {
    /// Returns true when the origin supplied neither validator
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PageStatus::Exported,
            PageStatus::Unchanged,
            PageStatus::NotModified,
            PageStatus::Alias,
            PageStatus::RobotsDenied,
            PageStatus::Failed,
        ] {
            assert_eq!(
                PageStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
        assert_eq!(PageStatus::from_db_string("processed"), None);
    }

    #[test]
    fn test_cached_statuses() {
        assert!(PageStatus::NotModified.is_cached());
        assert!(PageStatus::Unchanged.is_cached());
        assert!(!PageStatus::Exported.is_cached());
        assert!(!PageStatus::RobotsDenied.is_error());
        assert!(PageStatus::Failed.is_error());
        assert!(PageStatus::NotModified.has_output());
        assert!(!PageStatus::Alias.has_output());
    }

    #[test]
    fn test_validators_empty() {
        assert!(Validators::default().is_empty());
        let v = Validators {
            etag: Some("\"abc\"".to_string()),
            last_modified: None,
        };
        assert!(!v.is_empty());
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(FailureReason::HttpStatus(404).code(), "http_status");
        assert_eq!(FailureReason::HttpStatus(404).to_db_string(), "http_status:404");
        assert_eq!(FailureReason::RedirectLoop.to_string(), "redirect_loop");
    }

    #[test]
    fn test_reason_roundtrip() {
        for reason in [
            FailureReason::InvalidUrl,
            FailureReason::Network,
            FailureReason::Timeout,
            FailureReason::TooManyRedirects,
            FailureReason::HttpStatus(410),
            FailureReason::NoExtractableContent,
            FailureReason::WriteConflict,
        ] {
            assert_eq!(
                FailureReason::from_db_string(&reason.to_db_string()),
                Some(reason)
            );
        }
        assert_eq!(FailureReason::from_db_string("http_status:abc"), None);
    }
}
