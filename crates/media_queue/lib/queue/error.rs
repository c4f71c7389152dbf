use std::fmt;

/// Failure classes a record source can report.
///
/// The controller treats every kind the same way; the classification only feeds the source's
/// own retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFetchErrorKind {
    Network,
    RateLimited,
    UpstreamUnavailable,
    Unauthorized,
    Forbidden,
    MalformedResponse,
    Other,
}

impl SourceFetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::MalformedResponse => "malformed_response",
            Self::Other => "other",
        }
    }
}

/// A failed page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFetchError {
    pub kind: SourceFetchErrorKind,
    pub message: String,
}

impl SourceFetchError {
    pub fn new(kind: SourceFetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SourceFetchErrorKind::Network
                | SourceFetchErrorKind::RateLimited
                | SourceFetchErrorKind::UpstreamUnavailable
        )
    }
}

impl fmt::Display for SourceFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for SourceFetchError {}

#[cfg(test)]
mod tests {
    use super::{SourceFetchError, SourceFetchErrorKind};

    #[test]
    fn only_transient_kinds_are_retryable() {
        let retryable = [
            SourceFetchErrorKind::Network,
            SourceFetchErrorKind::RateLimited,
            SourceFetchErrorKind::UpstreamUnavailable,
        ];
        let permanent = [
            SourceFetchErrorKind::Unauthorized,
            SourceFetchErrorKind::Forbidden,
            SourceFetchErrorKind::MalformedResponse,
            SourceFetchErrorKind::Other,
        ];

        for kind in retryable {
            assert!(SourceFetchError::new(kind, "x").is_retryable(), "{kind:?}");
        }
        for kind in permanent {
            assert!(!SourceFetchError::new(kind, "x").is_retryable(), "{kind:?}");
        }
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = SourceFetchError::new(SourceFetchErrorKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "rate_limited error: slow down");
    }
}
