//! Error types for the scopist-search crate.
//!
//! Two layers:
//!
//! - [`SourceError`]: a single adapter attempt failed. These are never
//!   fatal; the orchestrator records them per source and carries on.
//! - [`SearchError`]: configuration, client construction, or collection
//!   store failures. Only the store variants abort a collection run.
//!
//! No API keys or sensitive data appear in error messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable machine-readable codes for [`SourceError`] kinds.
pub mod codes {
    /// Credentials missing or rejected.
    pub const AUTH_ERROR: &str = "AUTH_ERROR";
    /// Source signalled throttling.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// No response inside the per-call or per-query budget.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Response shape or page layout no longer matches the parser.
    pub const SOURCE_FORMAT_CHANGED: &str = "SOURCE_FORMAT_CHANGED";
    /// Connection-level failure.
    pub const TRANSIENT_NETWORK_ERROR: &str = "TRANSIENT_NETWORK_ERROR";
}

/// The category of a per-source failure.
///
/// Serialized with the names used in run reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Invalid or missing credentials. Not retried.
    AuthError,
    /// Source throttled us despite the governor. One bounded retry.
    RateLimited,
    /// Per-call or per-query budget exhausted. Not retried.
    Timeout,
    /// Parse or layout mismatch. Never coerced into partial data.
    SourceFormatChanged,
    /// Connection-level failure. One bounded retry.
    TransientNetworkError,
}

impl FailureKind {
    /// Returns the stable code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthError => codes::AUTH_ERROR,
            Self::RateLimited => codes::RATE_LIMITED,
            Self::Timeout => codes::TIMEOUT,
            Self::SourceFormatChanged => codes::SOURCE_FORMAT_CHANGED,
            Self::TransientNetworkError => codes::TRANSIENT_NETWORK_ERROR,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthError => "AuthError",
            Self::RateLimited => "RateLimited",
            Self::Timeout => "Timeout",
            Self::SourceFormatChanged => "SourceFormatChanged",
            Self::TransientNetworkError => "TransientNetworkError",
        };
        f.write_str(name)
    }
}

/// A failed attempt by one source adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Credentials are required but missing, or were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The source signalled throttling (HTTP 429, CAPTCHA page, ...).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The request or the whole query ran out of time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The response could not be parsed into hits.
    #[error("source format changed: {0}")]
    FormatChanged(String),

    /// Connection, DNS, TLS or body transfer failure.
    #[error("network error: {0}")]
    Network(String),
}

impl SourceError {
    /// Returns the failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::AuthError,
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::FormatChanged(_) => FailureKind::SourceFormatChanged,
            Self::Network(_) => FailureKind::TransientNetworkError,
        }
    }

    /// Returns the stable code, e.g. `RATE_LIMITED`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Returns the human-readable detail without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Auth(m)
            | Self::RateLimited(m)
            | Self::Timeout(m)
            | Self::FormatChanged(m)
            | Self::Network(m) => m,
        }
    }

    /// Whether an adapter may spend its single bounded retry on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Network(_))
    }
}

/// Errors that abort an engine operation.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Invalid engine or adapter configuration.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The collection store could not be read, written or locked.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem I/O failure underneath the collection store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for scopist-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_source_errors() {
        assert_eq!(
            SourceError::Auth("CORE requires an API key".into()).to_string(),
            "authentication failed: CORE requires an API key"
        );
        assert_eq!(
            SourceError::FormatChanged("no result cards".into()).to_string(),
            "source format changed: no result cards"
        );
        assert_eq!(
            SourceError::Network("connection refused".into()).to_string(),
            "network error: connection refused"
        );
    }

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(SourceError::Auth(String::new()).kind(), FailureKind::AuthError);
        assert_eq!(
            SourceError::RateLimited(String::new()).kind(),
            FailureKind::RateLimited
        );
        assert_eq!(SourceError::Timeout(String::new()).kind(), FailureKind::Timeout);
        assert_eq!(
            SourceError::FormatChanged(String::new()).kind(),
            FailureKind::SourceFormatChanged
        );
        assert_eq!(
            SourceError::Network(String::new()).kind(),
            FailureKind::TransientNetworkError
        );
    }

    #[test]
    fn only_rate_limit_and_network_are_retryable() {
        assert!(SourceError::RateLimited("429".into()).is_retryable());
        assert!(SourceError::Network("reset".into()).is_retryable());
        assert!(!SourceError::Auth("401".into()).is_retryable());
        assert!(!SourceError::Timeout("20s".into()).is_retryable());
        assert!(!SourceError::FormatChanged("bad json".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SourceError::Timeout("x".into()).code(), "TIMEOUT");
        assert_eq!(
            SourceError::FormatChanged("x".into()).code(),
            "SOURCE_FORMAT_CHANGED"
        );
        assert_eq!(FailureKind::TransientNetworkError.code(), "TRANSIENT_NETWORK_ERROR");
    }

    #[test]
    fn failure_kind_serializes_with_report_names() {
        let json = serde_json::to_string(&FailureKind::SourceFormatChanged).expect("serialize");
        assert_eq!(json, "\"SourceFormatChanged\"");
        assert_eq!(FailureKind::AuthError.to_string(), "AuthError");
    }

    #[test]
    fn detail_strips_prefix() {
        let err = SourceError::RateLimited("HTTP 429".into());
        assert_eq!(err.detail(), "HTTP 429");
    }

    #[test]
    fn display_store_error() {
        let err = SearchError::Store("articles.json is corrupt".into());
        assert_eq!(err.to_string(), "store error: articles.json is corrupt");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SourceError>();
        assert_send_sync::<SearchError>();
    }
}
