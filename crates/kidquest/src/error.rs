//! Error types for the kidquest client.
//!
//! Every request failure is normalized into a single [`ApiError`] envelope
//! tagged with an [`ErrorKind`], so callers match on `kind` instead of
//! inspecting transport-specific shapes. Construction-time problems
//! (bad base URL, HTTP client setup) use [`ConfigError`], and storage
//! backends report [`StorageError`], which the token store swallows.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Closed taxonomy of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// HTTP 401. Handled by the refresh flow, never by the retry loop.
    Unauthorized,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 400 or 422.
    Validation,
    /// HTTP 5xx.
    ServerError,
    /// Transport failure (offline, DNS, connection reset, body read).
    NetworkError,
    /// The attempt exceeded its deadline.
    Timeout,
    /// Anything not covered above.
    Unknown,
}

impl ErrorKind {
    /// Whether failures of this kind are transient and may be re-attempted.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ServerError | ErrorKind::NetworkError | ErrorKind::Timeout
        )
    }

    /// Returns the kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Validation => "Validation",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform failure envelope returned by every client operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{}[{kind}]: {message}", status_prefix(.status))]
pub struct ApiError {
    /// Classified failure kind.
    pub kind: ErrorKind,
    /// HTTP status code, when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Human-readable description (server-provided when available).
    pub message: String,
    /// Whether the retry loop may re-attempt this failure.
    pub retryable: bool,
}

impl ApiError {
    /// Create an error whose retryability follows its kind.
    pub fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    /// An Unauthorized error without a response status.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, None, message)
    }

    /// A transport-level failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, None, message)
    }

    /// The connectivity probe reported no network.
    ///
    /// Marked non-retryable so the request fails at once.
    pub fn offline() -> Self {
        Self {
            retryable: false,
            ..Self::network("network unreachable: device is offline")
        }
    }

    /// An attempt that exceeded its deadline.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            None,
            format!("request timed out after {}ms", after.as_millis()),
        )
    }

    /// An unclassifiable failure.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, None, message)
    }

    /// Whether the retry loop may re-attempt this failure.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Check if this is an authentication failure.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

fn status_prefix(status: &Option<u16>) -> String {
    status.map(|s| format!("HTTP {} ", s)).unwrap_or_default()
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        crate::http::classify_transport(&err)
    }
}

/// Errors raised while building a client.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid base URL format.
    #[error("invalid base URL '{value}': {reason}")]
    BaseUrl { value: String, reason: String },

    /// A zero timeout would fail every attempt.
    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised by persistent key-value storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document could not be encoded or decoded.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The backend refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_kind() {
        assert!(ApiError::new(ErrorKind::ServerError, Some(503), "down").is_retryable());
        assert!(ApiError::network("reset").is_retryable());
        assert!(ApiError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(!ApiError::unauthorized("expired").is_retryable());
        assert!(!ApiError::new(ErrorKind::Validation, Some(422), "bad").is_retryable());
        assert!(!ApiError::unknown("?").is_retryable());
    }

    #[test]
    fn display_includes_status_and_kind() {
        let err = ApiError::new(ErrorKind::NotFound, Some(404), "mission not found");
        assert_eq!(err.to_string(), "HTTP 404 [NotFound]: mission not found");

        let err = ApiError::offline();
        assert!(err.to_string().starts_with("[NetworkError]"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn serializes_kind_by_name() {
        let err = ApiError::unauthorized("refresh failed");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "Unauthorized");
        assert_eq!(json["retryable"], false);
        assert!(json.get("status").is_none());
    }
}
