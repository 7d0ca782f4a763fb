//! Mapping of HTTP outcomes onto [`ErrorKind`].

use reqwest::StatusCode;
use tracing::trace;

use super::endpoints::ErrorBody;
use crate::error::{ApiError, ErrorKind};

/// Classify a non-success response status.
///
/// `message` is the server's description when one was found in the body;
/// otherwise the canonical reason phrase is used.
pub fn classify_status(status: StatusCode, message: Option<String>) -> ApiError {
    let kind = match status.as_u16() {
        400 | 422 => ErrorKind::Validation,
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        s if s >= 500 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    };

    let message = message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });

    ApiError::new(kind, Some(status.as_u16()), message)
}

/// Classify a transport failure reported by reqwest.
pub fn classify_transport(err: &reqwest::Error) -> ApiError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_builder() || err.is_decode() {
        ErrorKind::Unknown
    } else {
        // connect, DNS, reset, request and body I/O failures
        ErrorKind::NetworkError
    };

    ApiError::new(kind, err.status().map(|s| s.as_u16()), err.to_string())
}

/// Build the error for a non-success response, reading its body for a message.
pub(crate) async fn error_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status();

    let message = match response.bytes().await {
        Ok(bytes) => serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(|body| body.describe())
            .or_else(|| {
                let text = String::from_utf8_lossy(&bytes);
                let text = text.trim();
                (!text.is_empty() && text.len() <= 512).then(|| text.to_string())
            }),
        Err(e) => {
            trace!(error = %e, "failed to read error body");
            None
        }
    };

    classify_status(status, message)
}
