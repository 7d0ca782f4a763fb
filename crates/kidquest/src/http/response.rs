//! Parsed response bodies.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// A successful response body, parsed according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    /// Parse raw bytes using the response `Content-Type`.
    pub(crate) fn parse(content_type: Option<&str>, bytes: &[u8]) -> Result<Self, ApiError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResponseBody::Empty);
        }

        let is_json = content_type.is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("application/json") || ct.contains("+json")
        });

        if is_json {
            serde_json::from_slice(bytes)
                .map(ResponseBody::Json)
                .map_err(|e| ApiError::unknown(format!("invalid JSON response body: {}", e)))
        } else {
            Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }

    /// Deserialize a JSON body into `T`. An empty body deserializes from `null`.
    ///
    /// # Errors
    ///
    /// Returns an `Unknown` error for text bodies or a shape mismatch.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let value = match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Empty => Value::Null,
            ResponseBody::Text(_) => {
                return Err(ApiError::unknown("expected a JSON response body, got text"));
            }
        };
        serde_json::from_value(value)
            .map_err(|e| ApiError::unknown(format!("unexpected response shape: {}", e)))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}
