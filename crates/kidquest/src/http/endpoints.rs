//! Auth endpoint paths and wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::TokenPair;

/// Exchange a refresh token for a new pair.
pub const AUTH_REFRESH: &str = "/auth/refresh";

/// Password login.
pub const AUTH_LOGIN: &str = "/auth/login";

/// Parent account registration.
pub const AUTH_REGISTER: &str = "/auth/register";

/// Request body for refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Response from login, register and refresh.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<Value>,
}

impl SessionResponse {
    pub fn into_parts(self) -> (TokenPair, Option<Value>) {
        (TokenPair::new(self.token, self.refresh_token), self.user)
    }
}

/// Error body shape; `message` may be a string or a list of strings.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// The most descriptive message the body carries.
    pub fn describe(&self) -> Option<String> {
        let from_message = match &self.message {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Array(items)) => {
                let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
            _ => None,
        };
        from_message.or_else(|| self.error.clone().filter(|e| !e.is_empty()))
    }
}
