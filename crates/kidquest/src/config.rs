//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::BaseUrl;

/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of additional attempts after the first.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default backoff base.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Options recognized by [`ApiClient`](crate::ApiClient).
///
/// Deserializes from `{ "baseUrl", "timeoutMs", "retries", "retryDelayMs",
/// "enableLogging" }`; everything but `baseUrl` is optional. Deserialization
/// runs the same checks as [`ClientConfigBuilder::build`].
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawClientConfig")]
pub struct ClientConfig {
    /// Prefix for every request path.
    pub base_url: BaseUrl,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Additional attempts beyond the first for retryable failures.
    pub retries: u32,
    /// Backoff base; attempt `n` waits `retry_delay * 2^(n-1)` before the next.
    pub retry_delay: Duration,
    /// Emit per-request diagnostics. Token values are never logged.
    pub enable_logging: bool,
}

/// Wire shape of [`ClientConfig`] before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientConfig {
    base_url: String,
    #[serde(rename = "timeoutMs", with = "millis", default = "default_timeout")]
    timeout: Duration,
    #[serde(default = "default_retries")]
    retries: u32,
    #[serde(rename = "retryDelayMs", with = "millis", default = "default_retry_delay")]
    retry_delay: Duration,
    #[serde(default = "default_enable_logging")]
    enable_logging: bool,
}

impl TryFrom<RawClientConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(raw: RawClientConfig) -> Result<Self, Self::Error> {
        ClientConfig::builder(raw.base_url)
            .timeout(raw.timeout)
            .retries(raw.retries)
            .retry_delay(raw.retry_delay)
            .enable_logging(raw.enable_logging)
            .build()
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(base_url: BaseUrl) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            enable_logging: default_enable_logging(),
        }
    }

    /// Start a builder from a base URL string.
    pub fn builder(base_url: impl AsRef<str>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_url: base_url.as_ref().to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            enable_logging: default_enable_logging(),
        }
    }

    /// Total attempts allowed for one request.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    base_url: String,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
    enable_logging: bool,
}

impl ClientConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn enable_logging(mut self, enable_logging: bool) -> Self {
        self.enable_logging = enable_logging;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid base URL or a zero timeout.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(ClientConfig {
            base_url: BaseUrl::new(&self.base_url)?,
            timeout: self.timeout,
            retries: self.retries,
            retry_delay: self.retry_delay,
            enable_logging: self.enable_logging,
        })
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_enable_logging() -> bool {
    true
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = ClientConfig::builder("https://api.kidquest.app").build().unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.retries, 3);
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert!(config.enable_logging);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let result = ClientConfig::builder("https://api.kidquest.app")
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let result = ClientConfig::builder("ftp://api.kidquest.app").build();
        assert!(matches!(result, Err(ConfigError::BaseUrl { .. })));
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "baseUrl": "http://localhost:3000",
            "retries": 1,
            "retryDelayMs": 250
        }))
        .unwrap();

        assert_eq!(config.base_url.host(), Some("localhost"));
        assert_eq!(config.retries, 1);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn deserializing_rejects_zero_timeout() {
        let err = serde_json::from_value::<ClientConfig>(serde_json::json!({
            "baseUrl": "https://api.kidquest.app",
            "timeoutMs": 0
        }))
        .unwrap_err();

        assert!(err.to_string().contains(&ConfigError::ZeroTimeout.to_string()));
    }

    #[test]
    fn deserializing_rejects_bad_base_url() {
        let err = serde_json::from_value::<ClientConfig>(serde_json::json!({
            "baseUrl": "http://api.kidquest.app"
        }))
        .unwrap_err();

        assert!(err.to_string().contains("http://api.kidquest.app"));
    }
}
