//! Single-attempt HTTP executor.

use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, instrument, trace};

use super::classify::error_from_response;
use super::descriptor::{RequestBody, RequestDescriptor};
use super::response::ResponseBody;
use crate::auth::AccessToken;
use crate::config::ClientConfig;
use crate::error::{ApiError, ConfigError};
use crate::types::BaseUrl;

/// Performs exactly one HTTP attempt for a [`RequestDescriptor`].
///
/// The whole attempt, from sending to reading the body, is bounded by the
/// descriptor's timeout (or the client default); when it elapses the
/// in-flight request is dropped and a `Timeout` error returned.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: BaseUrl,
    default_timeout: Duration,
    enable_logging: bool,
}

impl RequestExecutor {
    /// Create an executor with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kidquest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Create an executor over an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            default_timeout: config.timeout,
            enable_logging: config.enable_logging,
        }
    }

    /// Returns the base URL requests are resolved against.
    pub fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Perform one attempt.
    ///
    /// `token` is attached as a bearer credential unless the descriptor
    /// sets `skip_auth` or the path points outside the backend.
    #[instrument(skip_all, fields(method = %descriptor.method, path = %descriptor.path))]
    pub async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&AccessToken>,
    ) -> Result<ResponseBody, ApiError> {
        let timeout = descriptor.timeout.unwrap_or(self.default_timeout);
        let url = self.base_url.endpoint(&descriptor.path);
        let token = token.filter(|_| self.base_url.is_backend(&descriptor.path));
        let request = self.build(&url, descriptor, token)?;

        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.perform(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::timeout(timeout)),
        };

        if self.enable_logging {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => debug!(%url, elapsed_ms, "request succeeded"),
                Err(e) => debug!(%url, elapsed_ms, kind = %e.kind, status = ?e.status, "request failed"),
            }
        }

        result
    }

    fn build(
        &self,
        url: &str,
        descriptor: &RequestDescriptor,
        token: Option<&AccessToken>,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let mut request = self
            .client
            .request(descriptor.method.clone(), url)
            .headers(self.default_headers(descriptor, token)?);

        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }

        request = match &descriptor.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| {
                    ApiError::unknown(format!("failed to encode request body: {}", e))
                })?;
                request.body(bytes)
            }
            RequestBody::Upload(form) => request.multipart(form.to_multipart()?),
        };

        Ok(request)
    }

    /// Default headers followed by the descriptor's own.
    fn default_headers(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&AccessToken>,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !descriptor.body.is_upload() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if !descriptor.skip_auth
            && let Some(token) = token
        {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| ApiError::unknown("stored access token is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in &descriptor.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(headers)
    }

    async fn perform(&self, request: reqwest::RequestBuilder) -> Result<ResponseBody, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        trace!(status = %status, "response received");

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        ResponseBody::parse(content_type.as_deref(), &bytes)
    }
}
