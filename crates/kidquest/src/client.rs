//! The authenticated API client.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AccessToken, AuthEvent, Credentials, RefreshToken, Registration, TokenPair};
use crate::config::ClientConfig;
use crate::connectivity::{AlwaysOnline, ConnectivityProbe};
use crate::error::{ApiError, ConfigError};
use crate::http::{
    AUTH_LOGIN, AUTH_REFRESH, AUTH_REGISTER, RefreshRequest, RequestDescriptor, RequestExecutor,
    ResponseBody, SessionResponse, UploadForm,
};
use crate::refresh::RefreshCoordinator;
use crate::retry::RetryPolicy;
use crate::store::TokenStore;

/// Minimum per-attempt deadline for multipart uploads.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the kidquest backend.
///
/// Every call checks connectivity, attaches the stored access token, runs
/// the retry loop for transient failures, and on a 401 joins the
/// single-flight token refresh before replaying the request once.
///
/// The client is cheap to clone; clones share the token store, refresh
/// coordinator and connection pool.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use kidquest::{ApiClient, ClientConfig, Credentials, TokenStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder("https://api.kidquest.app").build()?;
/// let client = ApiClient::new(config, Arc::new(TokenStore::in_memory()))?;
///
/// client.login(&Credentials::new("parent@example.com", "hunter2")).await?;
/// let missions = client.get("/missions").await?;
/// println!("{:?}", missions.as_json());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    executor: RequestExecutor,
    retry: RetryPolicy,
    store: Arc<TokenStore>,
    probe: Arc<dyn ConnectivityProbe>,
    refresh: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// Create a client that assumes the network is always reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, store: Arc<TokenStore>) -> Result<Self, ConfigError> {
        Self::builder(config, store).build()
    }

    /// Start a builder for injecting collaborators.
    pub fn builder(config: ClientConfig, store: Arc<TokenStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store,
            probe: None,
            refresh: None,
            http: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.inner.refresh
    }

    /// Subscribe to session events ([`AuthEvent::Logout`],
    /// [`AuthEvent::TokenRefreshed`]).
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.refresh.subscribe()
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    pub async fn get(&self, path: &str) -> Result<ResponseBody, ApiError> {
        self.send(RequestDescriptor::get(path)).await
    }

    /// GET and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.into_json()
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ResponseBody, ApiError> {
        self.send(RequestDescriptor::post(path).json(encode(body)?)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ResponseBody, ApiError> {
        self.send(RequestDescriptor::put(path).json(encode(body)?)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ResponseBody, ApiError> {
        self.send(RequestDescriptor::patch(path).json(encode(body)?)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ResponseBody, ApiError> {
        self.send(RequestDescriptor::delete(path)).await
    }

    /// POST a multipart form. The deadline is at least [`UPLOAD_TIMEOUT`].
    pub async fn upload(&self, path: &str, form: UploadForm) -> Result<ResponseBody, ApiError> {
        let timeout = self.inner.config.timeout.max(UPLOAD_TIMEOUT);
        self.send(RequestDescriptor::post(path).upload(form).timeout(timeout))
            .await
    }

    /// Send a request and deserialize the JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ApiError> {
        self.send(descriptor).await?.into_json()
    }

    /// Send a request through connectivity check, retry loop and, on 401,
    /// the refresh-and-replay-once flow.
    ///
    /// An absolute URL on another origin is sent without the session token,
    /// and its 401 is surfaced without touching the session.
    #[instrument(skip_all, fields(method = %descriptor.method, path = %descriptor.path))]
    pub async fn send(&self, mut descriptor: RequestDescriptor) -> Result<ResponseBody, ApiError> {
        if !descriptor.skip_auth && !self.inner.config.base_url.is_backend(&descriptor.path) {
            debug!("foreign origin; sending without credentials");
            descriptor = descriptor.skip_auth();
        }

        let generation = self.inner.refresh.generation();
        let token = self.current_token(&descriptor).await;

        match self.attempt(&descriptor, token).await {
            Err(e) if e.is_unauthorized() && descriptor.may_refresh() => {
                self.refresh_and_replay(&descriptor, generation).await
            }
            other => other,
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Log in and store the returned session.
    ///
    /// Returns the user profile when the backend includes one.
    #[instrument(skip_all, fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Option<Value>, ApiError> {
        info!("Creating new session");
        let descriptor = RequestDescriptor::post(AUTH_LOGIN)
            .json(encode(credentials)?)
            .skip_auth();
        self.start_session(descriptor).await
    }

    /// Register a parent account and store the returned session.
    #[instrument(skip_all, fields(email = %registration.email()))]
    pub async fn register(&self, registration: &Registration) -> Result<Option<Value>, ApiError> {
        info!("Registering new account");
        let descriptor = RequestDescriptor::post(AUTH_REGISTER)
            .json(encode(registration)?)
            .skip_auth();
        self.start_session(descriptor).await
    }

    /// Clear the stored session and emit [`AuthEvent::Logout`].
    pub async fn logout(&self) {
        info!("Logging out");
        self.inner
            .refresh
            .sign_out(&self.inner.store, None, "logged out")
            .await;
    }

    /// Refresh the tokens now, joining any refresh already in flight.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the refresh fails; the session is then
    /// cleared and a logout event emitted.
    pub async fn refresh_session(&self) -> Result<AccessToken, ApiError> {
        self.inner
            .refresh
            .refresh(None, &self.inner.store, |rt| self.call_refresh(rt))
            .await
    }

    /// Whether an access token is stored.
    pub async fn is_authenticated(&self) -> bool {
        self.inner.store.access_token().await.is_some()
    }

    /// The cached user profile, if any.
    pub async fn current_user(&self) -> Option<Value> {
        self.inner.store.user().await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn current_token(&self, descriptor: &RequestDescriptor) -> Option<AccessToken> {
        if descriptor.skip_auth {
            None
        } else {
            self.inner.store.access_token().await
        }
    }

    /// Connectivity check followed by the retry loop.
    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<AccessToken>,
    ) -> Result<ResponseBody, ApiError> {
        self.inner
            .retry
            .run(descriptor.skip_retry, |attempt| {
                let token = token.as_ref();
                async move {
                    if !self.inner.probe.is_online().await {
                        debug!(attempt, "offline; not sending");
                        return Err(ApiError::offline());
                    }
                    self.inner.executor.execute(descriptor, token).await
                }
            })
            .await
    }

    async fn refresh_and_replay(
        &self,
        descriptor: &RequestDescriptor,
        generation: u64,
    ) -> Result<ResponseBody, ApiError> {
        debug!("access token rejected; coordinating refresh");
        let token = self
            .inner
            .refresh
            .refresh(Some(generation), &self.inner.store, |rt| self.call_refresh(rt))
            .await?;

        let replay = descriptor.for_replay();
        let replay_generation = self.inner.refresh.generation();

        match self.attempt(&replay, Some(token)).await {
            Err(e) if e.is_unauthorized() => {
                warn!("replayed request still unauthorized; ending session");
                self.inner
                    .refresh
                    .sign_out(
                        &self.inner.store,
                        Some(replay_generation),
                        "request rejected after token refresh",
                    )
                    .await;
                Err(e)
            }
            other => other,
        }
    }

    /// `POST /auth/refresh`, one attempt, no bearer.
    async fn call_refresh(&self, refresh_token: RefreshToken) -> Result<TokenPair, ApiError> {
        let body = encode(&RefreshRequest {
            refresh_token: refresh_token.as_str(),
        })?;
        let descriptor = RequestDescriptor::post(AUTH_REFRESH)
            .json(body)
            .skip_auth()
            .skip_retry();

        let response: SessionResponse = self.attempt(&descriptor, None).await?.into_json()?;
        let (pair, _) = response.into_parts();
        Ok(pair)
    }

    async fn start_session(&self, descriptor: RequestDescriptor) -> Result<Option<Value>, ApiError> {
        let response: SessionResponse = self.send_json(descriptor).await?;
        let (pair, user) = response.into_parts();

        self.inner
            .refresh
            .install_session(&self.inner.store, &pair, user.as_ref())
            .await;

        debug!("Session created successfully");
        Ok(user)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("refresh", &self.inner.refresh)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

/// Builder for [`ApiClient`] with injectable collaborators.
pub struct ApiClientBuilder {
    config: ClientConfig,
    store: Arc<TokenStore>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    refresh: Option<Arc<RefreshCoordinator>>,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Share a refresh coordinator, e.g. between clients over one store.
    pub fn coordinator(mut self, refresh: Arc<RefreshCoordinator>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn build(self) -> Result<ApiClient, ConfigError> {
        let executor = match self.http {
            Some(http) => RequestExecutor::with_client(http, &self.config),
            None => RequestExecutor::new(&self.config)?,
        };

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                retry: RetryPolicy::from_config(&self.config),
                executor,
                store: self.store,
                probe: self.probe.unwrap_or_else(|| Arc::new(AlwaysOnline)),
                refresh: self.refresh.unwrap_or_default(),
                config: self.config,
            }),
        })
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::unknown(format!("failed to encode request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticProbe;
    use crate::ErrorKind;

    fn client_with_probe(probe: StaticProbe) -> ApiClient {
        // Port 9 on localhost: nothing should ever be sent.
        let config = ClientConfig::builder("http://127.0.0.1:9").build().unwrap();
        ApiClient::builder(config, Arc::new(TokenStore::in_memory()))
            .probe(Arc::new(probe))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn offline_fails_immediately_without_retry() {
        let client = client_with_probe(StaticProbe::new(false));
        let started = tokio::time::Instant::now();

        let err = client.get("/rewards").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn logout_without_session_still_notifies() {
        let client = client_with_probe(StaticProbe::new(true));
        let mut events = client.subscribe();

        client.logout().await;

        assert_eq!(events.recv().await.unwrap(), AuthEvent::Logout);
        assert!(!client.is_authenticated().await);
    }

    #[test]
    fn debug_redacts_tokens() {
        let client = client_with_probe(StaticProbe::new(true));
        let debug = format!("{:?}", client);
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("127.0.0.1"));
    }
}
