//! Best-effort session token store.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ACCESS_TOKEN_KEY, KeyValueStorage, MemoryStorage, REFRESH_TOKEN_KEY, USER_DATA_KEY};
use crate::auth::{AccessToken, RefreshToken, TokenPair};

/// Owns the persisted session: access token, refresh token and cached user
/// profile.
///
/// Every operation is infallible from the caller's point of view. Writes
/// land in an in-memory mirror first and are then persisted; a failing
/// backend is logged and the store continues memory-only. Callers must
/// still tolerate `None` from a read.
///
/// While a refresh is in flight only the refresh coordinator may call
/// [`set_tokens`](Self::set_tokens) or [`clear_tokens`](Self::clear_tokens).
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    cache: RwLock<SessionCache>,
}

/// Memory mirror of one stored value.
#[derive(Debug, Clone)]
enum Slot<T> {
    /// Not read from storage yet.
    Unknown,
    Absent,
    Present(T),
}

#[derive(Debug)]
struct SessionCache {
    access_token: Slot<AccessToken>,
    refresh_token: Slot<RefreshToken>,
    user: Slot<Value>,
}

impl TokenStore {
    /// Create a store over a persistent backend.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            cache: RwLock::new(SessionCache {
                access_token: Slot::Unknown,
                refresh_token: Slot::Unknown,
                user: Slot::Unknown,
            }),
        }
    }

    /// A store backed only by memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Returns the current access token, if any.
    pub async fn access_token(&self) -> Option<AccessToken> {
        if let Some(cached) = resolved(&self.cache.read().await.access_token) {
            return cached;
        }

        let loaded = self.load(ACCESS_TOKEN_KEY).await?.map(AccessToken::new);
        let mut cache = self.cache.write().await;
        if let Slot::Unknown = cache.access_token {
            cache.access_token = slot_of(loaded.clone());
        }
        loaded
    }

    /// Returns the current refresh token, if any.
    pub async fn refresh_token(&self) -> Option<RefreshToken> {
        if let Some(cached) = resolved(&self.cache.read().await.refresh_token) {
            return cached;
        }

        let loaded = self.load(REFRESH_TOKEN_KEY).await?.map(RefreshToken::new);
        let mut cache = self.cache.write().await;
        if let Slot::Unknown = cache.refresh_token {
            cache.refresh_token = slot_of(loaded.clone());
        }
        loaded
    }

    /// Returns both tokens when a complete pair is stored.
    pub async fn tokens(&self) -> Option<TokenPair> {
        let access_token = self.access_token().await?;
        let refresh_token = self.refresh_token().await?;
        Some(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Returns the cached user profile, if any.
    pub async fn user(&self) -> Option<Value> {
        if let Some(cached) = resolved(&self.cache.read().await.user) {
            return cached;
        }

        let loaded = self.load(USER_DATA_KEY).await?.and_then(|raw| {
            serde_json::from_str::<Value>(&raw)
                .inspect_err(|e| warn!(error = %e, "discarding unreadable cached user profile"))
                .ok()
        });
        let mut cache = self.cache.write().await;
        if let Slot::Unknown = cache.user {
            cache.user = slot_of(loaded.clone());
        }
        loaded
    }

    /// Replace both tokens.
    pub async fn set_tokens(&self, pair: &TokenPair) {
        {
            let mut cache = self.cache.write().await;
            cache.access_token = Slot::Present(pair.access_token.clone());
            cache.refresh_token = Slot::Present(pair.refresh_token.clone());
        }

        self.persist(ACCESS_TOKEN_KEY, pair.access_token.as_str()).await;
        self.persist(REFRESH_TOKEN_KEY, pair.refresh_token.as_str()).await;
        debug!("session tokens stored");
    }

    /// Replace the cached user profile.
    pub async fn set_user(&self, user: &Value) {
        self.cache.write().await.user = Slot::Present(user.clone());

        match serde_json::to_string(user) {
            Ok(raw) => self.persist(USER_DATA_KEY, &raw).await,
            Err(e) => warn!(error = %e, "failed to encode user profile; kept in memory only"),
        }
    }

    /// Store a complete session: tokens plus an optional profile.
    pub async fn set_session(&self, pair: &TokenPair, user: Option<&Value>) {
        self.set_tokens(pair).await;
        if let Some(user) = user {
            self.set_user(user).await;
        }
    }

    /// Remove tokens and the cached profile.
    ///
    /// The memory mirror is cleared unconditionally; a key the backend fails
    /// to remove is logged and otherwise ignored.
    pub async fn clear_tokens(&self) {
        {
            let mut cache = self.cache.write().await;
            cache.access_token = Slot::Absent;
            cache.refresh_token = Slot::Absent;
            cache.user = Slot::Absent;
        }

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                warn!(key, error = %e, "failed to remove stored session value");
            }
        }
        debug!("session cleared");
    }

    async fn load(&self, key: &'static str) -> Option<Option<String>> {
        match self.storage.get(key).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "failed to read stored session value");
                None
            }
        }
    }

    async fn persist(&self, key: &'static str, value: &str) {
        if let Err(e) = self.storage.set(key, value).await {
            warn!(key, error = %e, "failed to persist session value; kept in memory only");
        }
    }
}

/// `Some(value)` when the slot is known, `None` when storage must be read.
fn resolved<T: Clone>(slot: &Slot<T>) -> Option<Option<T>> {
    match slot {
        Slot::Unknown => None,
        Slot::Absent => Some(None),
        Slot::Present(value) => Some(Some(value.clone())),
    }
}

fn slot_of<T>(value: Option<T>) -> Slot<T> {
    match value {
        Some(value) => Slot::Present(value),
        None => Slot::Absent,
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}
