//! Single-flight token refresh.
//!
//! The [`RefreshCoordinator`] guarantees that at most one refresh call is in
//! flight. Callers that observe a 401 while a refresh is running are queued
//! as waiters and released together, in admission order, with the outcome
//! of that one refresh.
//!
//! The coordinator also owns every other change to the stored session
//! (installing a fresh login, signing out), so nothing else writes tokens
//! while a refresh is in progress.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::auth::{AccessToken, AuthEvent, RefreshToken, TokenPair};
use crate::error::ApiError;
use crate::store::TokenStore;

type Outcome = Result<AccessToken, ApiError>;

const EVENT_CAPACITY: usize = 16;

/// Coordinates token refresh episodes and session changes.
///
/// State transitions happen inside a short, non-async critical section, so
/// two callers can never both observe `Idle` and start duplicate refreshes.
pub struct RefreshCoordinator {
    state: Mutex<State>,
    events: broadcast::Sender<AuthEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Refreshing,
}

struct State {
    phase: Phase,
    /// Bumped whenever the stored tokens change (refresh, login, sign-out).
    generation: u64,
    /// Queued callers. Unbounded.
    waiters: VecDeque<oneshot::Sender<Outcome>>,
    logout_requested: bool,
}

enum Admission {
    /// The caller runs the episode.
    Leader,
    /// An episode is running; await its outcome.
    Waiter(oneshot::Receiver<Outcome>),
    /// The caller's token was replaced after it was read; no refresh needed.
    Superseded,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(State {
                phase: Phase::Idle,
                generation: 0,
                waiters: VecDeque::new(),
                logout_requested: false,
            }),
            events,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Current token generation. Read it before reading the access token so
    /// a later 401 can tell whether that token has since been replaced.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().phase == Phase::Refreshing
    }

    /// Number of callers waiting on the running refresh.
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Obtain a fresh access token after a 401.
    ///
    /// `observed_generation` is the generation read alongside the rejected
    /// token; when tokens have changed since, the current access token is
    /// returned without a new refresh. `None` forces a refresh.
    ///
    /// When no refresh is running the caller becomes the leader: it reads
    /// the refresh token and runs `refresh_call`. Success stores the new
    /// pair and releases every waiter with the new access token. Failure
    /// clears the session, rejects every waiter with `Unauthorized` and
    /// emits a single [`AuthEvent::Logout`].
    ///
    /// # Errors
    ///
    /// Always `Unauthorized` when the episode fails.
    #[instrument(skip_all, fields(observed = ?observed_generation))]
    pub async fn refresh<F, Fut>(
        &self,
        observed_generation: Option<u64>,
        store: &TokenStore,
        refresh_call: F,
    ) -> Result<AccessToken, ApiError>
    where
        F: FnOnce(RefreshToken) -> Fut,
        Fut: Future<Output = Result<TokenPair, ApiError>>,
    {
        match self.admit(observed_generation) {
            Admission::Superseded => {
                debug!("access token already replaced; skipping refresh");
                store
                    .access_token()
                    .await
                    .ok_or_else(|| ApiError::unauthorized("no access token available"))
            }
            Admission::Waiter(rx) => {
                debug!("refresh in flight; waiting for its outcome");
                rx.await
                    .unwrap_or_else(|_| Err(ApiError::unauthorized("token refresh was abandoned")))
            }
            Admission::Leader => {
                let episode = Episode::new(self);
                info!("refreshing session tokens");

                let outcome = match store.refresh_token().await {
                    None => Err(ApiError::unauthorized("no refresh token available")),
                    Some(refresh_token) => match refresh_call(refresh_token).await {
                        Ok(pair) => {
                            store.set_tokens(&pair).await;
                            Ok(pair.access_token)
                        }
                        Err(e) => Err(ApiError {
                            kind: crate::ErrorKind::Unauthorized,
                            retryable: false,
                            message: format!("token refresh failed: {}", e.message),
                            status: e.status,
                        }),
                    },
                };

                episode.finish(store, outcome, true).await
            }
        }
    }

    /// Store a new session from login or registration.
    ///
    /// Waits for a running refresh to settle first.
    pub async fn install_session(&self, store: &TokenStore, pair: &TokenPair, user: Option<&Value>) {
        while let Admission::Waiter(rx) = self.admit(None) {
            let _ = rx.await;
        }

        let episode = Episode::new(self);
        store.set_session(pair, user).await;
        let _ = episode
            .finish(store, Ok(pair.access_token.clone()), false)
            .await;
    }

    /// End the session: clear stored tokens and emit [`AuthEvent::Logout`].
    ///
    /// With `observed_generation`, the sign-out is skipped if the tokens
    /// have changed since (the session it refers to is already gone). If a
    /// refresh is running, its outcome is turned into a sign-out instead.
    pub async fn sign_out(&self, store: &TokenStore, observed_generation: Option<u64>, reason: &str) {
        {
            let mut state = self.lock();
            if state.phase == Phase::Refreshing {
                debug!("sign-out requested during refresh");
                state.logout_requested = true;
                return;
            }
            if observed_generation.is_some_and(|g| g != state.generation) {
                debug!("session already replaced; skipping sign-out");
                return;
            }
            state.phase = Phase::Refreshing;
        }

        let episode = Episode::new(self);
        let _ = episode
            .finish(store, Err(ApiError::unauthorized(reason)), false)
            .await;
    }

    fn admit(&self, observed_generation: Option<u64>) -> Admission {
        let mut state = self.lock();
        match state.phase {
            Phase::Refreshing => {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Admission::Waiter(rx)
            }
            Phase::Idle if observed_generation.is_some_and(|g| g != state.generation) => {
                Admission::Superseded
            }
            Phase::Idle => {
                state.phase = Phase::Refreshing;
                Admission::Leader
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RefreshCoordinator")
            .field("phase", &state.phase)
            .field("generation", &state.generation)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// A running episode, held by its leader.
///
/// If the leader is dropped before finishing, the waiters are rejected
/// and the coordinator returns to `Idle`.
struct Episode<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl<'a> Episode<'a> {
    fn new(coordinator: &'a RefreshCoordinator) -> Self {
        Self {
            coordinator,
            settled: false,
        }
    }

    /// Settle the episode: on failure clear the session, then release
    /// waiters FIFO and emit one event.
    async fn finish(mut self, store: &TokenStore, outcome: Outcome, announce: bool) -> Outcome {
        let logout_requested = self.coordinator.lock().logout_requested;
        let outcome = match outcome {
            Ok(_) if logout_requested => Err(ApiError::unauthorized("signed out during token refresh")),
            other => other,
        };

        if outcome.is_err() {
            store.clear_tokens().await;
        }

        let waiters = {
            let mut state = self.coordinator.lock();
            state.phase = Phase::Idle;
            state.generation = state.generation.wrapping_add(1);
            state.logout_requested = false;
            std::mem::take(&mut state.waiters)
        };
        self.settled = true;

        let released = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.send(outcome.clone());
        }

        match &outcome {
            Ok(token) => {
                debug!(released, "session tokens updated");
                if announce {
                    self.coordinator.emit(AuthEvent::TokenRefreshed(token.clone()));
                }
            }
            Err(e) => {
                warn!(released, error = %e, "session ended");
                self.coordinator.emit(AuthEvent::Logout);
            }
        }

        outcome
    }
}

impl Drop for Episode<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let waiters = {
            let mut state = self.coordinator.lock();
            state.phase = Phase::Idle;
            state.logout_requested = false;
            std::mem::take(&mut state.waiters)
        };

        warn!(waiters = waiters.len(), "token refresh abandoned");
        for waiter in waiters {
            let _ = waiter.send(Err(ApiError::unauthorized("token refresh was abandoned")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn never_called(_: RefreshToken) -> Result<TokenPair, ApiError> {
        panic!("refresh endpoint must not be called");
    }

    async fn store_with(access: &str, refresh: &str) -> Arc<TokenStore> {
        let store = Arc::new(TokenStore::in_memory());
        store.set_tokens(&TokenPair::new(access, refresh)).await;
        store
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = store_with("a1", "r1").await;
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let generation = coordinator.generation();

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let calls = calls.clone();
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .refresh(Some(generation), &store, |rt| async move {
                        assert_eq!(rt.as_str(), "r1");
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(TokenPair::new("a2", "r2"))
                    })
                    .await
            }));
        }

        // Wait until the other four are queued behind the leader.
        while coordinator.pending_waiters() < 4 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), AccessToken::new("a2"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.refresh_token().await, Some(RefreshToken::new("r2")));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn waiters_are_released_in_admission_order() {
        let coordinator = RefreshCoordinator::new();
        let store = store_with("a1", "r1").await;

        assert!(matches!(coordinator.admit(None), Admission::Leader));
        let Admission::Waiter(first) = coordinator.admit(None) else {
            panic!("expected waiter");
        };
        let Admission::Waiter(second) = coordinator.admit(None) else {
            panic!("expected waiter");
        };

        let episode = Episode::new(&coordinator);
        let outcome = episode.finish(&store, Ok(AccessToken::new("a2")), true).await;
        assert!(outcome.is_ok());

        assert_eq!(first.await.unwrap().unwrap(), AccessToken::new("a2"));
        assert_eq!(second.await.unwrap().unwrap(), AccessToken::new("a2"));
    }

    #[tokio::test]
    async fn failed_refresh_rejects_waiters_and_logs_out_once() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = store_with("a1", "r1").await;
        store.set_user(&serde_json::json!({"name": "Sam"})).await;
        let mut events = coordinator.subscribe();
        let gate = Arc::new(Notify::new());

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .refresh(Some(0), &store, |_| async move {
                        gate.notified().await;
                        Err(ApiError::new(ErrorKind::Unauthorized, Some(401), "revoked"))
                    })
                    .await
            }));
        }

        while coordinator.pending_waiters() < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind, ErrorKind::Unauthorized);
        }

        assert_eq!(store.access_token().await, None);
        assert_eq!(store.refresh_token().await, None);
        assert_eq!(store.user().await, None);

        assert_eq!(events.recv().await.unwrap(), AuthEvent::Logout);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn missing_refresh_token_signs_out_without_calling() {
        let coordinator = RefreshCoordinator::new();
        let store = TokenStore::in_memory();
        let mut events = coordinator.subscribe();

        let err = coordinator
            .refresh(None, &store, never_called)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(events.recv().await.unwrap(), AuthEvent::Logout);
    }

    #[tokio::test]
    async fn success_announces_new_token() {
        let coordinator = RefreshCoordinator::new();
        let store = store_with("a1", "r1").await;
        let mut events = coordinator.subscribe();

        coordinator
            .refresh(None, &store, |_| async { Ok(TokenPair::new("a2", "r2")) })
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::TokenRefreshed(AccessToken::new("a2"))
        );
        assert_eq!(coordinator.generation(), 1);
    }

    #[tokio::test]
    async fn stale_generation_reuses_current_token() {
        let coordinator = RefreshCoordinator::new();
        let store = store_with("a1", "r1").await;

        coordinator
            .refresh(Some(0), &store, |_| async { Ok(TokenPair::new("a2", "r2")) })
            .await
            .unwrap();

        // A late 401 for a token read before that refresh.
        let token = coordinator
            .refresh(Some(0), &store, never_called)
            .await
            .unwrap();
        assert_eq!(token, AccessToken::new("a2"));
    }

    #[tokio::test]
    async fn abandoned_leader_releases_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = store_with("a1", "r1").await;

        let leader = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh(None, &store, |_| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(TokenPair::new("never", "never"))
                    })
                    .await
            })
        };

        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let Admission::Waiter(waiter) = coordinator.admit(None) else {
            panic!("expected waiter");
        };

        leader.abort();
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn sign_out_during_refresh_wins() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = store_with("a1", "r1").await;
        let gate = Arc::new(Notify::new());

        let leader = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh(None, &store, |_| async move {
                        gate.notified().await;
                        Ok(TokenPair::new("a2", "r2"))
                    })
                    .await
            })
        };

        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        coordinator.sign_out(&store, None, "user logged out").await;
        gate.notify_one();

        let err = leader.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(store.access_token().await, None);
    }

    #[tokio::test]
    async fn sign_out_with_stale_generation_is_skipped() {
        let coordinator = RefreshCoordinator::new();
        let store = store_with("a1", "r1").await;
        let mut events = coordinator.subscribe();

        coordinator.sign_out(&store, Some(0), "replay rejected").await;
        coordinator.sign_out(&store, Some(0), "replay rejected").await;

        assert_eq!(events.recv().await.unwrap(), AuthEvent::Logout);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn install_session_bumps_generation() {
        let coordinator = RefreshCoordinator::new();
        let store = TokenStore::in_memory();

        coordinator
            .install_session(&store, &TokenPair::new("a1", "r1"), None)
            .await;

        assert_eq!(coordinator.generation(), 1);
        assert_eq!(store.access_token().await, Some(AccessToken::new("a1")));
    }
}
