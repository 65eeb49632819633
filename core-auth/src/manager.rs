//! # Session Manager
//!
//! Owns the session lifecycle for one client: the volatile access token and
//! its claims, the durable refresh token, the recurring refresh cycle, and
//! cross-context logout.
//!
//! ## Lifecycle
//!
//! ```text
//!                 login / auto_login / set_session
//!  Unauthenticated ───────────────────────────────▶ Authenticated
//!        ▲                                                │
//!        └─── logout / refresh failure / cross-tab ───────┘
//! ```
//!
//! Listeners registered with
//! [`on_auth_state_changed`](SessionManager::on_auth_state_changed) fire only
//! on these edges. Token refreshes while authenticated are silent to
//! listeners and published on the event bus as `TokenRefreshed`.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::SessionManager;
//! use core_runtime::config::AuthConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::builder()
//!     .endpoint("https://auth.example.com")
//!     .app_id("dashboard")
//!     .build()?;
//!
//! let manager = SessionManager::start(config).await?;
//! manager.on_auth_state_changed(|session| {
//!     println!("signed in: {}", session.is_some());
//! });
//!
//! if !manager.is_authenticated().await {
//!     manager.login("alice", "correct horse").await?;
//! }
//! let user_id = manager.claim("x-hasura-user-id").await?;
//! # Ok(())
//! # }
//! ```

use crate::bootstrap::BootstrapImporter;
use crate::client::RemoteAuthClient;
use crate::cross_tab::{self, CrossTabSync};
use crate::decoder::JwtClaimsDecoder;
use crate::error::{AuthError, Result};
use crate::token_store::TokenStore;
use crate::types::{AuthStatus, ListenerId, SessionSnapshot, SessionTokens};
use bridge_traits::platform::PlatformAdapter;
use bridge_traits::time::Clock;
use bridge_traits::token::{Claims, TokenDecoder};
use chrono::{DateTime, Utc};
use core_runtime::config::AuthConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SignInMethod, SignOutReason};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

type Listener = Arc<dyn Fn(Option<&SessionTokens>) + Send + Sync>;

/// Volatile half of the session. Access token and claims change together.
#[derive(Default)]
struct SessionState {
    access_token: Option<String>,
    claims: Claims,
    last_refreshed_at: Option<DateTime<Utc>>,
    /// Bumped by every teardown and every explicit login, so a refresh that
    /// started before one of those cannot resurrect the old session.
    epoch: u64,
}

impl SessionState {
    fn status(&self) -> AuthStatus {
        if self.access_token.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        }
    }
}

/// Result of applying a token pair.
enum Applied {
    /// Tokens accepted; `edge` is true when this was the sign-in transition.
    Updated { edge: bool },
    /// A logout or login happened while the tokens were in flight.
    Superseded,
}

struct SessionInner {
    token_store: TokenStore,
    client: RemoteAuthClient,
    decoder: Arc<dyn TokenDecoder>,
    platform: Arc<dyn PlatformAdapter>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    refresh_interval: Duration,

    state: RwLock<SessionState>,
    listeners: StdMutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,

    /// Serializes refresh redemptions (cycle ticks, manual refreshes, auto login)
    refresh_lock: Mutex<()>,
    refresh_cycle: Mutex<Option<CancellationToken>>,
    cross_tab: Mutex<Option<CrossTabSync>>,
    initialized: Mutex<bool>,
}

/// Client-side session manager.
///
/// Cheap to clone; clones share the same session. Background tasks hold weak
/// references and wind down once every clone is dropped.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Build a manager from `config` without touching storage or network.
    ///
    /// Call [`init`](Self::init) afterwards, or use [`start`](Self::start).
    pub fn new(config: AuthConfig) -> Result<Self> {
        let event_bus = EventBus::new(config.event_buffer_size);
        Self::with_event_bus(config, event_bus)
    }

    /// Like [`new`](Self::new), publishing on an existing event bus.
    pub fn with_event_bus(config: AuthConfig, event_bus: EventBus) -> Result<Self> {
        config.validate()?;

        let decoder = config.token_decoder.clone().unwrap_or_else(|| {
            Arc::new(JwtClaimsDecoder::new(config.claims_namespace.clone())) as Arc<dyn TokenDecoder>
        });

        let inner = SessionInner {
            token_store: TokenStore::new(Arc::clone(&config.storage)),
            client: RemoteAuthClient::from_config(&config),
            decoder,
            platform: Arc::clone(&config.platform),
            clock: Arc::clone(&config.clock),
            event_bus,
            refresh_interval: config.refresh_interval,
            state: RwLock::new(SessionState::default()),
            listeners: StdMutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            refresh_lock: Mutex::new(()),
            refresh_cycle: Mutex::new(None),
            cross_tab: Mutex::new(None),
            initialized: Mutex::new(false),
        };

        debug!(endpoint = %config.endpoint, "Session manager created");
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Construct and run [`init`](Self::init).
    pub async fn start(config: AuthConfig) -> Result<Self> {
        let manager = Self::new(config)?;
        manager.init().await?;
        Ok(manager)
    }

    /// Import a redirect-delivered refresh token, then attempt automatic login.
    ///
    /// Idempotent: once a call has succeeded, later calls return the current
    /// status without touching storage or network. A failed call may be
    /// retried.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<AuthStatus> {
        let mut initialized = self.inner.initialized.lock().await;
        if *initialized {
            return Ok(self.status().await);
        }

        let importer =
            BootstrapImporter::new(self.inner.token_store.clone(), Arc::clone(&self.inner.platform));
        match importer.run().await {
            Ok(outcome) => debug!(?outcome, "Bootstrap import finished"),
            Err(e) => warn!(error = %e, "Bootstrap import failed; continuing with auto login"),
        }

        let status = self.auto_login().await?;
        *initialized = true;

        self.inner.emit(AuthEvent::Initialized {
            authenticated: status.is_authenticated(),
        });
        info!(status = %status, "Session manager initialized");
        Ok(status)
    }

    /// Redeem the persisted refresh token, if any.
    ///
    /// No stored token leaves the manager unauthenticated without error. A
    /// rejected token clears the store and is returned as is; a transport
    /// failure keeps the store so a later attempt can succeed.
    #[instrument(skip(self))]
    pub async fn auto_login(&self) -> Result<AuthStatus> {
        let inner = &self.inner;
        let _guard = inner.refresh_lock.lock().await;
        let epoch = inner.state.read().await.epoch;

        let stored = inner.token_store.refresh_token().await?;
        let tokens = match inner.client.refresh_session(stored.as_deref()).await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!("No stored session to restore");
                return Ok(self.status().await);
            }
            Err(e) => {
                warn!(error = %e, "Automatic login failed");
                if matches!(e, AuthError::AuthRejected { .. }) {
                    if let Err(clear_err) = inner.token_store.clear().await {
                        warn!(error = %clear_err, "Failed to discard rejected refresh token");
                    }
                }
                inner.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                return Err(e);
            }
        };

        match inner.apply_session(&tokens, Some(epoch)).await? {
            Applied::Updated { edge } => {
                inner.announce_update(&tokens, edge, SignInMethod::StoredToken);
                self.start_background_tasks().await;
                info!("Session restored from stored refresh token");
            }
            Applied::Superseded => debug!("Restored session superseded before it was applied"),
        }

        Ok(self.status().await)
    }

    /// Sign in with username and password.
    ///
    /// On success the session is established and the refresh cycle
    /// (re)started. On failure the state is unchanged and the error is
    /// returned untouched.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthStatus> {
        info!("Logging in");
        let tokens = self.inner.client.login(username, password).await?;
        self.init_session(&tokens, SignInMethod::Password).await?;
        info!("Login completed");
        Ok(AuthStatus::Authenticated)
    }

    /// Adopt a token pair obtained elsewhere.
    ///
    /// Persists the refresh token and updates the access token and claims.
    /// Listeners fire only when this moves the manager into
    /// `Authenticated`. Starts background tasks on that transition.
    #[instrument(skip_all)]
    pub async fn set_session(&self, tokens: &SessionTokens) -> Result<AuthStatus> {
        if let Applied::Updated { edge } = self.inner.apply_session(tokens, None).await? {
            self.inner
                .announce_update(tokens, edge, SignInMethod::External);
            if edge {
                self.start_background_tasks().await;
            }
        }
        Ok(self.status().await)
    }

    /// Redeem the stored refresh token now.
    ///
    /// Shares the refresh lock with the background cycle. Any failure,
    /// including a missing stored token while signed in, forces a logout;
    /// the resulting status is returned.
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> AuthStatus {
        let was_authenticated = self.is_authenticated().await;
        let status = self.inner.refresh_once().await;
        if status.is_authenticated() && !was_authenticated {
            self.start_background_tasks().await;
        }
        status
    }

    /// Sign out locally and, best-effort, remotely.
    ///
    /// Always ends `Unauthenticated`, whatever the auth service answers.
    #[instrument(skip(self))]
    pub async fn logout(&self, all: bool) -> AuthStatus {
        self.inner.logout(all, SignOutReason::UserRequested).await
    }

    /// Create an account. Does not sign in.
    #[instrument(skip(self, email, password, register_data), fields(username = %username))]
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        register_data: &Value,
    ) -> Result<Value> {
        self.inner
            .client
            .register(email, username, password, register_data)
            .await
    }

    #[instrument(skip_all)]
    pub async fn activate_account(&self, secret_token: &str) -> Result<Value> {
        self.inner.client.activate_account(secret_token).await
    }

    #[instrument(skip_all)]
    pub async fn set_new_password(&self, secret_token: &str, password: &str) -> Result<Value> {
        self.inner
            .client
            .set_new_password(secret_token, password)
            .await
    }

    /// Register a state-change listener.
    ///
    /// Called with the new tokens on sign-in and with `None` on sign-out.
    /// Listeners run inline on the task that caused the transition and must
    /// not block.
    pub fn on_auth_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Option<&SessionTokens>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        debug!(listener = %id, "Auth state listener registered");
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        before != listeners.len()
    }

    pub async fn status(&self) -> AuthStatus {
        self.inner.state.read().await.status()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.status().await.is_authenticated()
    }

    /// Current bearer token, if signed in
    pub async fn access_token(&self) -> Option<String> {
        self.inner.state.read().await.access_token.clone()
    }

    /// Decoded claims; empty when signed out
    pub async fn claims(&self) -> Claims {
        self.inner.state.read().await.claims.clone()
    }

    /// Look up a single claim.
    ///
    /// Present values are returned as stored, including `false`, `0` and
    /// `null`. Absent keys yield [`AuthError::ClaimNotFound`].
    pub async fn claim(&self, name: &str) -> Result<Value> {
        let state = self.inner.state.read().await;
        if state.access_token.is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        state
            .claims
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::ClaimNotFound(name.to_string()))
    }

    pub async fn current_session(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            status: state.status(),
            access_token: state.access_token.clone(),
            claims: state.claims.clone(),
            last_refreshed_at: state.last_refreshed_at,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Whether a refresh cycle is currently scheduled
    pub async fn is_refresh_scheduled(&self) -> bool {
        self.inner
            .refresh_cycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
    }

    /// Stop background tasks without touching the session or storage.
    pub async fn shutdown(&self) {
        self.inner.cancel_refresh_cycle().await;
        if let Some(sync) = self.inner.cross_tab.lock().await.take() {
            sync.stop();
        }
        debug!("Session manager background tasks stopped");
    }

    /// Establish a fresh session: apply tokens, restart the refresh cycle and
    /// make sure cross-tab sync is listening.
    async fn init_session(&self, tokens: &SessionTokens, method: SignInMethod) -> Result<()> {
        if let Applied::Updated { edge } = self.inner.apply_session(tokens, None).await? {
            self.inner.announce_update(tokens, edge, method);
        }
        self.start_background_tasks().await;
        Ok(())
    }

    async fn start_background_tasks(&self) {
        self.start_refresh_cycle().await;
        self.register_cross_tab().await;
    }

    /// Replace any running refresh cycle with a new one.
    async fn start_refresh_cycle(&self) {
        let period = self.inner.refresh_interval;
        let weak = Arc::downgrade(&self.inner);
        let cancel = spawn_refresh_cycle(period, move || tick(weak.clone()));

        if let Some(previous) = self.inner.refresh_cycle.lock().await.replace(cancel) {
            previous.cancel();
        }
        debug!(interval_secs = period.as_secs(), "Refresh cycle started");
    }

    async fn register_cross_tab(&self) {
        let mut slot = self.inner.cross_tab.lock().await;
        if slot.as_ref().is_some_and(CrossTabSync::is_running) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *slot = CrossTabSync::listen(self.inner.platform.as_ref(), move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        inner.teardown(SignOutReason::CrossTab).await;
                        true
                    }
                    None => false,
                }
            }
        });
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("refresh_interval", &self.inner.refresh_interval)
            .finish_non_exhaustive()
    }
}

/// One refresh-cycle firing. Returns `false` once the manager is gone.
async fn tick(weak: Weak<SessionInner>) -> bool {
    match weak.upgrade() {
        Some(inner) => {
            inner.refresh_once().await;
            true
        }
        None => false,
    }
}

/// Spawn the recurring refresh task.
///
/// Firings run back to back on one task, so a slow refresh delays the next
/// firing instead of overlapping it; missed ticks are skipped.
fn spawn_refresh_cycle<F, Fut>(period: Duration, on_tick: F) -> CancellationToken
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let firing = on_tick();
            if !firing.await {
                break;
            }
        }
        debug!("Refresh cycle stopped");
    });

    cancel
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionInner {
    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }

    fn notify(&self, tokens: Option<&SessionTokens>) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(tokens);
        }
    }

    fn announce_update(&self, tokens: &SessionTokens, edge: bool, method: SignInMethod) {
        if edge {
            info!(method = ?method, "Signed in");
            self.notify(Some(tokens));
            self.emit(AuthEvent::SignedIn { method });
        } else {
            debug!("Access token replaced");
            self.emit(AuthEvent::TokenRefreshed {
                refreshed_at: self.clock.unix_timestamp_millis(),
            });
        }
    }

    /// Decode, persist and publish a token pair.
    ///
    /// With `expected_epoch`, the tokens are dropped if a teardown or login
    /// happened since that epoch was read; without it the call itself starts
    /// a new epoch. Decode or storage failures leave the state untouched.
    async fn apply_session(
        &self,
        tokens: &SessionTokens,
        expected_epoch: Option<u64>,
    ) -> Result<Applied> {
        let claims = self.decoder.decode(&tokens.access_token).map_err(|e| {
            warn!(error = %e, "Received access token could not be decoded");
            AuthError::MalformedToken(e.to_string())
        })?;

        let mut state = self.state.write().await;
        match expected_epoch {
            Some(epoch) if epoch != state.epoch => return Ok(Applied::Superseded),
            Some(_) => {}
            None => state.epoch += 1,
        }

        self.token_store
            .store_refresh_token(&tokens.refresh_token)
            .await?;

        let edge = state.access_token.is_none();
        state.access_token = Some(tokens.access_token.clone());
        state.claims = claims;
        state.last_refreshed_at = Some(self.clock.now());

        Ok(Applied::Updated { edge })
    }

    /// Redeem the stored refresh token, logging out on any failure.
    async fn refresh_once(&self) -> AuthStatus {
        let _guard = self.refresh_lock.lock().await;
        let epoch = self.state.read().await.epoch;

        let outcome = match self.token_store.refresh_token().await {
            Ok(stored) => self.client.refresh_session(stored.as_deref()).await,
            Err(e) => Err(e),
        };

        let failure = match outcome {
            Ok(Some(tokens)) => match self.apply_session(&tokens, Some(epoch)).await {
                Ok(Applied::Updated { edge }) => {
                    self.announce_update(&tokens, edge, SignInMethod::StoredToken);
                    return AuthStatus::Authenticated;
                }
                Ok(Applied::Superseded) => {
                    debug!("Refreshed tokens superseded by a newer session change");
                    return self.state.read().await.status();
                }
                Err(e) => e,
            },
            Ok(None) => {
                if self.state.read().await.access_token.is_none() {
                    return AuthStatus::Unauthenticated;
                }
                warn!("Refresh token vanished while signed in");
                AuthError::NotAuthenticated
            }
            Err(e) => e,
        };

        error!(error = %failure, "Token refresh failed; signing out");
        self.emit(AuthEvent::AuthError {
            message: failure.to_string(),
            recoverable: false,
        });
        self.logout(false, SignOutReason::RefreshFailed).await
    }

    async fn logout(&self, all: bool, reason: SignOutReason) -> AuthStatus {
        info!(all, reason = ?reason, "Logging out");
        cross_tab::signal_logout(self.platform.as_ref(), self.clock.as_ref()).await;

        let refresh_token = match self.token_store.refresh_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read refresh token for remote logout");
                None
            }
        };
        if let Err(e) = self.client.logout(refresh_token.as_deref(), all).await {
            warn!(error = %e, "Remote logout failed; continuing with local teardown");
        }

        self.teardown(reason).await;
        AuthStatus::Unauthenticated
    }

    /// Local half of logout, shared with cross-tab sync.
    ///
    /// The store is cleared under the state lock, so a persist from
    /// `apply_session` is ordered wholly before or after it.
    async fn teardown(&self, reason: SignOutReason) {
        let was_authenticated = {
            let mut state = self.state.write().await;
            let was = state.access_token.take().is_some();
            state.claims.clear();
            state.last_refreshed_at = None;
            state.epoch += 1;

            if let Err(e) = self.token_store.clear().await {
                warn!(error = %e, "Failed to clear token storage during logout");
            }
            was
        };
        self.cancel_refresh_cycle().await;

        if was_authenticated {
            info!(reason = ?reason, "Signed out");
            self.notify(None);
            self.emit(AuthEvent::SignedOut { reason });
        }
    }

    async fn cancel_refresh_cycle(&self) {
        if let Some(cancel) = self.refresh_cycle.lock().await.take() {
            cancel.cancel();
            debug!("Refresh cycle cancelled");
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(cancel) = self.refresh_cycle.get_mut().take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use bridge_desktop::MemoryKeyValueStore;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::storage::KeyValueStore;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    const NS: &str = "https://hasura.io/jwt/claims";

    fn jwt(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({ NS: claims })).unwrap());
        format!("{}.{}.sig", header, payload)
    }

    fn session_body(refresh: &str, claims: Value) -> String {
        json!({ "refresh_token": refresh, "jwt_token": jwt(claims) }).to_string()
    }

    // Scripted HttpClient: pops one canned reply per request and records URLs
    #[derive(Default)]
    struct ScriptedHttp {
        replies: StdMutex<VecDeque<BridgeResult<HttpResponse>>>,
        requests: StdMutex<Vec<String>>,
    }

    impl ScriptedHttp {
        fn reply(&self, status: u16, body: impl Into<String>) {
            let body: String = body.into();
            lock(&self.replies).push_back(Ok(HttpResponse::new(status, body)));
        }

        fn fail(&self) {
            lock(&self.replies)
                .push_back(Err(BridgeError::OperationFailed("connection reset".into())));
        }

        fn urls(&self) -> Vec<String> {
            lock(&self.requests).clone()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            lock(&self.requests).push(request.url.clone());
            lock(&self.replies)
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "no scripted reply")))
        }
    }

    struct Harness {
        manager: SessionManager,
        http: Arc<ScriptedHttp>,
        store: Arc<MemoryKeyValueStore>,
    }

    fn harness() -> Harness {
        let http = Arc::new(ScriptedHttp::default());
        let store = Arc::new(MemoryKeyValueStore::new());
        let config = AuthConfig::builder()
            .endpoint("https://auth.example.com")
            .app_id("app")
            .refresh_interval(Duration::from_secs(60))
            .storage(store.clone())
            .http_client(http.clone())
            .build()
            .unwrap();
        Harness {
            manager: SessionManager::new(config).unwrap(),
            http,
            store,
        }
    }

    fn count_transitions(manager: &SessionManager) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let ins = Arc::new(AtomicUsize::new(0));
        let outs = Arc::new(AtomicUsize::new(0));
        let (i, o) = (Arc::clone(&ins), Arc::clone(&outs));
        manager.on_auth_state_changed(move |session| {
            if session.is_some() {
                i.fetch_add(1, Ordering::SeqCst);
            } else {
                o.fetch_add(1, Ordering::SeqCst);
            }
        });
        (ins, outs)
    }

    #[tokio::test]
    async fn test_set_session_notifies_only_on_first_transition() {
        let h = harness();
        let (ins, _) = count_transitions(&h.manager);

        for n in 0..3 {
            let tokens = SessionTokens::new(format!("r{n}"), jwt(json!({ "n": n })));
            h.manager.set_session(&tokens).await.unwrap();
        }

        assert_eq!(ins.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.claim("n").await.unwrap(), json!(2));
        assert_eq!(h.store.get("refresh_token").await.unwrap().as_deref(), Some("r2"));
        h.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_token_leaves_state_untouched() {
        let h = harness();

        let err = h
            .manager
            .set_session(&SessionTokens::new("r1", "not-a-jwt"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::MalformedToken(_)));
        assert!(!h.manager.is_authenticated().await);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_claim_absent_vs_falsy() {
        let h = harness();
        assert!(matches!(
            h.manager.claim("admin").await,
            Err(AuthError::NotAuthenticated)
        ));

        let tokens = SessionTokens::new("r1", jwt(json!({ "admin": false, "count": 0 })));
        h.manager.set_session(&tokens).await.unwrap();

        assert_eq!(h.manager.claim("admin").await.unwrap(), json!(false));
        assert_eq!(h.manager.claim("count").await.unwrap(), json!(0));
        assert!(matches!(
            h.manager.claim("missing").await,
            Err(AuthError::ClaimNotFound(name)) if name == "missing"
        ));
        h.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_login_failure_keeps_state() {
        let h = harness();
        h.http.reply(401, r#"{"message":"bad password"}"#);

        let err = h.manager.login("alice", "nope").await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(!h.manager.is_authenticated().await);
        assert!(!h.manager.is_refresh_scheduled().await);
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let h = harness();
        let (ins, outs) = count_transitions(&h.manager);
        h.http.reply(200, session_body("r1", json!({ "role": "user" })));
        h.http.reply(500, "remote logout broke");

        h.manager.login("alice", "pw").await.unwrap();
        assert!(h.manager.is_authenticated().await);
        assert!(h.manager.is_refresh_scheduled().await);

        let status = h.manager.logout(false).await;

        assert_eq!(status, AuthStatus::Unauthenticated);
        assert_eq!(h.manager.access_token().await, None);
        assert!(h.manager.claims().await.is_empty());
        assert!(h.store.is_empty());
        assert!(!h.manager.is_refresh_scheduled().await);
        assert_eq!(ins.load(Ordering::SeqCst), 1);
        assert_eq!(outs.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.http.urls(),
            vec![
                "https://auth.example.com/auth/local/login".to_string(),
                "https://auth.example.com/auth/logout".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_logout_when_signed_out_is_silent() {
        let h = harness();
        let (_, outs) = count_transitions(&h.manager);
        h.http.fail();

        assert_eq!(h.manager.logout(true).await, AuthStatus::Unauthenticated);
        assert_eq!(outs.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.http.urls(),
            vec!["https://auth.example.com/auth/logout-all".to_string()]
        );
    }

    #[tokio::test]
    async fn test_manual_refresh_failure_forces_logout() {
        let h = harness();
        h.http.reply(200, session_body("r1", json!({})));
        h.manager.login("alice", "pw").await.unwrap();

        h.http.fail();
        h.http.reply(204, "");

        assert_eq!(h.manager.refresh_token().await, AuthStatus::Unauthenticated);
        assert!(!h.manager.is_authenticated().await);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_manual_refresh_rotates_tokens() {
        let h = harness();
        h.http.reply(200, session_body("r1", json!({ "v": 1 })));
        h.manager.login("alice", "pw").await.unwrap();
        let mut events = h.manager.event_bus().subscribe();

        h.http.reply(200, session_body("r2", json!({ "v": 2 })));
        assert_eq!(h.manager.refresh_token().await, AuthStatus::Authenticated);

        assert_eq!(h.manager.claim("v").await.unwrap(), json!(2));
        assert_eq!(h.store.get("refresh_token").await.unwrap().as_deref(), Some("r2"));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. })
        ));
        h.manager.shutdown().await;
    }

    /// Memory store whose writes can be slowed down on demand.
    #[derive(Default)]
    struct SlowWriteStore {
        inner: MemoryKeyValueStore,
        slow: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for SlowWriteStore {
        async fn get(&self, key: &str) -> BridgeResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> BridgeResult<()> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.set(key, value).await
        }

        async fn clear(&self) -> BridgeResult<()> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_logout_during_refresh_persist_leaves_store_empty() {
        let http = Arc::new(ScriptedHttp::default());
        let store = Arc::new(SlowWriteStore::default());
        let config = AuthConfig::builder()
            .endpoint("https://auth.example.com")
            .refresh_interval(Duration::from_secs(60))
            .storage(store.clone())
            .http_client(http.clone())
            .build()
            .unwrap();
        let manager = SessionManager::new(config).unwrap();

        http.reply(200, session_body("r1", json!({})));
        manager.login("alice", "pw").await.unwrap();

        store.slow.store(true, Ordering::SeqCst);
        http.reply(200, session_body("r2", json!({})));
        http.reply(204, "");

        let refreshing = manager.clone();
        let refresh = tokio::spawn(async move { refreshing.refresh_token().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.logout(false).await, AuthStatus::Unauthenticated);
        refresh.await.unwrap();

        assert!(!manager.is_authenticated().await);
        assert_eq!(store.get("refresh_token").await.unwrap(), None);
        assert!(!manager.is_refresh_scheduled().await);
    }

    #[tokio::test]
    async fn test_listener_removal() {
        let h = harness();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = h.manager.on_auth_state_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(h.manager.remove_listener(id));
        assert!(!h.manager.remove_listener(id));

        h.manager
            .set_session(&SessionTokens::new("r1", jwt(json!({}))))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        h.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_stored_token_is_discarded() {
        let h = harness();
        h.store.set("refresh_token", "expired").await.unwrap();
        h.http.reply(401, r#"{"message":"expired"}"#);

        let err = h.manager.init().await.unwrap_err();

        assert!(matches!(err, AuthError::AuthRejected { .. }));
        assert!(h.store.is_empty());
        assert!(!h.manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_stored_token() {
        let h = harness();
        h.store.set("refresh_token", "r1").await.unwrap();
        h.http.fail();

        let err = h.manager.init().await.unwrap_err();

        assert!(err.is_recoverable());
        assert_eq!(h.store.get("refresh_token").await.unwrap().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let h = harness();
        let mut events = h.manager.event_bus().subscribe();

        assert_eq!(h.manager.init().await.unwrap(), AuthStatus::Unauthenticated);
        assert_eq!(h.manager.init().await.unwrap(), AuthStatus::Unauthenticated);

        // Without a stored token, auto login sends nothing.
        assert!(h.http.urls().is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::Initialized {
                authenticated: false
            })
        );
        assert!(events.try_recv().is_err());
    }
}
