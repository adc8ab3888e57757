//! Session controller.
//!
//! STATE MACHINE
//! =============
//! `Anonymous` → `Restoring` (token present, profile fetch in flight) →
//! `Authenticated` → back to `Anonymous` on logout or when the backend rejects
//! the stored token. The in-memory token and user are always set and cleared
//! together; `is_authenticated()` is derived from the user alone.
//!
//! CONCURRENCY
//! ===========
//! Login, register and profile update are mutations of the persisted
//! token/user pair. Only one may run at a time; a second one started while
//! the first is in flight fails fast with [`ErrorKind::Busy`]. Logout is
//! never blocked; it bumps the session epoch instead, and a mutation or
//! refresh that started under an older epoch does not commit.
//!
//! Observers call [`SessionController::subscribe`] and receive every state
//! change through a `tokio::sync::watch` channel.
//!
//! [`ErrorKind::Busy`]: crate::error::ErrorKind::Busy

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use tokio::sync::{Mutex, MutexGuard, watch};

use super::backend::{BackendKind, MockBackend, RemoteBackend, SessionBackend};
use super::guard::{CUSTOMER_DASHBOARD, PROVIDER_DASHBOARD};
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::net::{AuthApi, AuthResponse, AvailabilityProber, BackendProbe, Credentials};
use crate::storage::{CookieMirror, FileStore, KeyValueStore, MemoryStore, TokenStore};
use crate::user::{DashboardKind, ProfileUpdate, RegisterInput, User};

pub const PROVIDER_ACCESS_DENIED: &str = "This account is not registered as a service provider.";
pub const REGISTERED_PLEASE_LOGIN: &str = "Registration successful. Please log in.";
const NOT_SIGNED_IN: &str = "You need to be signed in to do that.";
const MISSING_TOKEN: &str = "The server did not return an access token.";
const SIGNED_OUT_MEANWHILE: &str = "You signed out before the request finished.";

// =============================================================================
// SESSION STATE
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Anonymous,
    Restoring,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
    pub is_loading: bool,
    pub phase: SessionPhase,
}

impl Session {
    /// State before `bootstrap` has run.
    #[must_use]
    pub fn initial() -> Self {
        Self { is_loading: true, ..Self::default() }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(token: String, user: User) -> Self {
        Self { token: Some(token), user: Some(user), is_loading: false, phase: SessionPhase::Authenticated }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub user: User,
    pub destination: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// The backend issued a token; the session is live.
    Authenticated(LoginOutcome),
    /// Account created, but the user still has to log in.
    PendingLogin { message: String },
}

fn destination_for(user: &User, requested: Option<DashboardKind>) -> &'static str {
    match requested {
        Some(DashboardKind::Provider) => PROVIDER_DASHBOARD,
        Some(DashboardKind::Customer) => CUSTOMER_DASHBOARD,
        None if user.is_provider => PROVIDER_DASHBOARD,
        None => CUSTOMER_DASHBOARD,
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct SessionController {
    tokens: Arc<TokenStore>,
    probe: Arc<dyn BackendProbe>,
    remote: Arc<dyn SessionBackend>,
    mock: Arc<dyn SessionBackend>,
    active: RwLock<Option<Arc<dyn SessionBackend>>>,
    state: watch::Sender<Session>,
    mutation: Mutex<()>,
    epoch: StdMutex<u64>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenStore>,
        probe: Arc<dyn BackendProbe>,
        remote: Arc<dyn SessionBackend>,
        mock: Arc<dyn SessionBackend>,
    ) -> Self {
        let (state, _) = watch::channel(Session::initial());
        Self {
            tokens,
            probe,
            remote,
            mock,
            active: RwLock::new(None),
            state,
            mutation: Mutex::new(()),
            epoch: StdMutex::new(0),
        }
    }

    /// Wire storage, probe, API client and both backends from config.
    pub fn from_config(config: &ClientConfig) -> Result<Self, AuthError> {
        let probe = Arc::new(AvailabilityProber::new(config.health_url.clone(), config.probe)?);
        Self::from_config_with_probe(config, probe)
    }

    pub fn from_config_with_probe(config: &ClientConfig, probe: Arc<dyn BackendProbe>) -> Result<Self, AuthError> {
        let storage: Arc<dyn KeyValueStore> = match &config.store_path {
            Some(path) => Arc::new(FileStore::new(path.clone())),
            None => Arc::new(MemoryStore::new()),
        };
        let tokens = Arc::new(TokenStore::new(storage, CookieMirror::new(config.cookie_secure)));
        let api = AuthApi::new(config.api_base_url.clone(), config.timeouts, tokens.clone())?;
        let remote = Arc::new(RemoteBackend::new(api));
        let mock = Arc::new(MockBackend::new(tokens.clone(), config.demo_login));
        Ok(Self::new(tokens, probe, remote, mock))
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Which backend was selected, once one has been.
    #[must_use]
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.active
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|b| b.kind()))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Restore the session on startup. Selects the backend.
    pub async fn bootstrap(&self) {
        self.state.send_modify(|s| s.is_loading = true);
        let epoch = self.epoch();
        let backend = self.select_backend().await;

        let Some(token) = self.tokens.get_token() else {
            self.tokens.clear_user();
            self.publish(Session::anonymous());
            return;
        };

        self.publish(Session { is_loading: true, phase: SessionPhase::Restoring, ..Session::default() });

        match backend.fetch_profile().await {
            Ok(user) => {
                let (user_id, kind) = (user.id.clone(), backend.kind());
                if self.establish(epoch, token, user).is_ok() {
                    tracing::info!(%user_id, backend = ?kind, "session restored");
                }
            }
            Err(e) if e.is_invalid_token() => {
                tracing::info!(error = %e, "stored token rejected; clearing session");
                self.tokens.clear();
                self.publish(Session::anonymous());
            }
            Err(e) => {
                // Transient failure: keep the persisted token for the next attempt.
                tracing::warn!(error = %e, status = e.status, "profile fetch failed during restore");
                match self.tokens.load_user() {
                    Some(user) => self.publish(Session::authenticated(token, user)),
                    None => self.publish(Session::anonymous()),
                }
            }
        }
    }

    pub async fn login(
        &self,
        credentials: &Credentials,
        requested: Option<DashboardKind>,
    ) -> Result<LoginOutcome, AuthError> {
        let _guard = self.begin_mutation()?;
        let epoch = self.epoch();
        let backend = self.backend().await;
        let response = backend.login(credentials).await?;
        let (token, user) = Self::resolve_identity(backend.as_ref(), response).await?;

        if requested == Some(DashboardKind::Provider) && !user.is_provider {
            tracing::info!(user_id = %user.id, "provider dashboard requested by non-provider");
            return Err(AuthError::access_denied(PROVIDER_ACCESS_DENIED));
        }

        let destination = destination_for(&user, requested);
        self.establish(epoch, token, user.clone())?;
        tracing::info!(user_id = %user.id, destination, "signed in");
        Ok(LoginOutcome { user, destination })
    }

    pub async fn register(&self, input: RegisterInput) -> Result<RegisterOutcome, AuthError> {
        let _guard = self.begin_mutation()?;
        let epoch = self.epoch();
        let payload = input.into_payload()?;
        let backend = self.backend().await;
        let response = backend.register(&payload).await?;

        if response.token.is_none() {
            let message = response
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| REGISTERED_PLEASE_LOGIN.to_owned());
            tracing::info!(email = %payload.email, "registered; login required");
            return Ok(RegisterOutcome::PendingLogin { message });
        }

        let (token, user) = Self::resolve_identity(backend.as_ref(), response).await?;
        let destination = destination_for(&user, None);
        self.establish(epoch, token, user.clone())?;
        tracing::info!(user_id = %user.id, "registered and signed in");
        Ok(RegisterOutcome::Authenticated(LoginOutcome { user, destination }))
    }

    /// Drop token and user. Never fails and needs no network.
    pub fn logout(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        self.tokens.clear();
        self.publish(Session::anonymous());
    }

    /// Refresh the user from the backend. Failures are quiet.
    pub async fn fetch_user_profile(&self) -> Option<User> {
        let epoch = self.epoch();
        let token = self.tokens.get_token()?;
        let backend = self.backend().await;
        match backend.fetch_profile().await {
            Ok(user) => {
                self.establish(epoch, token, user.clone()).ok()?;
                Some(user)
            }
            Err(e) if e.is_invalid_token() => {
                tracing::info!(error = %e, "stored token rejected; signing out");
                self.logout();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, status = e.status, "profile refresh failed");
                None
            }
        }
    }

    /// Update the profile remotely, or merge locally when the backend has no
    /// update endpoint.
    pub async fn update_profile(&self, patch: &ProfileUpdate) -> Result<User, AuthError> {
        let _guard = self.begin_mutation()?;
        let epoch = self.epoch();
        let current = self.snapshot();
        let (Some(token), Some(user)) = (current.token, current.user) else {
            return Err(AuthError::unauthorized(NOT_SIGNED_IN));
        };

        let backend = self.backend().await;
        let updated = match backend.update_profile(patch).await {
            Ok(updated) => updated,
            Err(e) if e.is_unsupported() => {
                tracing::info!(fields = patch.len(), "profile update endpoint unsupported; merging locally");
                user.merged_with(patch)?
            }
            Err(e) => {
                if e.is_invalid_token() {
                    self.logout();
                }
                return Err(e);
            }
        };

        self.establish(epoch, token, updated.clone())?;
        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn begin_mutation(&self) -> Result<MutexGuard<'_, ()>, AuthError> {
        self.mutation.try_lock().map_err(|_| {
            tracing::debug!("session mutation rejected; another is in flight");
            AuthError::busy()
        })
    }

    fn publish(&self, session: Session) {
        self.state.send_replace(session);
    }

    fn epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist and publish a signed-in session, unless a logout happened
    /// since `epoch` was read.
    fn establish(&self, epoch: u64, token: String, user: User) -> Result<(), AuthError> {
        let current = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != epoch {
            tracing::info!("signed out while the request was in flight; discarding result");
            return Err(AuthError::unauthorized(SIGNED_OUT_MEANWHILE));
        }
        self.tokens.persist_session(&token, &user);
        self.publish(Session::authenticated(token, user));
        Ok(())
    }

    async fn backend(&self) -> Arc<dyn SessionBackend> {
        let selected = self.active.read().ok().and_then(|slot| slot.clone());
        match selected {
            Some(backend) => backend,
            None => self.select_backend().await,
        }
    }

    async fn select_backend(&self) -> Arc<dyn SessionBackend> {
        let available = self.probe.check_availability().await;
        let chosen = if available { self.remote.clone() } else { self.mock.clone() };
        tracing::info!(backend = ?chosen.kind(), "session backend selected");
        if let Ok(mut slot) = self.active.write() {
            *slot = Some(chosen.clone());
        }
        chosen
    }

    /// Token plus user from an auth response, fetching the profile with the
    /// new token when the response carried none. Storage is not touched.
    async fn resolve_identity(
        backend: &dyn SessionBackend,
        response: AuthResponse,
    ) -> Result<(String, User), AuthError> {
        let token = response
            .token
            .ok_or_else(|| AuthError::server(502, MISSING_TOKEN))?;
        if let Some(user) = response.user {
            return Ok((token, user));
        }
        let user = backend.fetch_profile_with(&token).await?;
        Ok((token, user))
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
