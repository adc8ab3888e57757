//! Session backends.
//!
//! ARCHITECTURE
//! ============
//! The controller talks to one [`SessionBackend`], chosen once by the
//! availability probe. [`RemoteBackend`] forwards to the auth API;
//! [`MockBackend`] stands in while the backend is down so a persisted session
//! still renders.

use std::sync::Arc;

use crate::error::AuthError;
use crate::net::{AuthApi, AuthResponse, Credentials};
use crate::storage::TokenStore;
use crate::user::{Address, ProfileUpdate, RegistrationPayload, User, UserType};

pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_PASSWORD: &str = "demo";
pub const MOCK_TOKEN: &str = "mock-demo-token";

const OFFLINE_LOGIN_REJECTED: &str = "Invalid credentials. The service is offline and only the demo account is available.";
const OFFLINE_LOGIN_DISABLED: &str = "The service is offline. Sign-in is unavailable until it is reachable again.";
const OFFLINE_PROFILE_UPDATE: &str = "Profile updates are not supported while the service is offline.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Mock,
}

#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError>;

    async fn register(&self, payload: &RegistrationPayload) -> Result<AuthResponse, AuthError>;

    /// Profile of the user owning the stored token.
    async fn fetch_profile(&self) -> Result<User, AuthError>;

    /// Profile for a freshly issued token that is not stored yet.
    async fn fetch_profile_with(&self, token: &str) -> Result<User, AuthError>;

    async fn update_profile(&self, patch: &ProfileUpdate) -> Result<User, AuthError>;
}

// =============================================================================
// REMOTE
// =============================================================================

pub struct RemoteBackend {
    api: AuthApi,
}

impl RemoteBackend {
    #[must_use]
    pub fn new(api: AuthApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl SessionBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        self.api.login(credentials).await
    }

    async fn register(&self, payload: &RegistrationPayload) -> Result<AuthResponse, AuthError> {
        self.api.register(payload).await
    }

    async fn fetch_profile(&self) -> Result<User, AuthError> {
        self.api.get_profile().await
    }

    async fn fetch_profile_with(&self, token: &str) -> Result<User, AuthError> {
        self.api.get_profile_with_token(token).await
    }

    async fn update_profile(&self, patch: &ProfileUpdate) -> Result<User, AuthError> {
        self.api.update_profile(patch).await
    }
}

// =============================================================================
// MOCK
// =============================================================================

/// Deterministic placeholder identity used by the offline backend.
#[must_use]
pub fn demo_user() -> User {
    User {
        id: "demo-user".into(),
        email: DEMO_EMAIL.into(),
        first_name: "Demo".into(),
        last_name: "User".into(),
        username: DEMO_USERNAME.into(),
        user_type: UserType::Customer,
        is_provider: false,
        contact: Some("9800000000".into()),
        address: Some(Address { city: "Kathmandu".into(), area: "Thamel".into() }),
        verified: true,
        ..User::default()
    }
}

pub struct MockBackend {
    tokens: Arc<TokenStore>,
    demo_login: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new(tokens: Arc<TokenStore>, demo_login: bool) -> Self {
        Self { tokens, demo_login }
    }

    fn is_demo(credentials: &Credentials) -> bool {
        let id = credentials.identifier.trim();
        (id.eq_ignore_ascii_case(DEMO_USERNAME) || id.eq_ignore_ascii_case(DEMO_EMAIL))
            && credentials.password == DEMO_PASSWORD
    }
}

#[async_trait::async_trait]
impl SessionBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        if !self.demo_login {
            return Err(AuthError::unauthorized(OFFLINE_LOGIN_DISABLED));
        }
        if !Self::is_demo(credentials) {
            return Err(AuthError::unauthorized(OFFLINE_LOGIN_REJECTED));
        }
        tracing::warn!("backend offline; signing in with the demo account");
        Ok(AuthResponse { token: Some(MOCK_TOKEN.to_owned()), user: Some(demo_user()), message: None })
    }

    async fn register(&self, _payload: &RegistrationPayload) -> Result<AuthResponse, AuthError> {
        Err(AuthError::network())
    }

    async fn fetch_profile(&self) -> Result<User, AuthError> {
        if self.tokens.get_token().is_none() {
            return Err(AuthError::unauthorized("Authentication credentials were not provided."));
        }
        Ok(self.tokens.load_user().unwrap_or_else(demo_user))
    }

    async fn fetch_profile_with(&self, token: &str) -> Result<User, AuthError> {
        if token != MOCK_TOKEN {
            return Err(AuthError::unauthorized("Given token not valid for the offline service."));
        }
        Ok(demo_user())
    }

    async fn update_profile(&self, _patch: &ProfileUpdate) -> Result<User, AuthError> {
        Err(AuthError::unsupported(OFFLINE_PROFILE_UPDATE))
    }
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
