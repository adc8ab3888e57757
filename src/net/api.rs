//! Auth API client.
//!
//! Thin request wrapper over `reqwest`: JSON bodies in and out, bearer token
//! and `auth_token` cookie from the [`TokenStore`] when one is present, and
//! every failure funneled through [`AuthError::from_response`] /
//! [`AuthError::from_transport`].

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HttpTimeouts;
use crate::error::AuthError;
use crate::storage::TokenStore;
use crate::user::{ProfileUpdate, RegistrationPayload, User};

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const PROFILE_PATH: &str = "/profile";

/// Login form input. `identifier` is an email or a username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), password: password.into() }
    }
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    password: &'a str,
}

impl<'a> From<&'a Credentials> for LoginBody<'a> {
    fn from(creds: &'a Credentials) -> Self {
        let identifier = creds.identifier.trim();
        if identifier.contains('@') {
            Self { email: Some(identifier), username: None, password: &creds.password }
        } else {
            Self { email: None, username: Some(identifier), password: &creds.password }
        }
    }
}

/// Success body of login/register, tolerant of the backend's token key names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawAuthResponse {
    #[serde(alias = "access", alias = "access_token", alias = "key")]
    token: Option<String>,
    user: Option<Value>,
    message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub user: Option<User>,
    pub message: Option<String>,
}

/// Parse a login/register success body.
pub fn parse_auth_response(body: &str) -> Result<AuthResponse, AuthError> {
    let raw: RawAuthResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::server(502, format!("Unexpected auth response: {e}")))?;
    let user = raw.user.as_ref().map(User::from_json).transpose()?;
    Ok(AuthResponse { token: raw.token.filter(|t| !t.is_empty()), user, message: raw.message })
}

/// Parse a profile body, which is either the user itself or `{ "user": ... }`.
pub fn parse_profile(body: &str) -> Result<User, AuthError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AuthError::server(502, format!("Unexpected profile response: {e}")))?;
    match value.get("user") {
        Some(inner) if inner.is_object() => User::from_json(inner),
        _ => User::from_json(&value),
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct AuthApi {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl AuthApi {
    pub fn new(base_url: impl Into<String>, timeouts: HttpTimeouts, tokens: Arc<TokenStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| AuthError::server(500, format!("HTTP client build failed: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, tokens })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        let body = LoginBody::from(credentials);
        let text = self
            .send(self.request(Method::POST, LOGIN_PATH).json(&body))
            .await?;
        parse_auth_response(&text)
    }

    pub async fn register(&self, payload: &RegistrationPayload) -> Result<AuthResponse, AuthError> {
        let text = self
            .send(self.request(Method::POST, REGISTER_PATH).json(payload))
            .await?;
        parse_auth_response(&text)
    }

    pub async fn get_profile(&self) -> Result<User, AuthError> {
        let text = self.send(self.request(Method::GET, PROFILE_PATH)).await?;
        parse_profile(&text)
    }

    /// Profile for a token that has not been stored yet.
    pub async fn get_profile_with_token(&self, token: &str) -> Result<User, AuthError> {
        let request = self.endpoint(Method::GET, PROFILE_PATH).bearer_auth(token);
        let text = self.send(request).await?;
        parse_profile(&text)
    }

    pub async fn update_profile(&self, patch: &ProfileUpdate) -> Result<User, AuthError> {
        let text = self
            .send(self.request(Method::PATCH, PROFILE_PATH).json(patch))
            .await?;
        parse_profile(&text)
    }

    fn endpoint(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header(header::ACCEPT, "application/json")
    }

    /// Request carrying the stored session: bearer token plus the cookie
    /// mirror, which the auth proxy also accepts.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.endpoint(method, path);
        if let Some(cookies) = self.tokens.cookie_header() {
            builder = builder.header(header::COOKIE, cookies);
        }
        match self.tokens.get_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, AuthError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "auth request failed");
            AuthError::from_transport(&e)
        })?;
        let status = response.status().as_u16();
        let url = response.url().path().to_owned();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::from_transport(&e))?;
        if !(200..300).contains(&status) {
            let err = AuthError::from_response(status, &text);
            tracing::info!(path = %url, status, kind = ?err.kind, "auth request rejected");
            return Err(err);
        }
        Ok(text)
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
