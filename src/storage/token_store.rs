//! Bearer token + user mirror persistence.
//!
//! The token is written to storage and mirrored into an `auth_token` cookie so
//! server-side routes can match on it. The current user is kept alongside as
//! serialized JSON so a restart can restore the session without a round trip.

use std::sync::{Arc, Mutex};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use super::KeyValueStore;
use crate::user::User;

pub const TOKEN_KEY: &str = "authToken";
pub const USER_KEY: &str = "user";
pub const TOKEN_COOKIE: &str = "auth_token";

pub const COOKIE_MAX_AGE_DAYS: i64 = 7;

// =============================================================================
// COOKIE MIRROR
// =============================================================================

/// In-process cookie jar holding the token mirror.
#[derive(Debug, Default)]
pub struct CookieMirror {
    jar: Mutex<CookieJar>,
    secure: bool,
}

impl CookieMirror {
    #[must_use]
    pub fn new(secure: bool) -> Self {
        Self { jar: Mutex::new(CookieJar::new()), secure }
    }

    pub fn set(&self, name: &'static str, value: &str) {
        let cookie = Cookie::build((name, value.to_owned()))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
            .build();
        if let Ok(mut jar) = self.jar.lock() {
            *jar = jar.clone().add(cookie);
        }
    }

    pub fn remove(&self, name: &'static str) {
        if let Ok(mut jar) = self.jar.lock() {
            *jar = jar.clone().remove(Cookie::from(name));
        }
    }

    /// `Cookie` request header carrying every mirrored cookie.
    #[must_use]
    pub fn header(&self) -> Option<String> {
        let jar = self.jar.lock().ok()?;
        let pairs: Vec<String> = jar
            .iter()
            .filter(|c| !c.value().is_empty())
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect();
        if pairs.is_empty() { None } else { Some(pairs.join("; ")) }
    }
}

// =============================================================================
// TOKEN STORE
// =============================================================================

pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    cookies: CookieMirror,
}

impl TokenStore {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, cookies: CookieMirror) -> Self {
        let store = Self { storage, cookies };
        // Re-seed the cookie mirror from persisted storage.
        if let Some(token) = store.get_token() {
            store.cookies.set(TOKEN_COOKIE, &token);
        }
        store
    }

    /// Store or remove the bearer token in storage and cookie mirror together.
    pub fn set_token(&self, token: Option<&str>) {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                self.storage.set(TOKEN_KEY, token);
                self.cookies.set(TOKEN_COOKIE, token);
            }
            None => {
                self.storage.remove(TOKEN_KEY);
                self.cookies.remove(TOKEN_COOKIE);
            }
        }
    }

    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        self.cookies.header()
    }

    pub fn save_user(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(raw) => self.storage.set(USER_KEY, &raw),
            Err(e) => tracing::warn!(error = %e, "failed to serialize user mirror"),
        }
    }

    #[must_use]
    pub fn load_user(&self) -> Option<User> {
        let raw = self.storage.get(USER_KEY)?;
        let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
        User::from_json(&value).ok()
    }

    pub fn clear_user(&self) {
        self.storage.remove(USER_KEY);
    }

    /// Persist token and user as one step.
    pub fn persist_session(&self, token: &str, user: &User) {
        self.set_token(Some(token));
        self.save_user(user);
    }

    pub fn clear(&self) {
        self.set_token(None);
        self.clear_user();
    }
}

#[cfg(test)]
#[path = "token_store_test.rs"]
mod tests;
