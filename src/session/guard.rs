//! Route guards.
//!
//! SYSTEM CONTEXT
//! ==============
//! Pages consult these before rendering. Decisions are pure functions of the
//! current [`Session`], so a guard never triggers a network call.

use super::controller::Session;

pub const LOGIN_PATH: &str = "/login";
pub const CUSTOMER_DASHBOARD: &str = "/dashboard";
pub const PROVIDER_DASHBOARD: &str = "/dashboard/provider";

/// Path prefixes that need a signed-in user.
const PROTECTED_PREFIXES: &[&str] = &["/dashboard", "/profile", "/bookings", "/messages", "/earnings", "/settings"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    Public,
    Authenticated,
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Session still loading; render a placeholder.
    Pending,
    Redirect(&'static str),
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

#[must_use]
pub fn scope_for(path: &str) -> RouteScope {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };
    if matches_prefix(path, PROVIDER_DASHBOARD) {
        RouteScope::Provider
    } else if PROTECTED_PREFIXES.iter().any(|prefix| matches_prefix(path, prefix)) {
        RouteScope::Authenticated
    } else {
        RouteScope::Public
    }
}

/// Redirect to `/login` whenever auth has loaded and no user is present.
#[must_use]
pub fn should_redirect_unauth(session: &Session) -> bool {
    !session.is_loading && !session.is_authenticated()
}

#[must_use]
pub fn evaluate(path: &str, session: &Session) -> GuardDecision {
    let scope = scope_for(path);
    if scope == RouteScope::Public {
        return GuardDecision::Allow;
    }
    if session.is_loading {
        return GuardDecision::Pending;
    }
    let Some(user) = session.user.as_ref() else {
        return GuardDecision::Redirect(LOGIN_PATH);
    };
    if scope == RouteScope::Provider && !user.is_provider {
        return GuardDecision::Redirect(CUSTOMER_DASHBOARD);
    }
    GuardDecision::Allow
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
