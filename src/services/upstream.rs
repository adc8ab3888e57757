//! Upstream backend calls made by the proxy.
//!
//! DESIGN
//! ======
//! Every handler funnels through [`send`]: one JSON request, one decoded JSON
//! body, and one error type. [`first_available`] walks an ordered list of
//! candidate paths because deployments disagree about where the profile
//! endpoint lives; a 404 moves on to the next candidate, anything else ends
//! the walk.
//!
//! ERROR MAPPING
//! =============
//! Unreachable → 503, timeout → 504, undecodable success → 502. A non-2xx
//! upstream status is passed through with the upstream body so the client's
//! error normalizer sees exactly what the backend said.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use reqwest::Method;
use serde_json::{Value, json};

use crate::state::AppState;

pub const LOGIN_PATH: &str = "/login/";
pub const REGISTER_PATH: &str = "/register/";

/// Where deployments have served the current user's profile.
pub const PROFILE_CANDIDATES: &[&str] = &["/profile/", "/user/", "/auth/user/", "/me/"];

/// Where deployments have accepted profile updates.
pub const UPDATE_CANDIDATES: &[&str] = &["/profile/", "/provider/profile/", "/user/"];

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend timed out")]
    Timeout,
    #[error("backend returned {status}")]
    Status { status: u16, body: Value },
    #[error("undecodable backend response: {0}")]
    Decode(String),
    #[error("HTTP client build failed: {0}")]
    Client(String),
}

impl UpstreamError {
    fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() { Self::Timeout } else { Self::Unreachable(err.to_string()) }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Decode(_) => StatusCode::BAD_GATEWAY,
            Self::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Status { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Status { body, .. } => body,
            Self::Unreachable(_) => json!({ "message": "Unable to reach the backend service." }),
            Self::Timeout => json!({ "message": "The backend service took too long to respond." }),
            Self::Decode(_) => json!({ "message": "The backend service returned an unexpected response." }),
            Self::Client(_) => json!({ "message": "Internal error." }),
        };
        (status, Json(body)).into_response()
    }
}

/// Decode a body as JSON. Empty bodies decode to an empty object.
fn decode(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return Some(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(text).ok()
}

/// One JSON request against the backend.
pub async fn send(
    state: &AppState,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> Result<Value, UpstreamError> {
    let url = format!("{}{path}", state.backend_url);
    let mut request = state
        .http
        .request(method.clone(), &url)
        .header("Accept", "application/json");
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request.send().await.map_err(|e| {
        tracing::warn!(%method, path, error = %e, "backend request failed");
        UpstreamError::from_transport(&e)
    })?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| UpstreamError::from_transport(&e))?;

    if !(200..300).contains(&status) {
        tracing::info!(%method, path, status, "backend rejected request");
        let body = decode(&text)
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({ "message": text.trim() }));
        return Err(UpstreamError::Status { status, body });
    }

    decode(&text).ok_or_else(|| {
        tracing::error!(%method, path, status, "backend returned non-JSON success body");
        UpstreamError::Decode(format!("{method} {path}"))
    })
}

/// Try each candidate path in order. `Ok(None)` means every candidate
/// answered 404.
pub async fn first_available(
    state: &AppState,
    method: Method,
    candidates: &[&str],
    token: &str,
    body: Option<&Value>,
) -> Result<Option<Value>, UpstreamError> {
    for path in candidates {
        match send(state, method.clone(), path, Some(token), body).await {
            Ok(value) => {
                tracing::debug!(%method, path, "candidate endpoint answered");
                return Ok(Some(value));
            }
            Err(UpstreamError::Status { status: 404, .. }) => {
                tracing::debug!(%method, path, "candidate endpoint missing; trying next");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::warn!(%method, tried = candidates.len(), "no candidate endpoint found");
    Ok(None)
}

#[cfg(test)]
#[path = "upstream_test.rs"]
mod tests;
