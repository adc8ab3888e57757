//! Auth routes: login, register, and the current user's profile.

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{Map, Value, json};
use time::Duration;

use crate::error::{AuthError, ENDPOINT_NOT_SUPPORTED};
use crate::services::reshape::{AuthBody, backend_patch, frontend_user, unwrap_user};
use crate::services::upstream::{self, LOGIN_PATH, PROFILE_CANDIDATES, REGISTER_PATH, UPDATE_CANDIDATES};
use crate::state::AppState;
use crate::storage::token_store::{COOKIE_MAX_AGE_DAYS, TOKEN_COOKIE};
use crate::user::RegisterInput;

const MISSING_TOKEN: &str = "Authentication credentials were not provided.";
const PROFILE_NOT_FOUND: &str = "No profile endpoint is available on the server.";
const UPDATE_NOT_SUPPORTED: &str = "Profile update is not supported by the server.";

// =============================================================================
// TOKEN EXTRACTOR
// =============================================================================

/// Bearer token from `Authorization`, else the `auth_token` cookie.
/// Use as a handler parameter to require a token.
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);

        let token = from_header.or_else(|| {
            CookieJar::from_headers(&parts.headers)
                .get(TOKEN_COOKIE)
                .map(Cookie::value)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
        });

        token
            .map(Self)
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, Json(json!({ "message": MISSING_TOKEN }))).into_response())
    }
}

fn token_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

/// Field errors in the backend's `{ field: [detail], message }` shape.
fn validation_response(err: &AuthError) -> Response {
    let mut body = Map::new();
    for (field, detail) in &err.fields {
        body.insert(field.clone(), json!([detail]));
    }
    body.insert("message".into(), json!(err.message));
    (StatusCode::BAD_REQUEST, Json(Value::Object(body))).into_response()
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/auth/login`: forward credentials, reshape the session.
pub async fn login(State(state): State<AppState>, jar: CookieJar, Json(body): Json<Value>) -> Response {
    match upstream::send(&state, Method::POST, LOGIN_PATH, None, Some(&body)).await {
        Ok(response) => complete_auth(&state, jar, &response).await,
        Err(e) => e.into_response(),
    }
}

/// `POST /api/auth/register`: accept either naming, emit the backend shape.
pub async fn register(State(state): State<AppState>, jar: CookieJar, Json(body): Json<Value>) -> Response {
    let input: RegisterInput = match serde_json::from_value(body) {
        Ok(input) => input,
        Err(e) => {
            tracing::info!(error = %e, "malformed registration body");
            return (StatusCode::BAD_REQUEST, Json(json!({ "message": format!("Invalid registration data: {e}") })))
                .into_response();
        }
    };
    let payload = match input.into_payload() {
        Ok(payload) => payload,
        Err(e) => return validation_response(&e),
    };
    let payload = match serde_json::to_value(&payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "registration payload serialization failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match upstream::send(&state, Method::POST, REGISTER_PATH, None, Some(&payload)).await {
        Ok(response) => complete_auth(&state, jar, &response).await,
        Err(e) => e.into_response(),
    }
}

/// `GET /api/auth/profile`: first profile endpoint the backend serves.
pub async fn profile(State(state): State<AppState>, BearerToken(token): BearerToken) -> Response {
    match upstream::first_available(&state, Method::GET, PROFILE_CANDIDATES, &token, None).await {
        Ok(Some(body)) => Json(json!({ "user": frontend_user(unwrap_user(&body)) })).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "message": PROFILE_NOT_FOUND }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `PATCH|POST /api/auth/profile`: first update endpoint the backend accepts.
pub async fn update_profile(
    State(state): State<AppState>,
    method: Method,
    BearerToken(token): BearerToken,
    Json(patch): Json<Value>,
) -> Response {
    let patch = backend_patch(&patch);
    let updated = match upstream::first_available(&state, method, UPDATE_CANDIDATES, &token, Some(&patch)).await {
        Ok(Some(body)) => body,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "code": ENDPOINT_NOT_SUPPORTED, "message": UPDATE_NOT_SUPPORTED })),
            )
                .into_response();
        }
        Err(e) => return e.into_response(),
    };

    // Some deployments answer an update with an empty body.
    let user = unwrap_user(&updated);
    if user.as_object().is_some_and(|m| !m.is_empty()) {
        return Json(json!({ "user": frontend_user(user) })).into_response();
    }
    profile(State(state), BearerToken(token)).await
}

/// Reshape a login/register success, resolving the user when the backend
/// sent only a token.
async fn complete_auth(state: &AppState, jar: CookieJar, response: &Value) -> Response {
    let mut auth = AuthBody::from_backend(response);

    if auth.user.is_none()
        && let Some(token) = auth.token.as_deref()
    {
        match upstream::first_available(state, Method::GET, PROFILE_CANDIDATES, token, None).await {
            Ok(Some(body)) => auth.user = Some(unwrap_user(&body).clone()),
            Ok(None) => tracing::warn!("token issued but no profile endpoint answered"),
            Err(e) => tracing::warn!(error = %e, "profile lookup after auth failed"),
        }
    }

    let jar = match auth.token.clone() {
        Some(token) => jar.add(token_cookie(token, state.cookie_secure)),
        None => jar,
    };
    (jar, Json(auth.into_frontend())).into_response()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
