//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The proxy sits between the frontend and the marketplace backend. It only
//! exposes the auth surface: login, register, and the current user's profile,
//! each reshaped from backend JSON into the frontend's user model.

pub mod auth;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route(
            "/api/auth/profile",
            get(auth::profile)
                .patch(auth::update_profile)
                .post(auth::update_profile),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
