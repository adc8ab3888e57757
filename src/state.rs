//! Shared proxy state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. The
//! proxy keeps no per-user state: it holds one pooled HTTP client for the
//! upstream backend plus the settings handlers need to shape responses.

use crate::config::ProxyConfig;
use crate::services::upstream::UpstreamError;

/// Clone is required by Axum; `reqwest::Client` is an `Arc` internally.
#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    /// Backend API root, without trailing slash.
    pub backend_url: String,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(config: &ProxyConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;
        Ok(Self { http, backend_url: config.backend_url.trim_end_matches('/').to_owned(), cookie_secure: config.cookie_secure })
    }
}
