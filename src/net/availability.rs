//! Backend availability probe.
//!
//! DESIGN
//! ======
//! Every session entry point (bootstrap, login, register) has to decide
//! between the real backend and the local stand-in without hanging on a dead
//! host. The probe is a single time-bounded GET whose boolean result is cached
//! for a short window. The cache lock is held across the request, so
//! concurrent callers share one in-flight probe instead of stampeding.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::ProbeConfig;
use crate::error::AuthError;

/// Decides whether the remote backend should be used.
#[async_trait::async_trait]
pub trait BackendProbe: Send + Sync {
    /// `true` when the backend answered. Never fails.
    async fn check_availability(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityStatus {
    pub is_available: bool,
    pub last_checked: Instant,
    pub error: Option<String>,
}

impl AvailabilityStatus {
    fn is_fresh(&self, window: Duration) -> bool {
        self.last_checked.elapsed() < window
    }
}

// =============================================================================
// HTTP PROBE
// =============================================================================

pub struct AvailabilityProber {
    http: reqwest::Client,
    url: String,
    cache_window: Duration,
    cached: Mutex<Option<AvailabilityStatus>>,
}

impl AvailabilityProber {
    pub fn new(url: impl Into<String>, config: ProbeConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::server(500, format!("HTTP client build failed: {e}")))?;
        Ok(Self { http, url: url.into(), cache_window: config.cache_window, cached: Mutex::new(None) })
    }

    /// Last recorded probe result, fresh or not.
    pub async fn status(&self) -> Option<AvailabilityStatus> {
        self.cached.lock().await.clone()
    }

    /// Forget the cached result so the next check probes again.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn probe(&self) -> AvailabilityStatus {
        let started = Instant::now();
        let outcome = self.http.get(&self.url).send().await;
        let (is_available, error) = match outcome {
            Ok(resp) if resp.status().is_server_error() => (false, Some(format!("status {}", resp.status().as_u16()))),
            Ok(_) => (true, None),
            Err(e) if e.is_timeout() => (false, Some("timed out".to_owned())),
            Err(e) => (false, Some(e.to_string())),
        };
        tracing::debug!(
            url = %self.url,
            is_available,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            error = error.as_deref().unwrap_or(""),
            "backend probe finished"
        );
        AvailabilityStatus { is_available, last_checked: Instant::now(), error }
    }
}

#[async_trait::async_trait]
impl BackendProbe for AvailabilityProber {
    async fn check_availability(&self) -> bool {
        let mut cached = self.cached.lock().await;
        if let Some(status) = cached.as_ref().filter(|s| s.is_fresh(self.cache_window)) {
            return status.is_available;
        }
        let status = self.probe().await;
        if !status.is_available {
            tracing::warn!(url = %self.url, error = status.error.as_deref().unwrap_or(""), "backend unavailable");
        }
        let available = status.is_available;
        *cached = Some(status);
        available
    }
}

// =============================================================================
// STATIC PROBE
// =============================================================================

/// A probe with a fixed answer, for offline mode.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

#[async_trait::async_trait]
impl BackendProbe for StaticProbe {
    async fn check_availability(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
#[path = "availability_test.rs"]
mod tests;
