//! Configuration parsed from environment variables.
//!
//! The proxy and the session client read separate settings; both share the
//! HTTP timeout block. A `.env` file is honored by the binaries through
//! `dotenvy` before these are read.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000/api/auth";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_PROBE_CACHE_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    fn from_env() -> Self {
        Self {
            request_secs: env_parse("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

// =============================================================================
// PROXY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub port: u16,
    /// Backend API root, without trailing slash.
    pub backend_url: String,
    pub cookie_secure: bool,
    pub timeouts: HttpTimeouts,
}

impl ProxyConfig {
    /// Read `PORT`, `BACKEND_URL`, `COOKIE_SECURE`, and the timeout block.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };
        let backend_url = trim_url(std::env::var("BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.into()));
        Ok(Self {
            port,
            backend_url,
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
            timeouts: HttpTimeouts::from_env(),
        })
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub cache_window: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            cache_window: Duration::from_secs(DEFAULT_PROBE_CACHE_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Auth API root (the proxy's `/api/auth` by default).
    pub api_base_url: String,
    /// URL hit by the availability probe.
    pub health_url: String,
    pub probe: ProbeConfig,
    pub timeouts: HttpTimeouts,
    /// Where the token/user mirror lives; `None` keeps it in memory.
    pub store_path: Option<PathBuf>,
    pub cookie_secure: bool,
    /// Accept the demo credential while the backend is down.
    pub demo_login: bool,
}

impl ClientConfig {
    /// Read `API_BASE_URL`, `HEALTH_URL` (falls back to `BACKEND_URL`),
    /// `PROBE_TIMEOUT_MS`, `PROBE_CACHE_SECS`, `SESSION_STORE_PATH`,
    /// `COOKIE_SECURE`, `DEMO_LOGIN`, and the timeout block.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = trim_url(std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into()));
        let health_url = std::env::var("HEALTH_URL")
            .or_else(|_| std::env::var("BACKEND_URL"))
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.into());
        if !health_url.starts_with("http://") && !health_url.starts_with("https://") {
            return Err(ConfigError::Invalid { var: "HEALTH_URL", value: health_url });
        }
        let probe = ProbeConfig {
            timeout: Duration::from_millis(env_parse("PROBE_TIMEOUT_MS", DEFAULT_PROBE_TIMEOUT_MS)),
            cache_window: Duration::from_secs(env_parse("PROBE_CACHE_SECS", DEFAULT_PROBE_CACHE_SECS)),
        };
        let store_path = std::env::var("SESSION_STORE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Ok(Self {
            api_base_url,
            health_url,
            probe,
            timeouts: HttpTimeouts::from_env(),
            store_path,
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
            demo_login: env_bool("DEMO_LOGIN").unwrap_or(false),
        })
    }

    /// Defaults pointing at `api_base_url`, used by tests and embedders.
    #[must_use]
    pub fn for_base_url(api_base_url: &str, health_url: &str) -> Self {
        Self {
            api_base_url: trim_url(api_base_url.to_owned()),
            health_url: health_url.to_owned(),
            probe: ProbeConfig::default(),
            timeouts: HttpTimeouts::default(),
            store_path: None,
            cookie_secure: false,
            demo_login: false,
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn trim_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
