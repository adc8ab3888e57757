//! Client-side auth error type.
//!
//! DESIGN
//! ======
//! The backend is inconsistent about how it reports failures: some endpoints
//! return `{"detail": ...}`, some return DRF-style field maps, some nest
//! everything under `errors`. Every response is normalized exactly once, at
//! the API-client boundary, into an [`AuthError`] tagged by [`ErrorKind`], so
//! nothing downstream inspects raw JSON shapes.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

pub const NETWORK_ERROR_MESSAGE: &str = "Unable to reach the server. Check your connection and try again.";
pub const TIMEOUT_ERROR_MESSAGE: &str = "The server took too long to respond. Please try again.";
pub const BUSY_ERROR_MESSAGE: &str = "Another request is already in progress.";

pub const STATUS_NETWORK: u16 = 503;
pub const STATUS_TIMEOUT: u16 = 408;

/// Code emitted by the proxy when no profile-update endpoint exists upstream.
pub const ENDPOINT_NOT_SUPPORTED: &str = "endpoint_not_supported";
/// Code used by token-based backends for expired or malformed tokens.
pub const TOKEN_NOT_VALID: &str = "token_not_valid";

/// Keys whose value is the error message, in precedence order.
const MESSAGE_KEYS: [&str; 3] = ["message", "detail", "error"];

/// Keys that carry a message or metadata rather than a field error.
const RESERVED_KEYS: &[&str] = &["message", "detail", "error", "non_field_errors", "code", "status", "errors"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Backend unreachable or timed out.
    Network,
    /// Rejected credentials or an invalid session token.
    Auth,
    /// Field-level or request validation failure.
    Validation,
    /// The backend does not implement the requested capability.
    Unsupported,
    /// Authenticated, but not allowed where the caller asked to go.
    AccessDenied,
    /// A session mutation is already in flight.
    Busy,
    /// Anything else the backend reports (5xx, undecodable bodies).
    Server,
}

/// A normalized auth/session error with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
    pub code: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl AuthError {
    fn new(kind: ErrorKind, status: u16, message: impl Into<String>) -> Self {
        Self { kind, status, message: message.into(), code: None, fields: BTreeMap::new() }
    }

    #[must_use]
    pub fn network() -> Self {
        Self::new(ErrorKind::Network, STATUS_NETWORK, NETWORK_ERROR_MESSAGE)
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Network, STATUS_TIMEOUT, TIMEOUT_ERROR_MESSAGE)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, 401, message)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self { fields, ..Self::new(ErrorKind::Validation, 400, message) }
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self { code: Some(ENDPOINT_NOT_SUPPORTED.to_owned()), ..Self::new(ErrorKind::Unsupported, 404, message) }
    }

    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, 403, message)
    }

    #[must_use]
    pub fn busy() -> Self {
        Self::new(ErrorKind::Busy, 409, BUSY_ERROR_MESSAGE)
    }

    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, status, message)
    }

    /// Map a transport failure from `reqwest` onto the network taxonomy.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() { Self::timeout() } else { Self::network() }
    }

    /// Normalize a non-2xx response body into one error.
    ///
    /// Message precedence: explicit `message`/`detail`/`error` text, then
    /// `non_field_errors`, then every field as `"field: detail"` joined with
    /// `". "`. A message key holding an object contributes its entries as
    /// fields.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let Some(Value::Object(root)) = parsed else {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() || trimmed.starts_with('<') {
                format!("Request failed with status {status}")
            } else {
                trimmed.to_owned()
            };
            return Self::new(kind_for_status(status, None, &message), status, message);
        };

        // Some endpoints wrap everything in `{"errors": {...}}`.
        let scope = match root.get("errors") {
            Some(Value::Object(nested)) => nested,
            _ => &root,
        };

        let code = string_at(&root, "code").or_else(|| string_at(scope, "code"));

        let mut fields = BTreeMap::new();
        for (key, value) in scope {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            collect_field(key, value, &mut fields);
        }

        // A message key may hold text, a list of texts, or its own field map.
        let mut explicit = None;
        for key in MESSAGE_KEYS {
            for value in [root.get(key), scope.get(key)].into_iter().flatten() {
                match value {
                    Value::Object(nested) => {
                        for (field, detail) in nested {
                            collect_field(field, detail, &mut fields);
                        }
                    }
                    Value::String(_) | Value::Array(_) if explicit.is_none() => {
                        explicit = Some(flatten_detail(value)).filter(|text| !text.is_empty());
                    }
                    _ => {}
                }
            }
        }

        let non_field = scope
            .get("non_field_errors")
            .or_else(|| root.get("non_field_errors"))
            .map(flatten_detail)
            .filter(|text| !text.is_empty());

        let message = explicit.or(non_field).unwrap_or_else(|| {
            if fields.is_empty() {
                format!("Request failed with status {status}")
            } else {
                fields
                    .iter()
                    .map(|(field, detail)| format!("{field}: {detail}"))
                    .collect::<Vec<_>>()
                    .join(". ")
            }
        });

        let kind = kind_for_status(status, code.as_deref(), &message);
        Self { kind, status, message, code, fields }
    }

    /// A 401 that specifically means the stored token is no longer valid.
    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        if self.status != 401 {
            return false;
        }
        if self.code.as_deref() == Some(TOKEN_NOT_VALID) {
            return true;
        }
        let lower = self.message.to_ascii_lowercase();
        ["token", "unauthorized", "expired", "authentication credentials"]
            .iter()
            .any(|needle| lower.contains(needle))
    }

    /// A 404 reporting that the backend lacks the endpoint altogether.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        self.kind == ErrorKind::Unsupported
    }
}

fn kind_for_status(status: u16, code: Option<&str>, message: &str) -> ErrorKind {
    match status {
        401 => ErrorKind::Auth,
        403 => ErrorKind::AccessDenied,
        404 if code == Some(ENDPOINT_NOT_SUPPORTED) || message.to_ascii_lowercase().contains("not supported") => {
            ErrorKind::Unsupported
        }
        408 | 502..=504 => ErrorKind::Network,
        400..=499 => ErrorKind::Validation,
        _ => ErrorKind::Server,
    }
}

fn string_at(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Flatten one field's detail (string, array, or scalar) into text.
fn flatten_detail(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Array(items) => items
            .iter()
            .map(flatten_detail)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", flatten_detail(v)))
            .collect::<Vec<_>>()
            .join(". "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Collect field errors, descending into nested objects as `parent.child`.
fn collect_field(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                collect_field(&format!("{prefix}.{key}"), nested, out);
            }
        }
        other => {
            let detail = flatten_detail(other);
            if !detail.is_empty() {
                out.insert(prefix.to_owned(), detail);
            }
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
