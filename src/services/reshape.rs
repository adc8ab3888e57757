//! Backend JSON → frontend JSON.
//!
//! The backend speaks snake_case and is loose about where the user and the
//! token live. Frontend consumers read camelCase. Reshaping keeps every
//! original key and adds the camelCase aliases next to them, so both kinds of
//! reader work off the same payload.

use serde_json::{Map, Value, json};

use crate::user::split_name;

/// Keys that carry the bearer token, in preference order.
const TOKEN_KEYS: &[&str] = &["token", "access", "access_token", "key"];

/// snake_case → camelCase aliases added to every user.
const ALIASES: &[(&str, &str)] = &[
    ("first_name", "firstName"),
    ("last_name", "lastName"),
    ("is_provider", "isProvider"),
    ("experience_years", "experienceYears"),
    ("service_category", "serviceCategory"),
    ("document_category", "documentCategory"),
    ("document_id", "documentId"),
    ("organization_name", "organizationName"),
    ("organization_registration", "organizationRegistration"),
    ("is_verified", "isVerified"),
];

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn provider_flag(map: &Map<String, Value>) -> bool {
    for key in ["is_provider", "isProvider"] {
        if let Some(flag) = map.get(key).and_then(Value::as_bool) {
            return flag;
        }
    }
    ["user_type", "userType"]
        .iter()
        .filter_map(|key| non_empty_str(map, key))
        .any(|t| t.eq_ignore_ascii_case("provider"))
}

/// Reshape one backend user for the frontend.
#[must_use]
pub fn frontend_user(raw: &Value) -> Value {
    let Value::Object(source) = raw else {
        return raw.clone();
    };
    let mut user = source.clone();

    let has_first = non_empty_str(&user, "first_name").or_else(|| non_empty_str(&user, "firstName"));
    let has_last = non_empty_str(&user, "last_name").or_else(|| non_empty_str(&user, "lastName"));
    if has_first.is_none() && has_last.is_none() {
        let full = non_empty_str(&user, "full_name").or_else(|| non_empty_str(&user, "name"));
        if let Some(full) = full {
            let (first, last) = split_name(full);
            user.insert("first_name".into(), json!(first));
            user.insert("last_name".into(), json!(last));
        }
    }

    let is_provider = provider_flag(&user);
    user.insert("is_provider".into(), json!(is_provider));

    for (snake, camel) in ALIASES {
        if let Some(value) = user.get(*snake).cloned() {
            user.entry(*camel).or_insert(value);
        }
    }
    // `firstName` may already exist while `first_name` does not.
    for (snake, camel) in [("first_name", "firstName"), ("last_name", "lastName")] {
        if let Some(value) = user.get(camel).cloned() {
            user.entry(snake).or_insert(value);
        }
    }

    let phone = user.get("contact").or_else(|| user.get("phone")).cloned();
    if let Some(phone) = phone {
        user.entry("phone").or_insert_with(|| phone.clone());
        user.entry("contact").or_insert(phone);
    }

    user.insert("isProvider".into(), json!(is_provider));
    user.insert("userType".into(), json!(if is_provider { "provider" } else { "customer" }));
    user.insert("canAccessProvider".into(), json!(is_provider));
    user.insert("canAccessCustomer".into(), json!(true));
    Value::Object(user)
}

/// `firstName` → `first_name`; snake_case keys pass through.
#[must_use]
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Reshape a frontend profile patch into backend field names. Derived
/// access flags are dropped; `phone` becomes `contact`.
#[must_use]
pub fn backend_patch(patch: &Value) -> Value {
    let Value::Object(source) = patch else {
        return patch.clone();
    };
    let mut out = Map::with_capacity(source.len());
    for (key, value) in source {
        let snake = match to_snake_case(key).as_str() {
            "can_access_provider" | "can_access_customer" => continue,
            "phone" => "contact".to_owned(),
            other => other.to_owned(),
        };
        // An explicit snake_case key wins over its camelCase twin.
        if snake == *key || !out.contains_key(&snake) {
            out.insert(snake, value.clone());
        }
    }
    Value::Object(out)
}

/// The user inside `{ "user": {...} }`, or the body itself.
#[must_use]
pub fn unwrap_user(body: &Value) -> &Value {
    match body.get("user") {
        Some(inner) if inner.is_object() => inner,
        _ => body,
    }
}

/// Pieces of a login/register success body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthBody {
    pub token: Option<String>,
    pub user: Option<Value>,
    pub message: Option<String>,
}

impl AuthBody {
    #[must_use]
    pub fn from_backend(body: &Value) -> Self {
        let token = TOKEN_KEYS
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        let user = body.get("user").filter(|u| u.is_object()).cloned();
        let message = body.get("message").and_then(Value::as_str).map(str::to_owned);
        Self { token, user, message }
    }

    /// `{ token, user, message? }` with the user reshaped.
    #[must_use]
    pub fn into_frontend(self) -> Value {
        let mut out = Map::new();
        out.insert("token".into(), self.token.map_or(Value::Null, Value::String));
        out.insert("user".into(), self.user.as_ref().map_or(Value::Null, frontend_user));
        if let Some(message) = self.message {
            out.insert("message".into(), Value::String(message));
        }
        Value::Object(out)
    }
}

#[cfg(test)]
#[path = "reshape_test.rs"]
mod tests;
