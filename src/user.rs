//! Marketplace user model and registration payload shaping.
//!
//! SYSTEM CONTEXT
//! ==============
//! The frontend speaks camelCase (`firstName`, `isProvider`); the backend
//! speaks snake_case with a nested `address` and `contact` instead of `phone`.
//! [`User`] serializes in the frontend shape and accepts either shape on the
//! way in. [`RegisterInput`] does the same for sign-up forms and converts to
//! the backend's [`RegistrationPayload`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Partial profile update as submitted by a form.
pub type ProfileUpdate = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Customer,
    Provider,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub city: String,
    pub area: String,
}

/// Which dashboard a login form was submitted from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardKind {
    #[default]
    Customer,
    Provider,
}

// =============================================================================
// USER
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub user_type: UserType,
    pub is_provider: bool,
    pub contact: Option<String>,
    pub address: Option<Address>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_registration: Option<String>,
}

impl User {
    /// Parse a user from the frontend shape, the backend shape, or the
    /// proxy's mix of both.
    pub fn from_json(value: &Value) -> Result<Self, AuthError> {
        Self::parse(value).map_err(|e| AuthError::server(502, format!("Unexpected user payload: {e}")))
    }

    fn parse(value: &Value) -> Result<Self, serde_json::Error> {
        let normalized = normalize_keys(value);
        let mut user: Self = serde_json::from_value(normalized.clone())?;
        user.reconcile_role(&normalized);
        Ok(user)
    }

    /// Backend payloads carry either `isProvider` or `userType`; make both agree.
    fn reconcile_role(&mut self, normalized: &Value) {
        let has_flag = normalized.get("isProvider").is_some();
        let has_type = normalized.get("userType").is_some();
        if has_flag && !has_type {
            self.user_type = if self.is_provider { UserType::Provider } else { UserType::Customer };
        } else if has_type && !has_flag {
            self.is_provider = self.user_type == UserType::Provider;
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() { self.username.clone() } else { full.to_owned() }
    }

    /// Merge a partial update into this user, returning the merged copy.
    ///
    /// Keys may be camelCase or snake_case; `phone` maps onto `contact` and
    /// flat `city`/`area` land in `address`.
    pub fn merged_with(&self, patch: &ProfileUpdate) -> Result<Self, AuthError> {
        let mut base = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            let key = to_camel_case(key);
            match key.as_str() {
                "phone" => {
                    base.insert("contact".into(), value.clone());
                }
                "city" | "area" => {
                    let address = base
                        .entry("address")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !address.is_object() {
                        *address = Value::Object(Map::new());
                    }
                    if let Value::Object(address) = address {
                        address.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    base.insert(key, value.clone());
                }
            }
        }

        // The patch decides which role field is authoritative.
        let flag_patched = patch.keys().any(|k| to_camel_case(k) == "isProvider");
        if flag_patched {
            base.remove("userType");
        } else if patch.keys().any(|k| to_camel_case(k) == "userType") {
            base.remove("isProvider");
        }

        Self::parse(&Value::Object(base))
            .map_err(|e| AuthError::validation(format!("Invalid profile update: {e}"), BTreeMap::new()))
    }
}

/// Fold snake_case keys and legacy aliases onto the camelCase field names.
/// When both spellings are present the camelCase one wins. `null` values are
/// dropped so they read as the field default.
fn normalize_keys(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map.iter().filter(|(_, v)| !v.is_null()) {
        let camel = to_camel_case(key);
        let target = match camel.as_str() {
            "phone" => "contact".to_owned(),
            "isVerified" => "verified".to_owned(),
            _ => camel,
        };
        let value = match value {
            Value::Object(nested) if target == "address" => Value::Object(
                nested
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        };
        let is_canonical = target == *key;
        let canonical_set = map.get(&target).is_some_and(|v| !v.is_null());
        if is_canonical || (!canonical_set && !out.contains_key(&target)) {
            out.insert(target, value);
        }
    }
    Value::Object(out)
}

/// Ids arrive as numbers from some deployments and strings from others.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// `first_name` → `firstName`; already-camel keys pass through.
#[must_use]
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Split `"Ram Bahadur Thapa"` into `("Ram", "Bahadur Thapa")`.
#[must_use]
pub fn split_name(full: &str) -> (String, String) {
    let full = full.trim();
    match full.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_owned(), rest.trim().to_owned()),
        None => (full.to_owned(), String::new()),
    }
}

// =============================================================================
// REGISTRATION
// =============================================================================

/// Sign-up form data. Accepts frontend or backend field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    #[serde(alias = "first_name")]
    pub first_name: String,
    #[serde(alias = "last_name")]
    pub last_name: String,
    #[serde(alias = "full_name")]
    pub name: Option<String>,
    pub username: Option<String>,
    #[serde(alias = "user_type")]
    pub user_type: Option<UserType>,
    #[serde(alias = "is_provider")]
    pub is_provider: Option<bool>,
    #[serde(alias = "contact")]
    pub phone: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub address: Option<Address>,
    pub bio: Option<String>,
    #[serde(alias = "experience_years")]
    pub experience_years: Option<u32>,
    #[serde(alias = "service_category")]
    pub service_category: Option<String>,
    #[serde(alias = "document_category")]
    pub document_category: Option<String>,
    #[serde(alias = "document_id")]
    pub document_id: Option<String>,
    #[serde(alias = "organization_name")]
    pub organization_name: Option<String>,
    #[serde(alias = "organization_registration")]
    pub organization_registration: Option<String>,
}

/// Registration body in the backend's expected shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub is_provider: bool,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_registration: Option<String>,
}

impl RegisterInput {
    #[must_use]
    pub fn is_provider(&self) -> bool {
        self.is_provider
            .unwrap_or(self.user_type == Some(UserType::Provider))
    }

    /// Validate and reshape into the backend registration body.
    pub fn into_payload(self) -> Result<RegistrationPayload, AuthError> {
        let is_provider = self.is_provider();

        let (mut first_name, mut last_name) = (self.first_name.trim().to_owned(), self.last_name.trim().to_owned());
        if first_name.is_empty()
            && last_name.is_empty()
            && let Some(name) = self.name.as_deref()
        {
            (first_name, last_name) = split_name(name);
        }

        let mut fields = BTreeMap::new();
        let email = self.email.trim().to_owned();
        if email.is_empty() {
            fields.insert("email".to_owned(), "This field is required.".to_owned());
        } else if !email.contains('@') {
            fields.insert("email".to_owned(), "Enter a valid email address.".to_owned());
        }
        if self.password.is_empty() {
            fields.insert("password".to_owned(), "This field is required.".to_owned());
        }
        if first_name.is_empty() {
            fields.insert("first_name".to_owned(), "This field is required.".to_owned());
        }
        if !fields.is_empty() {
            let message = fields
                .iter()
                .map(|(field, detail)| format!("{field}: {detail}"))
                .collect::<Vec<_>>()
                .join(". ");
            return Err(AuthError::validation(message, fields));
        }

        let address = match (self.address, self.city, self.area) {
            (Some(address), None, None) => Some(address),
            (existing, city, area) if city.is_some() || area.is_some() => {
                let existing = existing.unwrap_or_default();
                Some(Address { city: city.unwrap_or(existing.city), area: area.unwrap_or(existing.area) })
            }
            _ => None,
        };

        let contact = self
            .phone
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty());

        // Provider-only fields are dropped for customers.
        let provider = |field: Option<String>| field.filter(|_| is_provider);

        Ok(RegistrationPayload {
            email,
            first_name,
            last_name,
            username: self.username.filter(|u| !u.trim().is_empty()),
            contact,
            address,
            is_provider,
            password: self.password,
            bio: provider(self.bio),
            experience_years: self.experience_years.filter(|_| is_provider),
            service_category: provider(self.service_category),
            document_category: provider(self.document_category),
            document_id: provider(self.document_id),
            organization_name: provider(self.organization_name),
            organization_registration: provider(self.organization_registration),
        })
    }
}

#[cfg(test)]
#[path = "user_test.rs"]
mod tests;
