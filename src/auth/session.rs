//! Session extraction from bearer tokens

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;

/// Authenticated session: only the email and an optional full name are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// User email address
    pub email: String,

    /// User full name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl Session {
    /// Build a session, validating the email address
    pub fn new(
        email: impl Into<String>,
        full_name: Option<String>,
    ) -> std::result::Result<Self, AuthError> {
        let email = email.into();
        if email.trim().is_empty() {
            return Err(AuthError::invalid_token("Email is required in session token"));
        }
        if !validator::validate_email(email.as_str()) {
            return Err(AuthError::invalid_token("Email is not a valid address"));
        }
        Ok(Self { email, full_name })
    }

    /// Name to address the user by: full name, else the email's local part
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Parse a bearer token into a [`Session`].
///
/// The token must decode (as raw JSON, or base64/base64url-encoded JSON) to an
/// object with a string `email`. A string `fullName` is kept if present; every
/// other claim is discarded.
pub fn authenticate(token: &str) -> std::result::Result<Session, AuthError> {
    let claims = decode_token(token)?;
    let object = claims
        .as_object()
        .ok_or_else(|| AuthError::invalid_token("token is not a JSON object"))?;

    let email = match object.get("email") {
        Some(Value::String(email)) => email.clone(),
        _ => return Err(AuthError::invalid_token("Email is required in session token")),
    };

    let full_name = match object.get("fullName") {
        Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
        _ => None,
    };

    Session::new(email, full_name)
}

fn decode_token(token: &str) -> std::result::Result<Value, AuthError> {
    let token = token.trim();
    let token = token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .unwrap_or(token)
        .trim();

    if token.is_empty() {
        return Err(AuthError::invalid_token("token is empty"));
    }

    if let Ok(value) = serde_json::from_str::<Value>(token) {
        return Ok(value);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .or_else(|_| URL_SAFE.decode(token))
        .or_else(|_| STANDARD.decode(token))
        .map_err(|_| AuthError::invalid_token("token is not JSON"))?;

    serde_json::from_slice(&bytes).map_err(|_| AuthError::invalid_token("token is not JSON"))
}
