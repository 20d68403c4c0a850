//! Error text sanitization
//!
//! Strips credential-shaped substrings from any text that leaves the process.

use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

/// Default maximum length of sanitized text
pub const DEFAULT_MAX_LENGTH: usize = 200;

/// Replacement for long alphanumeric runs
pub const API_KEY_MARKER: &str = "[API_KEY_REMOVED]";

/// Replacement for bearer tokens
pub const BEARER_MARKER: &str = "Bearer [TOKEN_REMOVED]";

/// Replacement for authorization header values
pub const AUTHORIZATION_MARKER: &str = "authorization: [REMOVED]";

const ELLIPSIS: &str = "...";

// Runs of 32+ are matched; only runs longer than 40 are masked so UUIDs and
// hashes survive.
const API_KEY_MIN_MASKED: usize = 41;

static API_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9]{32,}").expect("valid api key regex"));

static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Bearer\s+[a-zA-Z0-9_-]+").expect("valid bearer regex"));

static AUTHORIZATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)authorization[:\s]+[^\s]+").expect("valid authorization regex")
});

/// Sanitize `text`, truncating the result to `max_length` characters.
///
/// Redactions run in order: long keys, bearer tokens, authorization headers,
/// then truncation of the already-redacted string.
pub fn sanitize_error(text: &str, max_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let sanitized = API_KEY_PATTERN.replace_all(text, |caps: &Captures| {
        let matched = &caps[0];
        if matched.len() >= API_KEY_MIN_MASKED {
            API_KEY_MARKER.to_string()
        } else {
            matched.to_string()
        }
    });
    let sanitized = BEARER_PATTERN.replace_all(&sanitized, BEARER_MARKER);
    let sanitized = AUTHORIZATION_PATTERN.replace_all(&sanitized, AUTHORIZATION_MARKER);

    truncate(&sanitized, max_length)
}

/// Sanitize any displayable error with the default length limit
pub fn sanitize_for_response<E: Display + ?Sized>(error: &E) -> String {
    sanitize_error(&error.to_string(), DEFAULT_MAX_LENGTH)
}

/// Sanitize an arbitrary thrown value.
///
/// Structured errors carrying a `message` string are reduced to that message;
/// anything else is stringified whole.
pub fn sanitize_value(value: &Value) -> String {
    match value {
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => sanitize_error(message, DEFAULT_MAX_LENGTH),
            _ => sanitize_error(&value.to_string(), DEFAULT_MAX_LENGTH),
        },
        Value::String(s) => sanitize_error(s, DEFAULT_MAX_LENGTH),
        other => sanitize_error(&other.to_string(), DEFAULT_MAX_LENGTH),
    }
}

fn truncate(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((idx, _)) => format!("{}{}", &text[..idx], ELLIPSIS),
        None => text.to_string(),
    }
}
