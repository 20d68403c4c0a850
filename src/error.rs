//! Error types for the News MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use std::fmt;

use thiserror::Error;

/// Main error type for the News MCP Server
#[derive(Error, Debug)]
pub enum NewsMcpError {
    /// Session authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input or configuration failed schema validation
    #[error("{0}")]
    Schema(#[from] SchemaViolation),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// NewsAPI errors
    #[error("NewsAPI error: {0}")]
    News(#[from] NewsApiError),

    /// AI proxy errors
    #[error("AI error: {0}")]
    Ai(#[from] AiClientError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Session authentication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid session token: {reason}")]
    InvalidToken { reason: String },
}

impl AuthError {
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        AuthError::InvalidToken {
            reason: reason.into(),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse config file {path}: {message}")]
    InvalidFile { path: String, message: String },

    #[error("Invalid override map in {var}: {message}")]
    InvalidOverride { var: String, message: String },
}

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Input or configuration failed schema validation.
///
/// Carries every offending field, not just the first one found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub violations: Vec<FieldViolation>,
}

impl SchemaViolation {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// Names of the offending fields, in schema order
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema violation: ")?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} {}", v.field, v.message)?;
        }
        Ok(())
    }
}

/// MCP protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    #[error("Unknown {kind}: {name}")]
    NotFound { kind: String, name: String },

    #[error("Role '{role}' required for {name}")]
    Forbidden { role: String, name: String },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: String, name: String },

    /// Handler failure; the message is already sanitized
    #[error("{message}")]
    HandlerFailed { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

/// NewsAPI errors
#[derive(Error, Debug)]
pub enum NewsApiError {
    #[error("request timed out")]
    Timeout,
}

/// Error codes reported by the AI proxy client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiErrorCode {
    NotConfigured,
    Unauthorized,
    RateLimited,
    ApiError,
    Timeout,
    NetworkError,
}

impl AiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiErrorCode::NotConfigured => "NOT_CONFIGURED",
            AiErrorCode::Unauthorized => "UNAUTHORIZED",
            AiErrorCode::RateLimited => "RATE_LIMITED",
            AiErrorCode::ApiError => "API_ERROR",
            AiErrorCode::Timeout => "TIMEOUT",
            AiErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for AiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI proxy client error with a code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct AiClientError {
    pub code: AiErrorCode,
    pub message: String,
}

impl AiClientError {
    pub fn new(code: AiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result type alias for News MCP operations
pub type Result<T> = std::result::Result<T, NewsMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_token("Email is required in session token");
        assert!(err.to_string().contains("Email is required"));
    }

    #[test]
    fn test_error_conversion() {
        let auth_err = AuthError::invalid_token("bad");
        let err: NewsMcpError = auth_err.into();
        assert!(matches!(err, NewsMcpError::Auth(_)));
    }

    #[test]
    fn test_schema_violation_lists_fields() {
        let violation = SchemaViolation {
            violations: vec![
                FieldViolation {
                    field: "maxItems".to_string(),
                    message: "must be >= 1".to_string(),
                },
                FieldViolation {
                    field: "greeting".to_string(),
                    message: "must be a string".to_string(),
                },
            ],
        };
        let text = violation.to_string();
        assert!(text.contains("maxItems must be >= 1"));
        assert!(text.contains("greeting must be a string"));
        assert_eq!(violation.fields(), vec!["maxItems", "greeting"]);
    }

    #[test]
    fn test_ai_error_code_names() {
        assert_eq!(AiErrorCode::RateLimited.as_str(), "RATE_LIMITED");
        let err = AiClientError::new(AiErrorCode::Timeout, "slow");
        assert_eq!(err.to_string(), "TIMEOUT: slow");
    }
}
