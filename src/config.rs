//! Configuration management for the News MCP Server
//!
//! Configuration is merged from layered sources, lowest to highest precedence:
//! schema defaults, config file, environment variables, CLI arguments, and a
//! final override map. The merged object is validated against [`config_schema`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ConfigError, NewsMcpError, Result, SchemaViolation};
use crate::schema::{FieldSpec, Params, Schema};

/// Default config file name, looked up in the working directory then the home directory
pub const CONFIG_FILE_NAME: &str = ".news-mcp-server.json";

/// Environment variable holding the highest-precedence override map (JSON object)
pub const OVERRIDE_ENV_VAR: &str = "MCP_CONFIG";

/// Resolved configuration for the News MCP Server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Greeting used by the greet tool and prompt
    pub greeting: String,

    /// Maximum number of items to return in list operations
    pub max_items: u32,

    /// NewsAPI base URL
    pub news_api_base_url: String,

    /// Timeout for outbound HTTP calls, in seconds
    pub request_timeout_secs: u64,
}

impl Config {
    /// Merge and validate the given layers into a typed configuration
    pub fn resolve(layers: &ConfigLayers) -> Result<Self> {
        let params = resolve(&config_schema(), layers)?;
        Ok(serde_json::from_value(Value::Object(params.into_inner()))?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            greeting: "Hello".to_string(),
            max_items: 10,
            news_api_base_url: newsapi::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Schema for the server configuration
pub fn config_schema() -> Schema {
    Schema::new()
        .field(
            FieldSpec::string("greeting")
                .optional()
                .default_value(json!("Hello"))
                .describe("Default greeting message for tools"),
        )
        .field(
            FieldSpec::integer("maxItems")
                .default_value(json!(10))
                .min(1.0)
                .max(100.0)
                .describe("Maximum number of items to return in list operations"),
        )
        .field(
            FieldSpec::string("newsApiBaseUrl")
                .optional()
                .default_value(json!(newsapi::DEFAULT_BASE_URL))
                .min_length(1)
                .describe("Base URL of the NewsAPI v2 endpoints"),
        )
        .field(
            FieldSpec::integer("requestTimeoutSecs")
                .optional()
                .default_value(json!(30))
                .min(1.0)
                .max(300.0)
                .describe("Timeout for outbound HTTP requests, in seconds"),
        )
}

/// Pre-gathered configuration sources. Schema defaults form the implicit bottom layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    pub file: Map<String, Value>,
    pub env: Map<String, Value>,
    pub cli: Map<String, Value>,
    pub overrides: Map<String, Value>,
}

/// Merge layers in precedence order and validate against `schema`.
///
/// Pure: reads nothing from the environment or filesystem.
pub fn resolve(
    schema: &Schema,
    layers: &ConfigLayers,
) -> std::result::Result<Params, SchemaViolation> {
    let mut merged = Map::new();
    for layer in [&layers.file, &layers.env, &layers.cli, &layers.overrides] {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    schema.validate(&Value::Object(merged))
}

/// Load the config file layer.
///
/// An explicit path must exist. Without one, the default file name is looked up
/// in the working directory and then the home directory; if neither exists the
/// layer is empty.
pub fn load_file_layer(path: Option<&Path>) -> Result<Map<String, Value>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(NewsMcpError::Config(ConfigError::FileNotFound {
                    path: p.display().to_string(),
                }));
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(Map::new()),
        },
    };

    tracing::debug!(path = %path.display(), "Loading config file");
    let text = std::fs::read_to_string(&path)?;
    parse_object(&text).map_err(|message| {
        NewsMcpError::Config(ConfigError::InvalidFile {
            path: path.display().to_string(),
            message,
        })
    })
}

fn default_config_path() -> Option<PathBuf> {
    let local = std::env::current_dir().ok().map(|d| d.join(CONFIG_FILE_NAME));
    let home = dirs::home_dir().map(|d| d.join(CONFIG_FILE_NAME));
    [local, home].into_iter().flatten().find(|p| p.exists())
}

fn parse_object(text: &str) -> std::result::Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Environment variable name for a config field: `maxItems` -> `MAX_ITEMS`
pub fn env_var_name(field: &str) -> String {
    let mut name = String::with_capacity(field.len() + 4);
    for (i, c) in field.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            name.push('_');
        }
        name.push(c.to_ascii_uppercase());
    }
    name
}

/// Build the environment layer from `vars`, keeping only schema-known fields
pub fn env_layer<I>(schema: &Schema, vars: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut layer = Map::new();
    for (key, raw) in vars {
        if let Some(field) = schema.fields().iter().find(|f| env_var_name(f.name) == key) {
            layer.insert(field.name.to_string(), field.coerce(&raw));
        }
    }
    layer
}

/// Keep environment variables whose name and value are valid UTF-8.
///
/// Feed it `std::env::vars_os()`; `std::env::vars()` panics on the first
/// non-UTF-8 entry.
pub fn utf8_env_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                tracing::warn!(key = %key, "Skipping environment variable with a non-UTF-8 value");
                None
            }
            _ => None,
        })
}

/// Build the CLI layer from `(field, value)` pairs, skipping absent values
pub fn cli_layer(schema: &Schema, args: &[(&str, Option<String>)]) -> Map<String, Value> {
    let mut layer = Map::new();
    for (name, raw) in args {
        if let (Some(field), Some(raw)) = (schema.get(name), raw) {
            layer.insert(field.name.to_string(), field.coerce(raw));
        }
    }
    layer
}

/// Parse the override map (a JSON object) supplied by the hosting manager
pub fn override_layer(raw: Option<&str>) -> Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(text) if text.trim().is_empty() => Ok(Map::new()),
        Some(text) => parse_object(text).map_err(|message| {
            NewsMcpError::Config(ConfigError::InvalidOverride {
                var: OVERRIDE_ENV_VAR.to_string(),
                message,
            })
        }),
    }
}

/// NewsAPI constants
pub mod newsapi {
    /// Base URL for NewsAPI v2
    pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

    /// Secret holding the NewsAPI key
    pub const API_KEY_SECRET: &str = "SECRET_NEWSAPI_KEY";
}

/// AI proxy constants
pub mod ai_proxy {
    pub const URL_SECRET: &str = "MCP_AI_PROXY_URL";
    pub const TOKEN_SECRET: &str = "MCP_AI_PROXY_TOKEN";
}
