//! News MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for news headlines and AI helpers.
//! Speaks JSON-RPC over stdio; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use news_mcp_server_rust::ai::{AiClient, ProxyAiClient};
use news_mcp_server_rust::auth::{authenticate, RoleRegistry};
use news_mcp_server_rust::config::{self, Config, ConfigLayers, OVERRIDE_ENV_VAR};
use news_mcp_server_rust::mcp::build_registry;
use news_mcp_server_rust::mcp::context::{RequestContext, Secrets};
use news_mcp_server_rust::mcp::dispatcher::Dispatcher;
use news_mcp_server_rust::mcp::server::{metadata, McpServer};
use news_mcp_server_rust::news::client::NewsClient;

/// Environment variable carrying the session token
const SESSION_TOKEN_ENV: &str = "MCP_SESSION_TOKEN";
const WORKSPACE_ID_ENV: &str = "MCP_WORKSPACE_ID";
const PROJECT_ROOT_ENV: &str = "MCP_PROJECT_ROOT";

/// News MCP Server
#[derive(Parser)]
#[command(name = "news-mcp-server")]
#[command(author, version, about = "News MCP Server - A Model Context Protocol server for NewsAPI headlines")]
struct Cli {
    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print server metadata as JSON and exit
    #[arg(long)]
    meta: bool,

    /// Session token (JSON or base64-encoded JSON with an email claim)
    #[arg(long, env = SESSION_TOKEN_ENV, hide_env_values = true)]
    session_token: Option<String>,

    /// Default greeting message for tools
    #[arg(long)]
    greeting: Option<String>,

    /// Maximum number of items to return in list operations
    #[arg(long = "maxItems")]
    max_items: Option<String>,

    /// NewsAPI base URL
    #[arg(long = "newsApiBaseUrl")]
    news_api_base_url: Option<String>,

    /// Timeout for outbound HTTP requests, in seconds
    #[arg(long = "requestTimeoutSecs")]
    request_timeout_secs: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.meta {
        let config = Config::default();
        let registry = build_registry(
            Arc::new(NewsClient::new(&config.news_api_base_url, config.request_timeout())?),
            Arc::new(ProxyAiClient::new(None, None, config.request_timeout())?),
        )?;
        println!("{}", serde_json::to_string_pretty(&metadata(&registry)?)?);
        return Ok(());
    }

    // Initialize logging; stdout belongs to the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli).context("Failed to load configuration")?;
    tracing::info!(
        greeting = %config.greeting,
        max_items = config.max_items,
        timeout_secs = config.request_timeout_secs,
        "Configuration resolved"
    );

    let session = match cli.session_token.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(token) => {
            let session = authenticate(token).context("Session token rejected")?;
            tracing::info!(email = %session.email, "Session loaded");
            Some(session)
        }
        None => {
            tracing::info!("No session token; running without a session");
            None
        }
    };

    let secrets = Arc::new(Secrets::from_env_vars(config::utf8_env_vars(
        std::env::vars_os(),
    )));
    tracing::info!(keys = ?secrets.keys().collect::<Vec<_>>(), "Secrets loaded");
    let news = Arc::new(NewsClient::new(
        &config.news_api_base_url,
        config.request_timeout(),
    )?);
    let ai = ProxyAiClient::from_secrets(&secrets, config.request_timeout())?;
    if !ai.is_configured() {
        tracing::warn!("AI proxy not configured; AI tools will report it");
    }
    let ai: Arc<dyn AiClient> = Arc::new(ai);

    let roles = Arc::new(RoleRegistry::default());
    tracing::info!(roles = ?roles.granted(session.as_ref()), "Roles granted");

    let registry = build_registry(news, ai)?;
    let context = RequestContext::new(Arc::new(config))
        .with_session(session)
        .with_secrets(secrets)
        .with_roles(roles)
        .with_workspace(
            std::env::var(WORKSPACE_ID_ENV).ok(),
            std::env::var(PROJECT_ROOT_ENV).ok(),
        );

    let server = McpServer::new(Dispatcher::new(Arc::new(registry)), context);
    server.run_stdio().await?;

    Ok(())
}

/// Gather every config layer and resolve it
fn load_config(cli: &Cli) -> news_mcp_server_rust::Result<Config> {
    let schema = config::config_schema();
    let overrides = std::env::var(OVERRIDE_ENV_VAR).ok();

    let layers = ConfigLayers {
        file: config::load_file_layer(cli.config.as_deref())?,
        env: config::env_layer(&schema, config::utf8_env_vars(std::env::vars_os())),
        cli: config::cli_layer(
            &schema,
            &[
                ("greeting", cli.greeting.clone()),
                ("maxItems", cli.max_items.clone()),
                ("newsApiBaseUrl", cli.news_api_base_url.clone()),
                ("requestTimeoutSecs", cli.request_timeout_secs.clone()),
            ],
        ),
        overrides: config::override_layer(overrides.as_deref())?,
    };

    Config::resolve(&layers)
}
