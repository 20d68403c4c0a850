//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::auth::{RoleRegistry, Session};
use crate::config::{config_schema, CONFIG_FILE_NAME};
use crate::error::{McpError, NewsMcpError, Result};
use crate::mcp::context::{RequestContext, CONTEXT_HEADERS};
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::registry::{Kind, Registry};
use crate::mcp::types::*;
use crate::sanitize::sanitize_for_response;

/// MCP Server info
pub const SERVER_NAME: &str = "news-mcp-server";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVER_DESCRIPTION: &str = "MCP server for news headlines and articles from NewsAPI. Provides tools for searching news by topic, getting top headlines by country/category, listing available news sources, and personalized user greetings.";

/// MCP Server for news, greetings and AI helpers
pub struct McpServer {
    dispatcher: Dispatcher,

    /// Connection-level context; each request derives its own from `_meta`
    context: RequestContext,

    /// Requests still being handled, so `notifications/cancelled` can abort them
    in_flight: Mutex<HashMap<RequestId, AbortHandle>>,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(dispatcher: Dispatcher, context: RequestContext) -> Self {
        Self {
            dispatcher,
            context,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run the server on stdio
    pub async fn run_stdio(self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await?;
        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// Each line is handled on its own task; responses go through a single
    /// writer so lines never interleave. A cancelled request gets no
    /// response. Returns once the reader closes and every in-flight request
    /// has answered or been cancelled.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let server = Arc::new(self);
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_string(&response)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<(), NewsMcpError>(())
        });

        tracing::info!(server = SERVER_NAME, version = SERVER_VERSION, "Listening");

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let id = peek_request_id(&line);
            let task = {
                let server = server.clone();
                tokio::spawn(async move { server.handle_message(&line).await })
            };
            // Tracked before the next line is read, so a cancellation that
            // follows the request always finds it
            if let Some(id) = &id {
                server.track(id.clone(), task.abort_handle());
            }

            let server = server.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let handled = task.await;
                if let Some(id) = &id {
                    server.untrack(id);
                }

                let response = match handled {
                    Ok(response) => response,
                    Err(e) if e.is_cancelled() => {
                        tracing::info!(id = ?id, "Request cancelled; no response sent");
                        None
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Request task failed");
                        id.map(|id| {
                            JsonRpcResponse::error(id, JsonRpcError::internal_error("Internal error"))
                        })
                    }
                };

                if let Some(response) = response {
                    if tx.send(response).is_err() {
                        tracing::warn!("Response writer closed");
                    }
                }
            });
        }

        drop(tx);
        writer
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(())
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<RequestId, AbortHandle>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, id: RequestId, handle: AbortHandle) {
        self.in_flight().insert(id, handle);
    }

    fn untrack(&self, id: &RequestId) {
        self.in_flight().remove(id);
    }

    /// Abort the request named by a `notifications/cancelled` message
    fn cancel(&self, params: Option<Value>) {
        let params = match params.map(serde_json::from_value::<CancelledParams>) {
            Some(Ok(params)) => params,
            _ => {
                tracing::warn!("Ignoring malformed cancellation");
                return;
            }
        };

        match self.in_flight().remove(&params.request_id) {
            Some(handle) => {
                handle.abort();
                tracing::info!(
                    id = ?params.request_id,
                    reason = params.reason.as_deref().unwrap_or_default(),
                    "Cancelling request"
                );
            }
            None => tracing::debug!(
                id = ?params.request_id,
                "Cancellation for a request that is not in flight"
            ),
        }
    }

    /// Handle an incoming JSON-RPC message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable message");
                return Some(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(e.to_string()),
                ));
            }
        };

        let Some(id) = request.id.clone() else {
            self.handle_notification(request);
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {:?}",
                    request.jsonrpc
                )),
            ));
        }

        tracing::debug!(method = %request.method, "Handling request");

        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(),
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => to_value(ListToolsResult {
                tools: self.dispatcher.registry().list_tools(),
            }),
            methods::CALL_TOOL => self.handle_call_tool(request.params).await,
            methods::LIST_RESOURCES => to_value(ListResourcesResult {
                resources: self.dispatcher.registry().list_resources(),
            }),
            methods::READ_RESOURCE => self.handle_read_resource(request.params).await,
            methods::LIST_PROMPTS => to_value(ListPromptsResult {
                prompts: self.dispatcher.registry().list_prompts(),
            }),
            methods::GET_PROMPT => self.handle_get_prompt(request.params).await,
            _ => {
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::method_not_found(&request.method),
                ));
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, to_jsonrpc_error(&e)),
        })
    }

    fn handle_notification(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => tracing::info!("Client initialized"),
            methods::CANCELLED => self.cancel(request.params),
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&self) -> Result<Value> {
        to_value(InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability::default()),
                prompts: Some(PromptsCapability::default()),
            },
            instructions: Some(SERVER_DESCRIPTION.to_string()),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let (params, ctx) = self.parse_params::<CallToolParams>(params)?;
        self.dispatcher
            .dispatch(Kind::Tool, &params.name, params.arguments, &ctx)
            .await?
            .into_value()
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> Result<Value> {
        let (params, ctx) = self.parse_params::<ReadResourceParams>(params)?;
        self.dispatcher
            .dispatch(Kind::Resource, &params.uri, Value::Null, &ctx)
            .await?
            .into_value()
    }

    async fn handle_get_prompt(&self, params: Option<Value>) -> Result<Value> {
        let (params, ctx) = self.parse_params::<GetPromptParams>(params)?;
        self.dispatcher
            .dispatch(Kind::Prompt, &params.name, params.arguments, &ctx)
            .await?
            .into_value()
    }

    /// Decode request params and derive the per-request context from `_meta`
    fn parse_params<T: DeserializeOwned>(
        &self,
        params: Option<Value>,
    ) -> Result<(T, RequestContext)> {
        let params = params.unwrap_or_else(|| json!({}));

        let meta = match params.get("_meta") {
            Some(raw) => serde_json::from_value::<RequestMeta>(raw.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring malformed _meta");
                RequestMeta::default()
            }),
            None => RequestMeta::default(),
        };

        let parsed = serde_json::from_value(params).map_err(|e| McpError::InvalidRequest {
            message: e.to_string(),
        })?;

        Ok((parsed, self.context.for_request(meta)))
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn peek_request_id(line: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(line).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

/// Map a dispatch error to its JSON-RPC error
pub fn to_jsonrpc_error(err: &NewsMcpError) -> JsonRpcError {
    match err {
        NewsMcpError::Schema(violation) => JsonRpcError::invalid_params(violation.to_string())
            .with_data(json!({
                "violations": violation
                    .violations
                    .iter()
                    .map(|v| json!({"field": v.field, "message": v.message}))
                    .collect::<Vec<_>>()
            })),
        NewsMcpError::Mcp(McpError::NotFound { .. } | McpError::InvalidRequest { .. }) => {
            JsonRpcError::invalid_params(err.to_string())
        }
        NewsMcpError::Mcp(McpError::Forbidden { .. }) => JsonRpcError::forbidden(err.to_string()),
        NewsMcpError::Mcp(McpError::HandlerFailed { message }) => {
            JsonRpcError::internal_error(message.clone())
        }
        other => JsonRpcError::internal_error(sanitize_for_response(other)),
    }
}

/// Server metadata printed by `--meta`
pub fn metadata(registry: &Registry) -> Result<Value> {
    let session_schema = serde_json::to_value(schemars::schema_for!(Session))?;
    let roles = RoleRegistry::default();
    let roles: Vec<&str> = roles.names().collect();

    Ok(json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "description": SERVER_DESCRIPTION,
        "configFile": CONFIG_FILE_NAME,
        "configSchema": config_schema().to_json_schema(),
        "sessionSchema": session_schema,
        "roles": roles,
        "contextHeaders": CONTEXT_HEADERS,
        "tools": registry.list_tools(),
        "resources": registry.list_resources(),
        "prompts": registry.list_prompts(),
    }))
}
