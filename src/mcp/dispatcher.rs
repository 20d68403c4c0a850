//! Request dispatch
//!
//! Routes a request to its registered handler and guarantees that handler
//! failures only leave the process after passing through the sanitizer.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{McpError, NewsMcpError, Result};
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{Kind, Registry};
use crate::mcp::types::{CallToolResult, GetPromptResult, ReadResourceResult};
use crate::sanitize::sanitize_for_response;

/// Structured response for any kind of request
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    Tool(CallToolResult),
    Resource(ReadResourceResult),
    Prompt(GetPromptResult),
}

impl DispatchResponse {
    pub fn into_value(self) -> Result<Value> {
        let value = match self {
            DispatchResponse::Tool(r) => serde_json::to_value(r)?,
            DispatchResponse::Resource(r) => serde_json::to_value(r)?,
            DispatchResponse::Prompt(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }
}

/// Dispatcher over an immutable registry
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch by kind.
    ///
    /// `name` is the tool name, resource URI (or name), or prompt name.
    /// Unknown names, denied roles and schema violations are returned as
    /// errors; handler failures become sanitized responses.
    pub async fn dispatch(
        &self,
        kind: Kind,
        name: &str,
        raw_input: Value,
        ctx: &RequestContext,
    ) -> Result<DispatchResponse> {
        match kind {
            Kind::Tool => self
                .call_tool(name, raw_input, ctx)
                .await
                .map(DispatchResponse::Tool),
            Kind::Resource => self
                .read_resource(name, ctx)
                .await
                .map(DispatchResponse::Resource),
            Kind::Prompt => self
                .get_prompt(name, raw_input, ctx)
                .await
                .map(DispatchResponse::Prompt),
        }
    }

    pub async fn call_tool(
        &self,
        name: &str,
        raw_input: Value,
        ctx: &RequestContext,
    ) -> Result<CallToolResult> {
        let tool = self
            .registry
            .tool(name)
            .ok_or_else(|| not_found(Kind::Tool, name))?;
        authorize(ctx, tool.required_role, name)?;
        let params = tool.schema.validate(&raw_input)?;

        tracing::debug!(tool = name, "Dispatching tool call");

        match tool.handler.call(params, ctx).await {
            Ok(result) => {
                if result.is_error {
                    tracing::warn!(tool = name, "Tool returned a business failure");
                }
                Ok(result)
            }
            Err(e) => {
                let message = handler_failure(Kind::Tool, name, &e);
                Ok(CallToolResult::error(format!("Unexpected error: {}", message)))
            }
        }
    }

    pub async fn read_resource(
        &self,
        uri: &str,
        ctx: &RequestContext,
    ) -> Result<ReadResourceResult> {
        let resource = self
            .registry
            .resource(uri)
            .ok_or_else(|| not_found(Kind::Resource, uri))?;
        authorize(ctx, resource.required_role, resource.name)?;

        tracing::debug!(resource = resource.name, "Dispatching resource read");

        match resource.handler.read(resource.uri, ctx).await {
            Ok(result) => Ok(result),
            Err(e) => {
                let message = handler_failure(Kind::Resource, resource.name, &e);
                Ok(ReadResourceResult::plain_text(
                    resource.uri,
                    format!("Error: {}", message),
                ))
            }
        }
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        raw_args: Value,
        ctx: &RequestContext,
    ) -> Result<GetPromptResult> {
        let prompt = self
            .registry
            .prompt(name)
            .ok_or_else(|| not_found(Kind::Prompt, name))?;
        authorize(ctx, prompt.required_role, name)?;
        let args = prompt.arguments.validate(&raw_args)?;

        tracing::debug!(prompt = name, "Dispatching prompt request");

        match prompt.handler.get(args, ctx).await {
            Ok(result) => Ok(result),
            Err(e) => {
                let message = handler_failure(Kind::Prompt, name, &e);
                Err(McpError::HandlerFailed { message }.into())
            }
        }
    }
}

fn not_found(kind: Kind, name: &str) -> NewsMcpError {
    McpError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
    .into()
}

fn authorize(ctx: &RequestContext, role: Option<&str>, name: &str) -> Result<()> {
    match role {
        Some(role) if !ctx.has_role(role) => {
            tracing::warn!(role, name, "Role check denied request");
            Err(McpError::Forbidden {
                role: role.to_string(),
                name: name.to_string(),
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Sanitize and log a handler failure
fn handler_failure(kind: Kind, name: &str, err: &NewsMcpError) -> String {
    let message = sanitize_for_response(err);
    tracing::error!(kind = %kind, name, error = %message, "Handler failed");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Session, USER_ROLE};
    use crate::config::Config;
    use crate::mcp::registry::{
        PromptDescriptor, PromptHandler, ResourceDescriptor, ResourceHandler, ToolDescriptor,
        ToolHandler,
    };
    use crate::schema::{FieldSpec, Params, Schema};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::io;

    const LEAKY_KEY: &str = "sk0123456789abcdef0123456789abcdef0123456789";

    struct Echo;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
        times: u64,
    }

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
            let args: EchoArgs = params.parse()?;
            Ok(CallToolResult::text(format!("{} x{}", args.text, args.times)))
        }
    }

    fn upstream(message: String) -> NewsMcpError {
        io::Error::new(io::ErrorKind::Other, message).into()
    }

    struct Leaky;

    #[async_trait]
    impl ToolHandler for Leaky {
        async fn call(&self, _params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
            Err(upstream(format!(
                "upstream rejected key {} with Bearer abc123",
                LEAKY_KEY
            )))
        }
    }

    #[async_trait]
    impl ResourceHandler for Leaky {
        async fn read(&self, _uri: &str, _ctx: &RequestContext) -> Result<ReadResourceResult> {
            Err(upstream(format!("key={}", LEAKY_KEY)))
        }
    }

    #[async_trait]
    impl PromptHandler for Leaky {
        async fn get(&self, _args: Params, _ctx: &RequestContext) -> Result<GetPromptResult> {
            Err(upstream(format!("Authorization: {}", LEAKY_KEY)))
        }
    }

    struct Business;

    #[async_trait]
    impl ToolHandler for Business {
        async fn call(&self, _params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
            Ok(CallToolResult::failure("API key missing"))
        }
    }

    fn dispatcher() -> Dispatcher {
        let registry = Registry::builder()
            .tool(ToolDescriptor::new(
                "echo",
                "Echo",
                Schema::new()
                    .field(FieldSpec::string("text"))
                    .field(FieldSpec::integer("times").optional().default_value(json!(1))),
                Echo,
            ))
            .tool(ToolDescriptor::new("leaky", "Fails", Schema::new(), Leaky))
            .tool(ToolDescriptor::new("business", "Business failure", Schema::new(), Business))
            .tool(
                ToolDescriptor::new("members_only", "Needs a user", Schema::new(), Business)
                    .require_role(USER_ROLE),
            )
            .resource(ResourceDescriptor::new("leaky_res", "Fails", "leaky", Leaky))
            .prompt(PromptDescriptor::new("leaky_prompt", "Fails", Schema::new(), Leaky))
            .build()
            .unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Arc::new(Config::default()))
    }

    #[tokio::test]
    async fn test_dispatch_applies_defaults() {
        let result = dispatcher()
            .dispatch(Kind::Tool, "echo", json!({"text": "hi"}), &ctx())
            .await
            .unwrap();
        match result {
            DispatchResponse::Tool(r) => assert_eq!(r.text_content(), "hi x1"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_not_found() {
        let err = dispatcher()
            .call_tool("nope", json!({}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NewsMcpError::Mcp(McpError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_schema_violation() {
        let err = dispatcher()
            .call_tool("echo", json!({"times": "many"}), &ctx())
            .await
            .unwrap_err();
        match err {
            NewsMcpError::Schema(v) => assert_eq!(v.fields(), vec!["text", "times"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_handler_error_is_sanitized() {
        let result = dispatcher().call_tool("leaky", json!({}), &ctx()).await.unwrap();
        assert!(result.is_error);
        let text = result.text_content();
        assert!(text.starts_with("Error: Unexpected error:"));
        assert!(!text.contains(LEAKY_KEY));
        assert!(!text.contains("abc123"));
        assert!(text.contains("[API_KEY_REMOVED]"));
    }

    #[tokio::test]
    async fn test_business_failure_passes_through() {
        let result = dispatcher().call_tool("business", json!({}), &ctx()).await.unwrap();
        assert_eq!(result, CallToolResult::failure("API key missing"));
    }

    #[tokio::test]
    async fn test_role_required() {
        let d = dispatcher();
        let err = d.call_tool("members_only", json!({}), &ctx()).await.unwrap_err();
        assert!(matches!(err, NewsMcpError::Mcp(McpError::Forbidden { .. })));

        let session = Session::new("a@b.com", None).unwrap();
        let ctx = ctx().with_session(Some(session));
        assert!(d.call_tool("members_only", json!({}), &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_resource_error_is_sanitized() {
        let result = dispatcher().read_resource("leaky", &ctx()).await.unwrap();
        let text = result.contents[0].text.clone().unwrap();
        assert!(text.starts_with("Error: "));
        assert!(!text.contains(LEAKY_KEY));
    }

    #[tokio::test]
    async fn test_prompt_error_is_sanitized() {
        let err = dispatcher()
            .get_prompt("leaky_prompt", json!({}), &ctx())
            .await
            .unwrap_err();
        match err {
            NewsMcpError::Mcp(McpError::HandlerFailed { message }) => {
                assert!(!message.contains(LEAKY_KEY));
                assert!(message.contains("[REMOVED]"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_resource_and_prompt() {
        let d = dispatcher();
        assert!(d.dispatch(Kind::Resource, "nowhere", Value::Null, &ctx()).await.is_err());
        assert!(d.dispatch(Kind::Prompt, "nothing", Value::Null, &ctx()).await.is_err());
    }
}
