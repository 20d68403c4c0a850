//! Registry of tools, resources and prompts
//!
//! Built once at startup through [`RegistryBuilder`]; read-only afterwards.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{McpError, Result};
use crate::mcp::context::RequestContext;
use crate::mcp::types::{
    CallToolResult, GetPromptResult, Prompt, PromptArgument, ReadResourceResult, Resource, Tool,
};
use crate::schema::{Params, Schema};

/// Handler for a tool call.
///
/// Business failures are returned as an `Ok` result flagged `is_error`;
/// an `Err` is an unexpected failure and is sanitized by the dispatcher.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Params, ctx: &RequestContext) -> Result<CallToolResult>;
}

/// Handler for a resource read
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &str, ctx: &RequestContext) -> Result<ReadResourceResult>;
}

/// Handler for a prompt request
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, args: Params, ctx: &RequestContext) -> Result<GetPromptResult>;
}

/// Kind of registered unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Tool,
    Resource,
    Prompt,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Tool => "tool",
            Kind::Resource => "resource",
            Kind::Prompt => "prompt",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered tool
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Schema,
    pub required_role: Option<&'static str>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: &'static str,
        description: &'static str,
        schema: Schema,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name,
            description,
            schema,
            required_role: None,
            handler: Arc::new(handler),
        }
    }

    pub fn require_role(mut self, role: &'static str) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            input_schema: self.schema.to_json_schema(),
        }
    }
}

/// Registered resource
#[derive(Clone)]
pub struct ResourceDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub uri: &'static str,
    pub mime_type: &'static str,
    pub required_role: Option<&'static str>,
    pub handler: Arc<dyn ResourceHandler>,
}

impl ResourceDescriptor {
    pub fn new(
        name: &'static str,
        description: &'static str,
        uri: &'static str,
        handler: impl ResourceHandler + 'static,
    ) -> Self {
        Self {
            name,
            description,
            uri,
            mime_type: "text/plain",
            required_role: None,
            handler: Arc::new(handler),
        }
    }

    pub fn require_role(mut self, role: &'static str) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn to_resource(&self) -> Resource {
        Resource {
            uri: self.uri.to_string(),
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            mime_type: Some(self.mime_type.to_string()),
        }
    }
}

/// Registered prompt
#[derive(Clone)]
pub struct PromptDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Schema,
    pub required_role: Option<&'static str>,
    pub handler: Arc<dyn PromptHandler>,
}

impl PromptDescriptor {
    pub fn new(
        name: &'static str,
        description: &'static str,
        arguments: Schema,
        handler: impl PromptHandler + 'static,
    ) -> Self {
        Self {
            name,
            description,
            arguments,
            required_role: None,
            handler: Arc::new(handler),
        }
    }

    pub fn require_role(mut self, role: &'static str) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn to_prompt(&self) -> Prompt {
        Prompt {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            arguments: self
                .arguments
                .fields()
                .iter()
                .map(|f| PromptArgument {
                    name: f.name.to_string(),
                    description: (!f.description.is_empty()).then(|| f.description.to_string()),
                    required: f.required && f.default.is_none(),
                })
                .collect(),
        }
    }
}

/// Immutable registry of everything the server exposes
#[derive(Clone, Default)]
pub struct Registry {
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
    prompts: Vec<PromptDescriptor>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Look up a resource by URI, falling back to its name
    pub fn resource(&self, uri_or_name: &str) -> Option<&ResourceDescriptor> {
        self.resources
            .iter()
            .find(|r| r.uri == uri_or_name)
            .or_else(|| self.resources.iter().find(|r| r.name == uri_or_name))
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptDescriptor> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_tool).collect()
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .map(ResourceDescriptor::to_resource)
            .collect()
    }

    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts.iter().map(PromptDescriptor::to_prompt).collect()
    }
}

/// Collects descriptors, then freezes them into a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn tool(mut self, tool: ToolDescriptor) -> Self {
        self.registry.tools.push(tool);
        self
    }

    pub fn resource(mut self, resource: ResourceDescriptor) -> Self {
        self.registry.resources.push(resource);
        self
    }

    pub fn prompt(mut self, prompt: PromptDescriptor) -> Self {
        self.registry.prompts.push(prompt);
        self
    }

    /// Freeze the registry; names must be unique within each kind
    pub fn build(self) -> Result<Registry> {
        let registry = self.registry;
        check_unique(Kind::Tool, registry.tools.iter().map(|t| t.name))?;
        check_unique(Kind::Resource, registry.resources.iter().map(|r| r.name))?;
        check_unique(Kind::Resource, registry.resources.iter().map(|r| r.uri))?;
        check_unique(Kind::Prompt, registry.prompts.iter().map(|p| p.name))?;
        Ok(registry)
    }
}

fn check_unique<'a>(kind: Kind, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(McpError::DuplicateName {
                kind: kind.to_string(),
                name: name.to_string(),
            }
            .into());
        }
    }
    Ok(())
}
