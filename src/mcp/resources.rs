//! MCP resources

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::newsapi::API_KEY_SECRET;
use crate::error::{NewsApiError, NewsMcpError, Result};
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{RegistryBuilder, ResourceDescriptor, ResourceHandler};
use crate::mcp::types::ReadResourceResult;
use crate::news::client::NewsClient;

const NOT_SET: &str = "(not set)";

/// Register the news sources and request context resources
pub fn register_news_resources(
    builder: RegistryBuilder,
    news: Arc<NewsClient>,
) -> RegistryBuilder {
    builder
        .resource(ResourceDescriptor::new(
            "news_sources",
            "List of available news sources from NewsAPI",
            "sources",
            NewsSourcesResource { news },
        ))
        .resource(ResourceDescriptor::new(
            "context_info",
            "Shows current request context including workspace ID, project root, and custom context headers configured in MCP Manager",
            "context",
            ContextInfoResource,
        ))
}

struct NewsSourcesResource {
    news: Arc<NewsClient>,
}

#[async_trait]
impl ResourceHandler for NewsSourcesResource {
    async fn read(&self, uri: &str, ctx: &RequestContext) -> Result<ReadResourceResult> {
        let Some(api_key) = ctx.secrets.get(API_KEY_SECRET) else {
            return Ok(ReadResourceResult::plain_text(
                uri,
                "Error: NewsAPI key not found. Please set SECRET_NEWSAPI_KEY environment variable.",
            ));
        };

        let data = match self.news.fetch_sources(api_key).await {
            Ok(data) => data,
            Err(NewsMcpError::News(NewsApiError::Timeout)) => {
                return Ok(ReadResourceResult::plain_text(
                    uri,
                    "Error: request timed out",
                ));
            }
            Err(e) => return Err(e),
        };

        if data.is_error() {
            return Ok(ReadResourceResult::plain_text(
                uri,
                format!(
                    "Error: {}",
                    data.message.as_deref().unwrap_or("Failed to fetch sources")
                ),
            ));
        }

        let sources = data.sources.unwrap_or_default();
        let list = sources
            .iter()
            .map(|s| {
                format!(
                    "- {} ({})\n  Category: {}\n  Country: {}\n  Language: {}",
                    s.name.as_deref().unwrap_or_default(),
                    s.id.as_deref().unwrap_or_default(),
                    s.category.as_deref().unwrap_or_default(),
                    s.country.as_deref().unwrap_or_default(),
                    s.language.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ReadResourceResult::plain_text(
            uri,
            format!("Available News Sources ({}):\n\n{}", sources.len(), list),
        ))
    }
}

struct ContextInfoResource;

#[async_trait]
impl ResourceHandler for ContextInfoResource {
    async fn read(&self, uri: &str, ctx: &RequestContext) -> Result<ReadResourceResult> {
        Ok(ReadResourceResult::plain_text(
            uri,
            context_report(ctx, &chrono::Utc::now().to_rfc3339()),
        ))
    }
}

fn context_report(ctx: &RequestContext, timestamp: &str) -> String {
    let headers = if ctx.context_headers.is_empty() {
        "  (no context headers configured)".to_string()
    } else {
        ctx.context_headers
            .iter()
            .map(|(key, value)| format!("  - {}: {}", key, value))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Request Context Information
===========================

Workspace ID: {}
Project Root: {}

Custom Context Headers:
{}

Timestamp: {}

---
This resource demonstrates how context headers flow from
MCP Manager workspace settings to the server handler.

To configure context headers:
1. Open MCP Manager
2. Go to a workspace
3. Click on this server
4. Fill in the Context Headers fields (project-id, environment, custom-tag)
5. Call this resource again to see the values",
        ctx.workspace_id.as_deref().unwrap_or(NOT_SET),
        ctx.project_root.as_deref().unwrap_or(NOT_SET),
        headers,
        timestamp
    )
}
