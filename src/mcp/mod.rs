//! MCP (Model Context Protocol) module
//!
//! Implements the MCP server protocol for tools, resources and prompts.

pub mod context;
pub mod dispatcher;
pub mod prompts;
pub mod registry;
pub mod resources;
pub mod server;
pub mod tools;
pub mod types;

use std::sync::Arc;

use crate::ai::AiClient;
use crate::error::Result;
use crate::news::client::NewsClient;

use self::registry::Registry;

/// Build the registry of everything the server exposes
pub fn build_registry(news: Arc<NewsClient>, ai: Arc<dyn AiClient>) -> Result<Registry> {
    let builder = tools::register_greeting_tools(Registry::builder());
    let builder = tools::register_news_tools(builder, news.clone());
    let builder = resources::register_news_resources(builder, news);
    let builder = prompts::register_news_prompts(builder);
    let builder = tools::register_ai_tools(builder, ai);
    builder.build()
}
