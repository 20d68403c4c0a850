//! MCP prompt templates

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{PromptDescriptor, PromptHandler, RegistryBuilder};
use crate::mcp::tools::{greeting, user_name};
use crate::mcp::types::GetPromptResult;
use crate::schema::{FieldSpec, Params, Schema};

/// Register the news prompt templates
pub fn register_news_prompts(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .prompt(PromptDescriptor::new(
            "get_news_about",
            "Template for getting news about a specific topic",
            Schema::new().field(FieldSpec::string("topic").describe(
                "Topic to search news for (e.g., \"artificial intelligence\", \"climate change\")",
            )),
            NewsAboutPrompt,
        ))
        .prompt(PromptDescriptor::new(
            "greet_current_user",
            "Template for greeting the current logged-in user",
            Schema::new(),
            GreetUserPrompt,
        ))
}

struct NewsAboutPrompt;

#[derive(Debug, Deserialize)]
struct TopicArgs {
    topic: String,
}

#[async_trait]
impl PromptHandler for NewsAboutPrompt {
    async fn get(&self, args: Params, _ctx: &RequestContext) -> Result<GetPromptResult> {
        let TopicArgs { topic } = args.parse()?;
        Ok(GetPromptResult::user_text(format!(
            "Please get the latest news about \"{}\" using the get_news tool. Return the top 5 most relevant articles.",
            topic
        )))
    }
}

struct GreetUserPrompt;

#[async_trait]
impl PromptHandler for GreetUserPrompt {
    async fn get(&self, _args: Params, ctx: &RequestContext) -> Result<GetPromptResult> {
        Ok(GetPromptResult::user_text(format!(
            "Please greet the current user using the greet tool. The user's name is {}. Use {} as the greeting.",
            user_name(ctx.session.as_ref()),
            greeting(ctx)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::config::Config;
    use crate::mcp::types::Content;
    use serde_json::json;
    use std::sync::Arc;

    fn first_text(result: &GetPromptResult) -> &str {
        match &result.messages[0].content {
            Content::Text { text } => text,
        }
    }

    #[tokio::test]
    async fn test_news_about() {
        let args = Schema::new()
            .field(FieldSpec::string("topic"))
            .validate(&json!({"topic": "climate change"}))
            .unwrap();
        let ctx = RequestContext::new(Arc::new(Config::default()));
        let result = NewsAboutPrompt.get(args, &ctx).await.unwrap();
        assert!(first_text(&result).contains("\"climate change\" using the get_news tool"));
    }

    #[tokio::test]
    async fn test_greet_current_user() {
        let session = Session::new("ann@example.com", Some("Ann Lee".to_string())).unwrap();
        let ctx = RequestContext::new(Arc::new(Config::default())).with_session(Some(session));
        let args = Schema::new().validate(&json!({})).unwrap();
        let result = GreetUserPrompt.get(args, &ctx).await.unwrap();
        assert_eq!(
            first_text(&result),
            "Please greet the current user using the greet tool. The user's name is Ann Lee. Use Hello as the greeting."
        );
    }
}
