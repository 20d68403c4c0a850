//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::ai::types::CompletionOptions;
use crate::ai::AiClient;
use crate::auth::Session;
use crate::config::ai_proxy::{TOKEN_SECRET, URL_SECRET};
use crate::config::newsapi::API_KEY_SECRET;
use crate::error::{AiClientError, AiErrorCode, NewsApiError, NewsMcpError, Result};
use crate::mcp::context::RequestContext;
use crate::mcp::registry::{RegistryBuilder, ToolDescriptor, ToolHandler};
use crate::mcp::types::CallToolResult;
use crate::news::client::NewsClient;
use crate::news::types::NewsQuery;
use crate::schema::{FieldSpec, Params, Schema};

/// News categories accepted by NewsAPI top headlines
pub const NEWS_CATEGORIES: &[&str] = &[
    "business",
    "entertainment",
    "general",
    "health",
    "science",
    "sports",
    "technology",
];

const SUMMARY_STYLES: &[&str] = &["brief", "detailed", "bullet-points"];

/// Register the greeting tool
pub fn register_greeting_tools(builder: RegistryBuilder) -> RegistryBuilder {
    builder.tool(ToolDescriptor::new(
        "greet",
        "Greet the current user using their session information (email, fullName)",
        Schema::new().field(
            FieldSpec::boolean("formal")
                .optional()
                .default_value(json!(false))
                .describe("Use formal greeting style"),
        ),
        GreetTool,
    ))
}

/// Register the news tool
pub fn register_news_tools(builder: RegistryBuilder, news: Arc<NewsClient>) -> RegistryBuilder {
    builder.tool(ToolDescriptor::new(
        "get_news",
        "Get news headlines from NewsAPI. Supports top headlines by country/category or search by query. Requires SECRET_NEWSAPI_KEY environment variable.",
        Schema::new()
            .field(
                FieldSpec::string("query")
                    .optional()
                    .describe("Search query (e.g., \"bitcoin\", \"technology\"). If not provided, returns top headlines"),
            )
            .field(
                FieldSpec::string("country")
                    .optional()
                    .describe("ISO 3166-1 alpha-2 country code (e.g., \"us\", \"gb\", \"ru\"). Only for top headlines"),
            )
            .field(
                FieldSpec::enumeration("category", NEWS_CATEGORIES)
                    .optional()
                    .describe("News category. Only for top headlines"),
            )
            .field(
                FieldSpec::integer("pageSize")
                    .optional()
                    .default_value(json!(10))
                    .min(1.0)
                    .max(100.0)
                    .describe("Number of articles to return (1-100)"),
            ),
        GetNewsTool { news },
    ))
}

/// Register the AI tools
pub fn register_ai_tools(builder: RegistryBuilder, ai: Arc<dyn AiClient>) -> RegistryBuilder {
    builder
        .tool(ToolDescriptor::new(
            "ai_summarize",
            "Summarize the provided text using AI. Returns a concise summary of the input text. Requires AI proxy to be configured in MCP Manager.",
            Schema::new()
                .field(
                    FieldSpec::string("text")
                        .min_length(10)
                        .describe("Text to summarize"),
                )
                .field(
                    FieldSpec::enumeration("style", SUMMARY_STYLES)
                        .optional()
                        .default_value(json!("brief"))
                        .describe("Summary style: brief (1-2 sentences), detailed (paragraph), or bullet-points"),
                ),
            AiSummarizeTool { ai: ai.clone() },
        ))
        .tool(ToolDescriptor::new(
            "ai_translate",
            "Translate text to a specified language using AI. Supports any language pair.",
            Schema::new()
                .field(
                    FieldSpec::string("text")
                        .min_length(1)
                        .describe("Text to translate"),
                )
                .field(
                    FieldSpec::string("targetLanguage")
                        .min_length(2)
                        .describe("Target language (e.g., \"Spanish\", \"French\", \"Japanese\", \"Russian\")"),
                )
                .field(
                    FieldSpec::boolean("preserveTone")
                        .optional()
                        .default_value(json!(true))
                        .describe("Preserve the original tone and style of the text"),
                ),
            AiTranslateTool { ai: ai.clone() },
        ))
        .tool(ToolDescriptor::new(
            "ai_analyze_sentiment",
            "Analyze the sentiment and emotional tone of text using AI. Returns sentiment score and analysis.",
            Schema::new().field(
                FieldSpec::string("text")
                    .min_length(5)
                    .describe("Text to analyze"),
            ),
            AiSentimentTool { ai: ai.clone() },
        ))
        .tool(ToolDescriptor::new(
            "ai_chat",
            "Send a message to AI and get a response. General purpose AI chat for any question or task.",
            Schema::new()
                .field(
                    FieldSpec::string("message")
                        .min_length(1)
                        .describe("Your message or question to the AI"),
                )
                .field(
                    FieldSpec::string("systemPrompt")
                        .optional()
                        .describe("Optional system prompt to customize AI behavior"),
                )
                .field(
                    FieldSpec::number("temperature")
                        .optional()
                        .default_value(json!(0.7))
                        .min(0.0)
                        .max(2.0)
                        .describe("Temperature for response creativity (0 = deterministic, 2 = very creative)"),
                ),
            AiChatTool { ai: ai.clone() },
        ))
        .tool(ToolDescriptor::new(
            "ai_status",
            "Check AI proxy status and list available models. Useful for debugging AI configuration.",
            Schema::new(),
            AiStatusTool { ai },
        ))
}

// ==================== Greeting ====================

struct GreetTool;

#[derive(Debug, Deserialize)]
struct GreetArgs {
    #[serde(default)]
    formal: bool,
}

#[async_trait]
impl ToolHandler for GreetTool {
    async fn call(&self, params: Params, ctx: &RequestContext) -> Result<CallToolResult> {
        let GreetArgs { formal } = params.parse()?;
        let greeting = greeting(ctx);
        let user_name = user_name(ctx.session.as_ref());

        let message = if formal {
            format!("{}, {}. How may I assist you today?", greeting, user_name)
        } else {
            format!("{}, {}!", greeting, user_name)
        };

        let details = match &ctx.session {
            Some(session) => format!("\n\nLogged in as: {}", session.email),
            None => String::new(),
        };

        Ok(CallToolResult::text(message + &details))
    }
}

/// Configured greeting, or "Hello"
pub fn greeting(ctx: &RequestContext) -> &str {
    match ctx.config.greeting.as_str() {
        "" => "Hello",
        g => g,
    }
}

/// Name to greet: full name, email local part, or "User"
pub fn user_name(session: Option<&Session>) -> &str {
    session
        .map(Session::display_name)
        .filter(|name| !name.is_empty())
        .unwrap_or("User")
}

// ==================== News ====================

struct GetNewsTool {
    news: Arc<NewsClient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetNewsArgs {
    query: Option<String>,
    country: Option<String>,
    category: Option<String>,
    #[serde(default = "default_page_size")]
    page_size: u64,
}

fn default_page_size() -> u64 {
    10
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[async_trait]
impl ToolHandler for GetNewsTool {
    async fn call(&self, params: Params, ctx: &RequestContext) -> Result<CallToolResult> {
        let Some(api_key) = ctx.secrets.get(API_KEY_SECRET) else {
            return Ok(CallToolResult::error(
                "NewsAPI key not found. Please set SECRET_NEWSAPI_KEY environment variable.\n\nGet your free API key at: https://newsapi.org/register",
            ));
        };

        let args: GetNewsArgs = params.parse()?;
        let query = NewsQuery {
            query: non_empty(args.query),
            country: non_empty(args.country),
            category: non_empty(args.category),
            page_size: args.page_size,
        };

        let data = match self.news.fetch_articles(api_key, &query).await {
            Ok(data) => data,
            Err(NewsMcpError::News(NewsApiError::Timeout)) => {
                return Ok(CallToolResult::failure(
                    "Error fetching news: request timed out",
                ));
            }
            Err(e) => return Err(e),
        };

        if data.is_error() {
            return Ok(CallToolResult::failure(format!(
                "NewsAPI Error: {}",
                data.message.as_deref().unwrap_or("Unknown error")
            )));
        }

        let articles = data.articles.unwrap_or_default();
        if articles.is_empty() {
            return Ok(CallToolResult::text("No articles found for your query."));
        }

        let list = articles
            .iter()
            .enumerate()
            .map(|(i, article)| {
                format!(
                    "{}. {}\n   Source: {}\n   {}",
                    i + 1,
                    article.title.as_deref().unwrap_or_default(),
                    article.source_name(),
                    article.url.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary = match &query.query {
            Some(q) => format!("Found {} articles for \"{}\":\n\n{}", articles.len(), q, list),
            None => format!("Top {} headlines:\n\n{}", articles.len(), list),
        };

        Ok(CallToolResult::text(summary))
    }
}

// ==================== AI ====================

const AI_NOT_CONFIGURED_DETAILED: &str = "⚠️ AI is not configured.

To use AI features:
1. Open MCP Manager settings
2. Configure an AI provider (OpenAI, OpenRouter, or Ollama)
3. Add your API key
4. Restart the server

The AI proxy provides secure access to AI models without exposing API keys to individual servers.";

const AI_UNAVAILABLE_DETAILED: &str = "⚠️ AI proxy is not available.

The AI proxy endpoint is configured but not responding.
Please check:
1. MCP Manager is running
2. AI provider is properly configured
3. API key is valid";

const AI_UNAVAILABLE: &str = "⚠️ AI proxy is not available. Please check MCP Manager settings.";

fn ai_not_configured(feature: &str) -> String {
    format!(
        "⚠️ AI is not configured. Please configure AI proxy in MCP Manager to use {}.",
        feature
    )
}

/// Business failure when the proxy is unconfigured or unreachable
async fn ai_unready(
    ai: &dyn AiClient,
    not_configured: impl FnOnce() -> String,
    unavailable: &str,
) -> Option<CallToolResult> {
    if !ai.is_configured() {
        return Some(CallToolResult::failure(not_configured()));
    }
    if !ai.is_available(false).await {
        return Some(CallToolResult::failure(unavailable));
    }
    None
}

/// Map an AI client error to its fixed user-facing message
pub fn ai_error_message(err: &AiClientError) -> String {
    match err.code {
        AiErrorCode::NotConfigured => {
            "AI proxy is not configured. Please set up AI in MCP Manager.".to_string()
        }
        AiErrorCode::Unauthorized => "AI proxy authentication failed. The token may be invalid or expired. Try restarting the server.".to_string(),
        AiErrorCode::RateLimited => {
            "Too many AI requests. Please wait a moment and try again.".to_string()
        }
        AiErrorCode::ApiError => format!("AI provider error: {}", err.message),
        AiErrorCode::Timeout => {
            "AI request timed out. The model may be overloaded, please try again.".to_string()
        }
        AiErrorCode::NetworkError => "Network error connecting to AI proxy. Check your connection and MCP Manager status.".to_string(),
    }
}

fn handle_ai_error(err: &AiClientError, operation: &str) -> CallToolResult {
    tracing::warn!(code = %err.code, operation, "AI request failed");
    CallToolResult::failure(format!(
        "❌ Failed to {}\n\n{}",
        operation,
        ai_error_message(err)
    ))
}

fn style_instruction(style: &str) -> &'static str {
    match style {
        "detailed" => "Provide a comprehensive summary in a well-structured paragraph.",
        "bullet-points" => "Provide a summary as a bulleted list of key points (3-5 bullets).",
        _ => "Provide a very concise summary in 1-2 sentences.",
    }
}

struct AiSummarizeTool {
    ai: Arc<dyn AiClient>,
}

#[derive(Debug, Deserialize)]
struct SummarizeArgs {
    text: String,
    #[serde(default = "default_style")]
    style: String,
}

fn default_style() -> String {
    "brief".to_string()
}

#[async_trait]
impl ToolHandler for AiSummarizeTool {
    async fn call(&self, params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
        let SummarizeArgs { text, style } = params.parse()?;

        if let Some(result) = ai_unready(
            self.ai.as_ref(),
            || AI_NOT_CONFIGURED_DETAILED.to_string(),
            AI_UNAVAILABLE_DETAILED,
        )
        .await
        {
            return Ok(result);
        }

        let system_prompt = format!(
            "You are a helpful assistant that creates {} summaries. {} Be accurate and capture the main ideas.",
            style,
            style_instruction(&style)
        );

        match self
            .ai
            .complete_with_system(
                &system_prompt,
                &format!("Please summarize the following text:\n\n{}", text),
                &CompletionOptions::default(),
            )
            .await
        {
            Ok(summary) => Ok(CallToolResult::text(format!(
                "📝 Summary ({}):\n\n{}",
                style, summary
            ))),
            Err(e) => Ok(handle_ai_error(&e, "summarize text")),
        }
    }
}

struct AiTranslateTool {
    ai: Arc<dyn AiClient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateArgs {
    text: String,
    target_language: String,
    #[serde(default = "default_true")]
    preserve_tone: bool,
}

fn default_true() -> bool {
    true
}

#[async_trait]
impl ToolHandler for AiTranslateTool {
    async fn call(&self, params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
        let TranslateArgs {
            text,
            target_language,
            preserve_tone,
        } = params.parse()?;

        if let Some(result) = ai_unready(
            self.ai.as_ref(),
            || ai_not_configured("translation features"),
            AI_UNAVAILABLE,
        )
        .await
        {
            return Ok(result);
        }

        let tone_instruction = if preserve_tone {
            "Preserve the original tone, style, and register of the text."
        } else {
            "Use a neutral tone."
        };

        let system_prompt = format!(
            "You are a professional translator. Translate text accurately to {}. {} Only output the translated text, no explanations.",
            target_language, tone_instruction
        );

        match self
            .ai
            .complete_with_system(&system_prompt, &text, &CompletionOptions::default())
            .await
        {
            Ok(translation) => Ok(CallToolResult::text(format!(
                "🌐 Translation ({}):\n\n{}",
                target_language, translation
            ))),
            Err(e) => Ok(handle_ai_error(&e, "translate text")),
        }
    }
}

const SENTIMENT_SYSTEM_PROMPT: &str = "You are a sentiment analysis expert. Analyze the emotional tone and sentiment of the provided text.

Respond in this exact format:
Sentiment: [Positive/Negative/Neutral/Mixed]
Confidence: [High/Medium/Low]
Emotions: [list primary emotions detected]
Analysis: [1-2 sentence explanation]";

struct AiSentimentTool {
    ai: Arc<dyn AiClient>,
}

#[derive(Debug, Deserialize)]
struct SentimentArgs {
    text: String,
}

#[async_trait]
impl ToolHandler for AiSentimentTool {
    async fn call(&self, params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
        let SentimentArgs { text } = params.parse()?;

        if let Some(result) = ai_unready(
            self.ai.as_ref(),
            || ai_not_configured("sentiment analysis"),
            AI_UNAVAILABLE,
        )
        .await
        {
            return Ok(result);
        }

        match self
            .ai
            .complete_with_system(
                SENTIMENT_SYSTEM_PROMPT,
                &format!("Analyze the sentiment of this text:\n\n{}", text),
                &CompletionOptions::default(),
            )
            .await
        {
            Ok(analysis) => Ok(CallToolResult::text(format!(
                "🎭 Sentiment Analysis:\n\n{}",
                analysis
            ))),
            Err(e) => Ok(handle_ai_error(&e, "analyze sentiment")),
        }
    }
}

struct AiChatTool {
    ai: Arc<dyn AiClient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatArgs {
    message: String,
    system_prompt: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

fn default_temperature() -> f64 {
    0.7
}

#[async_trait]
impl ToolHandler for AiChatTool {
    async fn call(&self, params: Params, _ctx: &RequestContext) -> Result<CallToolResult> {
        let ChatArgs {
            message,
            system_prompt,
            temperature,
        } = params.parse()?;
        let system_prompt = non_empty(system_prompt);

        if let Some(result) = ai_unready(
            self.ai.as_ref(),
            || ai_not_configured("chat features"),
            AI_UNAVAILABLE,
        )
        .await
        {
            return Ok(result);
        }

        let options = CompletionOptions::default().with_temperature(temperature);
        let response = match system_prompt {
            Some(system) => {
                self.ai
                    .complete_with_system(&system, &message, &options)
                    .await
            }
            None => self.ai.complete(&message, &options).await,
        };

        match response {
            Ok(response) => Ok(CallToolResult::text(format!(
                "🤖 AI Response:\n\n{}",
                response
            ))),
            Err(e) => Ok(handle_ai_error(&e, "chat")),
        }
    }
}

struct AiStatusTool {
    ai: Arc<dyn AiClient>,
}

fn set_marker(set: bool) -> &'static str {
    if set {
        "✓ Set"
    } else {
        "✗ Not set"
    }
}

#[async_trait]
impl ToolHandler for AiStatusTool {
    async fn call(&self, _params: Params, ctx: &RequestContext) -> Result<CallToolResult> {
        if !self.ai.is_configured() {
            return Ok(CallToolResult::text(format!(
                "📊 AI Status: Not Configured

The AI proxy is not configured. Environment variables missing:
- {}: {}
- {}: {}

To enable AI features:
1. Open MCP Manager
2. Go to Settings → AI Provider
3. Configure your preferred AI provider
4. Restart this server",
                URL_SECRET,
                set_marker(ctx.secrets.contains(URL_SECRET)),
                TOKEN_SECRET,
                set_marker(ctx.secrets.contains(TOKEN_SECRET)),
            )));
        }

        if !self.ai.is_available(true).await {
            return Ok(CallToolResult::text(
                "📊 AI Status: Configured but Unavailable

Configuration:
- MCP_AI_PROXY_URL: ✓ Set
- MCP_AI_PROXY_TOKEN: ✓ Set

However, the AI proxy is not responding.
Please check MCP Manager is running and AI provider is properly configured.",
            ));
        }

        let header = "📊 AI Status: Available ✓

Configuration:
- MCP_AI_PROXY_URL: ✓ Set
- MCP_AI_PROXY_TOKEN: ✓ Set
- Proxy Health: ✓ Responding";

        match self.ai.get_models().await {
            Ok(models) => {
                let list = models
                    .data
                    .iter()
                    .map(|m| match &m.owned_by {
                        Some(owner) => format!("  - {} ({})", m.id, owner),
                        None => format!("  - {}", m.id),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let list = if list.is_empty() {
                    "  (no models available)".to_string()
                } else {
                    list
                };

                Ok(CallToolResult::text(format!(
                    "{}\n\nAvailable Models:\n{}\n\nYou can now use AI tools like ai_summarize, ai_translate, ai_analyze_sentiment, and ai_chat.",
                    header, list
                )))
            }
            Err(e) => Ok(CallToolResult::text(format!(
                "{}\n\nCould not fetch model list: {}\n\nAI is available for use despite model list error.",
                header,
                crate::sanitize::sanitize_for_response(&e)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx_with(session: Option<Session>) -> RequestContext {
        RequestContext::new(Arc::new(Config::default())).with_session(session)
    }

    #[tokio::test]
    async fn test_greet_uses_email_local_part() {
        let session = Session::new("jane@x.com", None).unwrap();
        let params = Schema::new()
            .field(FieldSpec::boolean("formal").optional().default_value(json!(false)))
            .validate(&json!({}))
            .unwrap();
        let result = GreetTool.call(params, &ctx_with(Some(session))).await.unwrap();
        assert_eq!(
            result.text_content(),
            "Hello, jane!\n\nLogged in as: jane@x.com"
        );
    }

    #[tokio::test]
    async fn test_greet_formal_without_session() {
        let params = Schema::new()
            .field(FieldSpec::boolean("formal"))
            .validate(&json!({"formal": true}))
            .unwrap();
        let result = GreetTool.call(params, &ctx_with(None)).await.unwrap();
        assert_eq!(result.text_content(), "Hello, User. How may I assist you today?");
    }

    #[test]
    fn test_user_name_prefers_full_name() {
        let session = Session::new("jane@x.com", Some("Jane Doe".to_string())).unwrap();
        assert_eq!(user_name(Some(&session)), "Jane Doe");
        assert_eq!(user_name(None), "User");
    }

    #[test]
    fn test_ai_error_messages() {
        let err = AiClientError::new(AiErrorCode::ApiError, "model overloaded");
        assert_eq!(ai_error_message(&err), "AI provider error: model overloaded");

        let err = AiClientError::new(AiErrorCode::RateLimited, "429");
        assert!(ai_error_message(&err).starts_with("Too many AI requests"));

        let result = handle_ai_error(&err, "chat");
        assert!(result.is_error);
        assert!(result.text_content().starts_with("❌ Failed to chat\n\n"));
    }

    #[test]
    fn test_news_args_decode_from_validated_params() {
        let params = Schema::new()
            .field(FieldSpec::string("query").optional())
            .field(FieldSpec::integer("pageSize").optional().default_value(json!(10)))
            .validate(&json!({"query": "", "pageSize": 5.0}))
            .unwrap();
        let args: GetNewsArgs = params.parse().unwrap();
        assert_eq!(args.page_size, 5);
        assert_eq!(non_empty(args.query), None);
        assert_eq!(args.country, None);
    }

    #[test]
    fn test_chat_args_fill_defaults() {
        let params = Schema::new()
            .field(FieldSpec::string("message"))
            .validate(&json!({"message": "hi", "systemPrompt": "be terse"}))
            .unwrap();
        let args: ChatArgs = params.parse().unwrap();
        assert_eq!(args.message, "hi");
        // systemPrompt is not declared, so validation drops it
        assert_eq!(args.system_prompt, None);
        assert_eq!(args.temperature, 0.7);
    }

    #[test]
    fn test_args_type_mismatch_is_an_error() {
        let params = Schema::new().validate(&json!({})).unwrap();
        let err = params.parse::<SentimentArgs>().unwrap_err();
        assert!(matches!(err, NewsMcpError::Json(_)));
    }

    #[test]
    fn test_style_instruction() {
        assert!(style_instruction("bullet-points").contains("bulleted list"));
        assert!(style_instruction("brief").contains("1-2 sentences"));
    }
}
