//! AI proxy client
//!
//! Tools never see provider API keys: they call a local proxy with a
//! short-lived bearer token supplied by the hosting manager.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::ai::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionOptions, ModelsResponse,
};
use crate::config::ai_proxy::{TOKEN_SECRET, URL_SECRET};
use crate::error::{AiClientError, AiErrorCode, Result};
use crate::mcp::context::Secrets;
use crate::sanitize::sanitize_value;

/// How long a health check result is reused
const AVAILABILITY_TTL: Duration = Duration::from_secs(30);

/// Result of an AI proxy call
pub type AiResult<T> = std::result::Result<T, AiClientError>;

/// Client for an AI completion proxy
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Whether the proxy URL and token are both set
    fn is_configured(&self) -> bool;

    /// Whether the proxy answers its health check.
    ///
    /// Results may be cached; `force_recheck` bypasses the cache.
    async fn is_available(&self, force_recheck: bool) -> bool;

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> AiResult<String>;

    async fn complete_with_system(
        &self,
        system_prompt: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> AiResult<String>;

    async fn get_models(&self) -> AiResult<ModelsResponse>;
}

/// HTTP client for an OpenAI-compatible proxy
pub struct ProxyAiClient {
    http_client: reqwest::Client,
    base_url: Option<String>,
    token: Option<String>,
    availability: Mutex<Option<(bool, Instant)>>,
}

impl ProxyAiClient {
    pub fn new(base_url: Option<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url
                .filter(|u| !u.trim().is_empty())
                .map(|u| u.trim_end_matches('/').to_string()),
            token: token.filter(|t| !t.trim().is_empty()),
            availability: Mutex::new(None),
        })
    }

    /// Build from the proxy URL and token secrets
    pub fn from_secrets(secrets: &Secrets, timeout: Duration) -> Result<Self> {
        Self::new(
            secrets.get(URL_SECRET).map(str::to_string),
            secrets.get(TOKEN_SECRET).map(str::to_string),
            timeout,
        )
    }

    fn credentials(&self) -> AiResult<(&str, &str)> {
        match (self.base_url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) => Ok((url, token)),
            _ => Err(AiClientError::new(
                AiErrorCode::NotConfigured,
                "AI proxy URL or token is not set",
            )),
        }
    }

    fn cached_availability(&self) -> Option<bool> {
        let guard = self.availability.lock().ok()?;
        match *guard {
            Some((available, checked_at)) if checked_at.elapsed() < AVAILABILITY_TTL => {
                Some(available)
            }
            _ => None,
        }
    }

    fn store_availability(&self, available: bool) {
        if let Ok(mut guard) = self.availability.lock() {
            *guard = Some((available, Instant::now()));
        }
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &CompletionOptions,
    ) -> AiResult<String> {
        let (base_url, token) = self.credentials()?;

        let request = ChatCompletionRequest {
            model: options.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/chat/completions", base_url))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        let body: ChatCompletionResponse = response.json().await.map_err(map_send_error)?;

        body.content().map(str::to_string).ok_or_else(|| {
            AiClientError::new(AiErrorCode::ApiError, "AI provider returned no choices")
        })
    }
}

#[async_trait]
impl AiClient for ProxyAiClient {
    fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn is_available(&self, force_recheck: bool) -> bool {
        let Ok((base_url, token)) = self.credentials() else {
            return false;
        };

        if !force_recheck {
            if let Some(available) = self.cached_availability() {
                return available;
            }
        }

        let available = match self
            .http_client
            .get(format!("{}/health", base_url))
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e.without_url(), "AI proxy health check failed");
                false
            }
        };

        self.store_availability(available);
        available
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> AiResult<String> {
        self.chat(vec![ChatMessage::user(prompt)], options).await
    }

    async fn complete_with_system(
        &self,
        system_prompt: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> AiResult<String> {
        self.chat(
            vec![ChatMessage::system(system_prompt), ChatMessage::user(prompt)],
            options,
        )
        .await
    }

    async fn get_models(&self) -> AiResult<ModelsResponse> {
        let (base_url, token) = self.credentials()?;

        let response = self
            .http_client
            .get(format!("{}/v1/models", base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        response.json().await.map_err(map_send_error)
    }
}

fn map_send_error(err: reqwest::Error) -> AiClientError {
    if err.is_timeout() {
        AiClientError::new(AiErrorCode::Timeout, "request timed out")
    } else if err.is_decode() {
        AiClientError::new(AiErrorCode::ApiError, err.without_url().to_string())
    } else {
        AiClientError::new(AiErrorCode::NetworkError, err.without_url().to_string())
    }
}

async fn check_status(response: reqwest::Response) -> AiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = error_message(&text).unwrap_or_else(|| format!("HTTP {}", status));
    let code = status_code(status.as_u16());
    Err(AiClientError::new(code, message))
}

/// Map an HTTP status to an error code
pub fn status_code(status: u16) -> AiErrorCode {
    match status {
        401 | 403 => AiErrorCode::Unauthorized,
        429 => AiErrorCode::RateLimited,
        408 | 504 => AiErrorCode::Timeout,
        _ => AiErrorCode::ApiError,
    }
}

/// Provider error message from `{"error": {"message": ..}}` or `{"error": ".."}`.
///
/// Providers echo request details into errors, so the message is sanitized.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error").map(sanitize_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Heads of the requests a stub proxy received, lowercased
    type Seen = Arc<Mutex<Vec<String>>>;

    /// Local proxy answering every request with the same status and body
    async fn stub_proxy(status: u16, body: &'static str) -> (String, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::default();
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let head = read_request(&mut socket).await;
                log.lock().unwrap().push(head);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), seen)
    }

    /// Read one request, body included, and return its head
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    return head;
                }
            }
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                return String::from_utf8_lossy(&data).to_lowercase();
            }
            data.extend_from_slice(&buf[..n]);
        }
    }

    async fn proxy_client(status: u16, body: &'static str) -> (ProxyAiClient, Seen) {
        let (url, seen) = stub_proxy(status, body).await;
        let ai = ProxyAiClient::new(Some(url), Some("tok".to_string()), Duration::from_secs(5))
            .unwrap();
        (ai, seen)
    }

    #[tokio::test]
    async fn test_completion_success() {
        let (ai, seen) = proxy_client(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#,
        )
        .await;

        let reply = ai
            .complete_with_system("be brief", "hello", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");

        let seen = seen.lock().unwrap();
        assert!(seen[0].starts_with("post /v1/chat/completions "));
        assert!(seen[0].contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn test_completion_without_choices() {
        let (ai, _) = proxy_client(200, r#"{"choices":[]}"#).await;
        let err = ai.complete("hi", &CompletionOptions::default()).await.unwrap_err();
        assert_eq!(err.code, AiErrorCode::ApiError);
        assert_eq!(err.message, "AI provider returned no choices");
    }

    #[tokio::test]
    async fn test_unauthorized_status() {
        let (ai, _) = proxy_client(401, r#"{"error":"token expired"}"#).await;
        let err = ai.complete("hi", &CompletionOptions::default()).await.unwrap_err();
        assert_eq!(err.code, AiErrorCode::Unauthorized);
        assert_eq!(err.message, "token expired");
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let (ai, _) = proxy_client(429, "slow down").await;
        let err = ai.get_models().await.unwrap_err();
        assert_eq!(err.code, AiErrorCode::RateLimited);
        assert_eq!(err.message, "HTTP 429 Too Many Requests");
    }

    #[tokio::test]
    async fn test_provider_error_message() {
        let (ai, _) = proxy_client(500, r#"{"error":{"message":"boom"}}"#).await;
        let err = ai.complete("hi", &CompletionOptions::default()).await.unwrap_err();
        assert_eq!(err.code, AiErrorCode::ApiError);
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn test_provider_error_message_is_sanitized() {
        let (ai, _) = proxy_client(
            500,
            r#"{"error":{"message":"rejected Bearer abc123 for sk0123456789abcdef0123456789abcdef0123456789"}}"#,
        )
        .await;
        let err = ai.complete("hi", &CompletionOptions::default()).await.unwrap_err();
        assert!(!err.message.contains("abc123"));
        assert!(!err.message.contains("sk0123456789abcdef"));
        assert!(err.message.contains("[API_KEY_REMOVED]"));
    }

    #[tokio::test]
    async fn test_get_models() {
        let (ai, seen) = proxy_client(
            200,
            r#"{"object":"list","data":[{"id":"gpt-4o-mini","owned_by":"openai"}]}"#,
        )
        .await;
        let models = ai.get_models().await.unwrap();
        assert_eq!(models.data[0].id, "gpt-4o-mini");
        assert!(seen.lock().unwrap()[0].starts_with("get /v1/models "));
    }

    #[tokio::test]
    async fn test_availability_is_cached() {
        let (ai, seen) = proxy_client(200, "{}").await;

        assert!(ai.is_available(false).await);
        assert!(ai.is_available(false).await);
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(ai.is_available(true).await);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(seen.lock().unwrap()[0].starts_with("get /health "));
    }

    #[tokio::test]
    async fn test_unhealthy_proxy_is_unavailable() {
        let (ai, _) = proxy_client(503, "{}").await;
        assert!(!ai.is_available(false).await);
        assert_eq!(ai.cached_availability(), Some(false));
    }

    fn client(url: Option<&str>, token: Option<&str>) -> ProxyAiClient {
        ProxyAiClient::new(
            url.map(str::to_string),
            token.map(str::to_string),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_is_configured() {
        assert!(client(Some("http://localhost:9"), Some("t")).is_configured());
        assert!(!client(Some("http://localhost:9"), None).is_configured());
        assert!(!client(None, Some("t")).is_configured());
        assert!(!client(Some("  "), Some("t")).is_configured());
    }

    #[tokio::test]
    async fn test_not_configured_errors() {
        let ai = client(None, None);
        assert!(!ai.is_available(true).await);

        let err = ai.complete("hi", &CompletionOptions::default()).await.unwrap_err();
        assert_eq!(err.code, AiErrorCode::NotConfigured);

        let err = ai.get_models().await.unwrap_err();
        assert_eq!(err.code, AiErrorCode::NotConfigured);
    }

    #[test]
    fn test_cached_availability() {
        let ai = client(Some("http://localhost:9"), Some("t"));
        assert_eq!(ai.cached_availability(), None);
        ai.store_availability(true);
        assert_eq!(ai.cached_availability(), Some(true));
    }

    #[test]
    fn test_from_secrets() {
        let secrets = Secrets::from_pairs([
            (URL_SECRET, "http://127.0.0.1:4000/"),
            (TOKEN_SECRET, "tok"),
        ]);
        let ai = ProxyAiClient::from_secrets(&secrets, Duration::from_secs(1)).unwrap();
        assert!(ai.is_configured());
        assert_eq!(ai.base_url.as_deref(), Some("http://127.0.0.1:4000"));
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(status_code(401), AiErrorCode::Unauthorized);
        assert_eq!(status_code(403), AiErrorCode::Unauthorized);
        assert_eq!(status_code(429), AiErrorCode::RateLimited);
        assert_eq!(status_code(504), AiErrorCode::Timeout);
        assert_eq!(status_code(500), AiErrorCode::ApiError);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"message":"model not found"}}"#).as_deref(),
            Some("model not found")
        );
        assert_eq!(error_message(r#"{"error":"bad"}"#).as_deref(), Some("bad"));
        assert_eq!(error_message(r#"{"detail":"bad"}"#), None);
        assert_eq!(error_message("<html>"), None);
    }
}
