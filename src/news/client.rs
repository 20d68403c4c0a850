//! NewsAPI client
//!
//! Thin HTTP client for the NewsAPI v2 endpoints used by the news tool and resource.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{NewsApiError, NewsMcpError, Result};
use crate::news::types::{ArticlesResponse, NewsQuery, SourcesResponse};

/// NewsAPI client
pub struct NewsClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// Base URL, without trailing slash
    base_url: String,
}

impl NewsClient {
    /// Create a new NewsAPI client with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL for an articles lookup: `/everything` when a query is given,
    /// `/top-headlines` otherwise
    pub fn articles_url(&self, api_key: &str, query: &NewsQuery) -> String {
        let key = urlencoding::encode(api_key);
        match query.query.as_deref() {
            Some(q) => format!(
                "{}/everything?q={}&pageSize={}&apiKey={}",
                self.base_url,
                urlencoding::encode(q),
                query.page_size,
                key
            ),
            None => {
                let mut url = format!(
                    "{}/top-headlines?pageSize={}&apiKey={}",
                    self.base_url, query.page_size, key
                );
                if let Some(country) = &query.country {
                    url.push_str(&format!("&country={}", urlencoding::encode(country)));
                }
                if let Some(category) = &query.category {
                    url.push_str(&format!("&category={}", urlencoding::encode(category)));
                }
                url
            }
        }
    }

    pub fn sources_url(&self, api_key: &str) -> String {
        format!(
            "{}/sources?apiKey={}",
            self.base_url,
            urlencoding::encode(api_key)
        )
    }

    /// Fetch articles. An upstream `status: "error"` payload is returned as-is.
    pub async fn fetch_articles(
        &self,
        api_key: &str,
        query: &NewsQuery,
    ) -> Result<ArticlesResponse> {
        self.get_json(&self.articles_url(api_key, query)).await
    }

    /// Fetch the list of available sources
    pub async fn fetch_sources(&self, api_key: &str) -> Result<SourcesResponse> {
        self.get_json(&self.sources_url(api_key)).await
    }

    // NewsAPI returns JSON error payloads with non-2xx statuses, so the body is
    // parsed regardless of status.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(map_request_error)?;

        tracing::debug!(status = %response.status(), "NewsAPI response");

        response.json::<T>().await.map_err(map_request_error)
    }
}

/// Timeouts become a business failure; the URL (which carries the API key)
/// is stripped from anything else.
fn map_request_error(err: reqwest::Error) -> NewsMcpError {
    if err.is_timeout() {
        NewsMcpError::News(NewsApiError::Timeout)
    } else {
        NewsMcpError::Http(err.without_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> NewsClient {
        NewsClient::new("https://newsapi.org/v2/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_everything_url() {
        let query = NewsQuery {
            query: Some("rust lang".to_string()),
            country: Some("us".to_string()),
            category: None,
            page_size: 5,
        };
        assert_eq!(
            client().articles_url("KEY", &query),
            "https://newsapi.org/v2/everything?q=rust%20lang&pageSize=5&apiKey=KEY"
        );
    }

    #[test]
    fn test_top_headlines_url() {
        let query = NewsQuery {
            query: None,
            country: Some("us".to_string()),
            category: Some("science".to_string()),
            page_size: 10,
        };
        assert_eq!(
            client().articles_url("KEY", &query),
            "https://newsapi.org/v2/top-headlines?pageSize=10&apiKey=KEY&country=us&category=science"
        );
    }

    #[test]
    fn test_top_headlines_url_without_filters() {
        let query = NewsQuery {
            page_size: 10,
            ..Default::default()
        };
        assert_eq!(
            client().articles_url("KEY", &query),
            "https://newsapi.org/v2/top-headlines?pageSize=10&apiKey=KEY"
        );
    }

    #[test]
    fn test_sources_url() {
        assert_eq!(
            client().sources_url("KEY"),
            "https://newsapi.org/v2/sources?apiKey=KEY"
        );
    }
}
