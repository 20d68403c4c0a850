//! NewsAPI type definitions

use serde::Deserialize;

/// Status value NewsAPI uses for error payloads
pub const STATUS_ERROR: &str = "error";

/// Response from `/everything` and `/top-headlines`
#[derive(Debug, Clone, Deserialize)]
pub struct ArticlesResponse {
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub articles: Option<Vec<Article>>,
}

impl ArticlesResponse {
    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

/// A single article
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub source: Option<ArticleSource>,

    #[serde(default)]
    pub url: Option<String>,
}

impl Article {
    /// Source name, or "Unknown"
    pub fn source_name(&self) -> &str {
        self.source
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or("Unknown")
    }
}

/// Article source reference
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleSource {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// Response from `/sources`
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesResponse {
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub sources: Option<Vec<NewsSource>>,
}

impl SourcesResponse {
    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

/// A news source; NewsAPI sends `null` for fields it does not know
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsSource {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub language: Option<String>,
}

/// Parameters of an articles lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsQuery {
    /// Free-text search; selects the `/everything` endpoint when present
    pub query: Option<String>,

    /// ISO 3166-1 alpha-2 country code (top headlines only)
    pub country: Option<String>,

    /// News category (top headlines only)
    pub category: Option<String>,

    pub page_size: u64,
}
