//! Tavily web search.
//!
//! Not part of the chat flow; the `search` subcommand is its only caller.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const TAVILY_API_URL: &str = "https://api.tavily.com/search";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Tavily API Key is missing.")]
    MissingApiKey,

    #[error("Tavily request failed: {0}")]
    Request(String),

    #[error("Tavily API Error: {0}")]
    Api(String),

    #[error("Tavily response parse failed: {0}")]
    Parse(String),
}

#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    url: String,
}

impl TavilyClient {
    pub fn new() -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SearchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: TAVILY_API_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Run an advanced search capped at five results.
    ///
    /// Fails with [`SearchError::MissingApiKey`] before touching the network
    /// when no key is configured.
    pub async fn search(&self, query: &str, api_key: Option<&str>) -> Result<SearchResponse, SearchError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(SearchError::MissingApiKey)?;

        let request = TavilyRequest {
            api_key,
            query,
            search_depth: "advanced",
            include_answer: true,
            max_results: 5,
        };

        tracing::info!(query, "sending Tavily search");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("request failed");
            return Err(SearchError::Api(error_detail(&body, reason)));
        }

        serde_json::from_str(&body).map_err(|e| SearchError::Parse(e.to_string()))
    }
}

/// The `detail` field of an error body, or `fallback` when there is none.
fn error_detail(body: &str, fallback: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());

    match detail {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Object(map)) => map
            .get("error")
            .and_then(Value::as_str)
            .map_or_else(|| Value::Object(map.clone()).to_string(), str::to_string),
        Some(Value::Null) | None => fallback.to_string(),
        Some(Value::String(_)) => fallback.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        // Unroutable URL: reaching the network would surface as Request, not MissingApiKey
        let client = TavilyClient::new().unwrap().with_url("http://127.0.0.1:9/search");

        let err = client.search("rust async", None).await.unwrap_err();
        assert!(matches!(err, SearchError::MissingApiKey));

        let err = client.search("rust async", Some("")).await.unwrap_err();
        assert!(matches!(err, SearchError::MissingApiKey));
    }

    #[test]
    fn test_request_body_shape() {
        let request = TavilyRequest {
            api_key: "tvly-1",
            query: "tokio select",
            search_depth: "advanced",
            include_answer: true,
            max_results: 5,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "api_key": "tvly-1",
                "query": "tokio select",
                "search_depth": "advanced",
                "include_answer": true,
                "max_results": 5
            })
        );
    }

    #[test]
    fn test_error_detail_variants() {
        assert_eq!(error_detail(r#"{"detail":"Invalid API key"}"#, "Unauthorized"), "Invalid API key");
        assert_eq!(
            error_detail(r#"{"detail":{"error":"Usage limit exceeded"}}"#, "Too Many Requests"),
            "Usage limit exceeded"
        );
        assert_eq!(error_detail("not json", "Bad Gateway"), "Bad Gateway");
        assert_eq!(error_detail(r#"{"message":"x"}"#, "Bad Request"), "Bad Request");
    }

    #[test]
    fn test_api_error_display() {
        let err = SearchError::Api("Invalid API key".to_string());
        assert_eq!(err.to_string(), "Tavily API Error: Invalid API key");
    }

    #[test]
    fn test_parse_response() {
        let body = serde_json::json!({
            "query": "q",
            "answer": "Use tokio::select!",
            "results": [
                { "title": "Tokio docs", "url": "https://tokio.rs", "content": "select!", "score": 0.93 }
            ]
        })
        .to_string();
        let parsed: SearchResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("Use tokio::select!"));
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].url, "https://tokio.rs");
    }
}
