//! Ollama web search adapter — cloud API, requires an account key.
//!
//! This is ollama.com's hosted search endpoint, not the local inference
//! daemon. The API caps at 10 results per call.

use crate::adapter::{SearchAdapter, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sovwren_core::error::SearchError;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "Ollama";
const API_URL: &str = "https://ollama.com/api/web_search";
const API_MAX_RESULTS: usize = 10;

pub struct OllamaWebAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

impl OllamaWebAdapter {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::fatal(PROVIDER, format!("client build: {e}")))?;
        Ok(Self {
            client,
            api_url: API_URL.to_string(),
            api_key,
        })
    }

    /// Point the adapter at a different endpoint (used by tests).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl SearchAdapter for OllamaWebAdapter {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn health_check(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        match self.search("test", 1).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let Some(key) = &self.api_key else {
            return Err(SearchError::fatal(
                PROVIDER,
                "OLLAMA_API_KEY not set, get one at ollama.com",
            ));
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(key)
            .json(&ApiRequest {
                query,
                max_results: max_results.min(API_MAX_RESULTS),
            })
            .send()
            .await
            .map_err(|e| SearchError::recoverable(PROVIDER, format!("request failed: {e}")))?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(SearchError::fatal(PROVIDER, "invalid API key")),
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(SearchError::recoverable(
                    PROVIDER,
                    format!("API returned {status}: {body}"),
                ));
            }
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| SearchError::recoverable(PROVIDER, format!("bad response body: {e}")))?;

        let results: Vec<SearchResult> = body
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty() && !r.title.is_empty())
            .map(|r| SearchResult::new(r.url, r.title, r.content, PROVIDER))
            .collect();

        debug!(query, count = results.len(), "ollama web search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unkeyed_adapter_is_not_configured() {
        let adapter = OllamaWebAdapter::new(None, Duration::from_secs(5)).unwrap();
        assert!(!adapter.is_configured());
    }

    #[tokio::test]
    async fn search_without_key_is_fatal() {
        let adapter = OllamaWebAdapter::new(None, Duration::from_secs(5)).unwrap();
        let err = adapter.search("anything", 3).await.unwrap_err();
        assert!(!err.recoverable);
        assert_eq!(err.provider, PROVIDER);
    }

    #[test]
    fn response_parsing_drops_incomplete_results() {
        let json = r#"{"results": [
            {"url": "https://a.io", "title": "A", "content": "alpha"},
            {"url": "", "title": "broken", "content": "no url"},
            {"url": "https://b.io", "title": "B", "content": "beta"}
        ]}"#;
        let body: ApiResponse = serde_json::from_str(json).unwrap();
        let kept: Vec<_> = body
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty() && !r.title.is_empty())
            .collect();
        assert_eq!(kept.len(), 2);
    }
}
