//! DuckDuckGo adapter — keyless, via the Instant Answer API.
//!
//! The API returns an abstract plus related topics as JSON. It is shallower
//! than a full SERP but requires no credentials, so it is the adapter that
//! always works out of the box.

use crate::adapter::{SearchAdapter, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use sovwren_core::error::SearchError;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "DuckDuckGo";
const API_URL: &str = "https://api.duckduckgo.com/";

pub struct DuckDuckGoAdapter {
    client: reqwest::Client,
    api_url: String,
}

// Wire format of the Instant Answer API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default, rename = "Heading")]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<ApiTopic>,
}

#[derive(Debug, Deserialize)]
struct ApiTopic {
    #[serde(default, rename = "FirstURL")]
    first_url: Option<String>,
    #[serde(default, rename = "Text")]
    text: Option<String>,
    /// Category nodes nest their topics one level down.
    #[serde(default, rename = "Topics")]
    topics: Vec<ApiTopic>,
}

impl DuckDuckGoAdapter {
    pub fn new(timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::fatal(PROVIDER, format!("client build: {e}")))?;
        Ok(Self {
            client,
            api_url: API_URL.to_string(),
        })
    }

    /// Point the adapter at a different endpoint (used by tests).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn collect_topics(topics: &[ApiTopic], out: &mut Vec<SearchResult>, max: usize) {
        for topic in topics {
            if out.len() >= max {
                return;
            }
            if let (Some(url), Some(text)) = (&topic.first_url, &topic.text) {
                if url.is_empty() || text.is_empty() {
                    continue;
                }
                // the Text field is "Title - description"; split on the
                // first separator when present
                let (title, snippet) = match text.split_once(" - ") {
                    Some((t, s)) => (t.to_string(), s.to_string()),
                    None => (text.clone(), text.clone()),
                };
                out.push(SearchResult::new(url.clone(), title, snippet, PROVIDER));
            }
            Self::collect_topics(&topic.topics, out, max);
        }
    }
}

#[async_trait]
impl SearchAdapter for DuckDuckGoAdapter {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(&self.api_url)
            .query(&[("q", "test"), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| SearchError::recoverable(PROVIDER, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SearchError::recoverable(
                PROVIDER,
                format!("API returned {}", response.status()),
            ));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| SearchError::recoverable(PROVIDER, format!("bad response body: {e}")))?;

        let mut results = Vec::new();
        if !body.abstract_text.is_empty() && !body.abstract_url.is_empty() {
            let title = if body.heading.is_empty() {
                body.abstract_url.clone()
            } else {
                body.heading.clone()
            };
            results.push(SearchResult::new(
                body.abstract_url.clone(),
                title,
                body.abstract_text.clone(),
                PROVIDER,
            ));
        }
        Self::collect_topics(&body.related_topics, &mut results, max_results);
        results.truncate(max_results);

        debug!(query, count = results.len(), "duckduckgo search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_parses_nested_topics() {
        let json = r#"{
            "Heading": "Rust",
            "AbstractText": "A systems language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "RelatedTopics": [
                {"FirstURL": "https://a.io", "Text": "A - first topic"},
                {"Topics": [
                    {"FirstURL": "https://b.io", "Text": "B - nested topic"}
                ]}
            ]
        }"#;
        let body: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.heading, "Rust");

        let mut results = Vec::new();
        if !body.abstract_text.is_empty() {
            results.push(SearchResult::new(
                body.abstract_url.clone(),
                body.heading.clone(),
                body.abstract_text.clone(),
                PROVIDER,
            ));
        }
        DuckDuckGoAdapter::collect_topics(&body.related_topics, &mut results, 10);
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].title, "A");
        assert_eq!(results[2].url, "https://b.io");
    }

    #[test]
    fn keyless_adapter_is_always_configured() {
        let adapter = DuckDuckGoAdapter::new(Duration::from_secs(5)).unwrap();
        assert!(adapter.is_configured());
    }
}
