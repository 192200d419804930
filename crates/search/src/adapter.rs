//! The search adapter seam.
//!
//! Adapters are librarians, not oracles: they find sources and return
//! structured metadata with provenance. Synthesis happens in the Node,
//! citing the URLs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sovwren_core::error::SearchError;

/// A single search result with full provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub retrieved_at: DateTime<Utc>,
    pub provider: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl SearchResult {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let snippet = snippet.into();
        let domain = domain_of(&url);
        let content_hash = Some(hash_content(&snippet));
        Self {
            url,
            title: title.into(),
            snippet,
            retrieved_at: Utc::now(),
            provider: provider.into(),
            domain,
            content_hash,
        }
    }

    /// Format this result for injection into the Node's context. The
    /// source is explicit so it cannot be laundered into the answer.
    pub fn to_context_block(&self) -> String {
        format!(
            "[Source: {}]\nTitle: {}\n{}\n---",
            self.url, self.title, self.snippet
        )
    }

    /// Format for citation display.
    pub fn to_citation(&self) -> String {
        format!("- [{}]({})", self.title, self.url)
    }
}

fn domain_of(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .to_string()
}

fn hash_content(snippet: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snippet.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Every search backend implements this.
///
/// Errors are surfaced, never swallowed; there is no silent fallback from
/// one provider to another.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Human-readable name for this provider.
    fn provider_name(&self) -> &str;

    /// Whether this adapter has what it needs (credentials etc.).
    fn is_configured(&self) -> bool;

    /// Verify the adapter can reach its endpoint.
    async fn health_check(&self) -> bool;

    /// Execute a search query.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_block_names_the_source() {
        let result = SearchResult::new(
            "https://example.com/page",
            "Example Page",
            "A snippet of content.",
            "duckduckgo",
        );
        let block = result.to_context_block();
        assert!(block.starts_with("[Source: https://example.com/page]"));
        assert!(block.ends_with("---"));
        assert_eq!(result.domain, "example.com");
    }

    #[test]
    fn citation_is_markdown_link() {
        let result = SearchResult::new("https://a.io/x", "A Title", "s", "p");
        assert_eq!(result.to_citation(), "- [A Title](https://a.io/x)");
    }

    #[test]
    fn content_hash_is_stable() {
        let a = SearchResult::new("https://a.io", "t", "same snippet", "p");
        let b = SearchResult::new("https://b.io", "t", "same snippet", "p");
        assert_eq!(a.content_hash, b.content_hash);
    }
}
