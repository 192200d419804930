//! LlmClient trait — the abstraction over local and remote LLM backends.
//!
//! A client knows how to send a composed prompt (single-shot or with
//! role-labeled history) to a model and get text back, either complete or
//! as a stream of chunks.
//!
//! Implementations: Ollama native chat, OpenAI-compatible endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ChatMessage;

/// A generation request.
///
/// When `history` is non-empty adapters use their multi-turn chat path with
/// role-labeled messages; otherwise they use the single-shot plaintext path.
/// `context` is retrieval/search material, prepended to the current input
/// rather than carried as its own role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,

    /// Composed system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The current steward input.
    pub input: String,

    /// Prior conversation, excluding the current input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,

    /// Retrieved context to prepend to the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,
}

impl GenerateRequest {
    pub fn single_shot(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            input: input.into(),
            history: Vec::new(),
            context: None,
            temperature: default_temperature(),
            max_tokens: None,
            stream: false,
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete (non-streaming) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,

    /// Which model actually responded (may differ from requested).
    pub model: String,

    /// Prompt/completion token counts when the backend reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A single chunk in a streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Model metadata, normalized at the adapter seam.
///
/// Backends report heterogeneous shapes; everything is folded into this
/// fixed record before it leaves a provider crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
            family: None,
        }
    }
}

/// The core LlmClient trait.
///
/// Every backend implements this; the orchestrator calls `generate()` or
/// `generate_stream()` without knowing which backend is seated.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a request and get the complete response text.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `generate()` and wraps the result as a
    /// single chunk.
    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.generate(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.text),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation reports that embeddings aren't supported.
    async fn embed(
        &self,
        _texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "backend '{}' does not support embeddings",
            self.name()
        )))
    }

    /// List available models for this backend.
    async fn list_models(&self) -> std::result::Result<Vec<ModelInfo>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shot_request_defaults() {
        let req = GenerateRequest::single_shot("ministral-3b", "hello");
        assert!(req.history.is_empty());
        assert!(req.system.is_none());
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.stream);
    }

    #[test]
    fn model_info_serialization_skips_empty_fields() {
        let info = ModelInfo::named("llama-3.2");
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("llama-3.2"));
        assert!(!json.contains("size"));
        assert!(!json.contains("family"));
    }
}
