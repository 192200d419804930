//! Native Ollama client.
//!
//! Talks to a local Ollama daemon over its own API:
//! - `/api/chat` for multi-turn generation (non-streaming and NDJSON stream)
//! - `/api/generate` for the single-shot plaintext path
//! - `/api/tags` for model listing
//! - `/api/embeddings` for embedding calls

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sovwren_core::client::{
    GenerateRequest, GenerateResponse, LlmClient, ModelInfo, StreamChunk, Usage,
};
use sovwren_core::error::ProviderError;
use sovwren_core::message::Role;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub struct OllamaClient {
    base_url: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("client build: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            embedding_model: embedding_model.into(),
            client,
        })
    }

    /// Role-labeled API messages for the chat path. Council responses are
    /// never mapped into `assistant`; they stay out of the request.
    fn to_api_messages(request: &GenerateRequest) -> Vec<ApiChatMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(system) = &request.system {
            messages.push(ApiChatMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        for msg in &request.history {
            let role = match msg.role {
                Role::Steward => "user",
                Role::Node => "assistant",
                Role::System => "system",
                Role::Council => continue,
            };
            messages.push(ApiChatMessage {
                role: role.into(),
                content: msg.content.clone(),
            });
        }
        messages.push(ApiChatMessage {
            role: "user".into(),
            content: with_context(&request.input, request.context.as_deref()),
        });
        messages
    }

    fn map_status(status: u16, body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited { retry_after_secs: 5 },
            401 | 403 => ProviderError::AuthenticationFailed("rejected by backend".into()),
            404 if body.contains("model") => ProviderError::ModelNotFound(body),
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }

    fn map_transport(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    async fn chat(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ApiChatRequest {
            model: &request.model,
            messages: Self::to_api_messages(request),
            stream: false,
        };

        debug!(model = %request.model, turns = request.history.len(), "ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status, "ollama chat error");
            return Err(Self::map_status(status, body));
        }

        let api: ApiChatResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("failed to parse chat response: {e}"),
        })?;

        Ok(GenerateResponse {
            text: api.message.map(|m| m.content).unwrap_or_default(),
            model: api.model.unwrap_or_else(|| request.model.clone()),
            usage: usage_from_counts(api.prompt_eval_count, api.eval_count),
        })
    }

    async fn single_shot(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = ApiGenerateRequest {
            model: &request.model,
            prompt: with_context(&request.input, request.context.as_deref()),
            system: request.system.as_deref(),
            stream: false,
        };

        debug!(model = %request.model, "ollama single-shot request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let api: ApiGenerateResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("failed to parse generate response: {e}"),
            })?;

        Ok(GenerateResponse {
            text: api.response,
            model: api.model.unwrap_or_else(|| request.model.clone()),
            usage: usage_from_counts(api.prompt_eval_count, api.eval_count),
        })
    }
}

fn with_context(input: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!("Context Information:\n{ctx}\n\n{input}"),
        _ => input.to_string(),
    }
}

fn usage_from_counts(prompt: Option<u32>, completion: Option<u32>) -> Option<Usage> {
    match (prompt, completion) {
        (None, None) => None,
        (p, c) => Some(Usage {
            prompt_tokens: p.unwrap_or(0),
            completion_tokens: c.unwrap_or(0),
        }),
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        if request.history.is_empty() && request.system.is_none() {
            self.single_shot(&request).await
        } else {
            self.chat(&request).await
        }
    }

    async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let url = format!("{}/api/chat", self.base_url);
        let body = ApiChatRequest {
            model: &request.model,
            messages: Self::to_api_messages(&request),
            stream: true,
        };

        debug!(model = %request.model, "ollama streaming request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the NDJSON byte stream line by line until the done frame.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<ApiChatResponse>(&line) {
                        Ok(frame) => {
                            let done = frame.done.unwrap_or(false);
                            let chunk = StreamChunk {
                                content: frame.message.map(|m| m.content),
                                done,
                                usage: if done {
                                    usage_from_counts(frame.prompt_eval_count, frame.eval_count)
                                } else {
                                    None
                                },
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(error = %e, "ignoring unparseable NDJSON frame");
                        }
                    }
                }
            }

            // stream ended without a done frame
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: None,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut out = Vec::with_capacity(texts.len());

        for text in texts {
            let response = self
                .client
                .post(&url)
                .json(&ApiEmbeddingRequest {
                    model: &self.embedding_model,
                    prompt: text,
                })
                .send()
                .await
                .map_err(Self::map_transport)?;

            let status = response.status().as_u16();
            if status != 200 {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::EmbeddingFailed(format!(
                    "status {status}: {body}"
                )));
            }

            let api: ApiEmbeddingResponse =
                response.json().await.map_err(|e| {
                    ProviderError::EmbeddingFailed(format!("parse: {e}"))
                })?;
            out.push(api.embedding);
        }
        Ok(out)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: ApiTagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(body.models.into_iter().map(ApiModel::into_info).collect())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ApiChatMessage>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiTagsResponse {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    details: Option<ApiModelDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiModelDetails {
    #[serde(default)]
    family: Option<String>,
}

impl ApiModel {
    fn into_info(self) -> ModelInfo {
        ModelInfo {
            name: self.name,
            size: self.size,
            modified_at: self.modified_at,
            family: self.details.and_then(|d| d.family),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sovwren_core::message::ChatMessage;

    fn client() -> OllamaClient {
        OllamaClient::new("http://localhost:11434/", "nomic-embed-text", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn base_url_is_trimmed() {
        assert_eq!(client().base_url, "http://localhost:11434");
    }

    #[test]
    fn role_mapping_skips_council() {
        let request = GenerateRequest {
            model: "m".into(),
            system: Some("be brief".into()),
            input: "current question".into(),
            history: vec![
                ChatMessage::steward("earlier question"),
                ChatMessage::node("earlier answer"),
                ChatMessage::council("council verdict"),
            ],
            context: None,
            temperature: 0.7,
            max_tokens: None,
            stream: false,
        };

        let messages = OllamaClient::to_api_messages(&request);
        assert_eq!(messages.len(), 4); // system + 2 history + current
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "current question");
        assert!(messages.iter().all(|m| !m.content.contains("council verdict")));
    }

    #[test]
    fn context_is_prepended_to_current_input() {
        let mut request = GenerateRequest::single_shot("m", "what is this?");
        request.context = Some("[file://a.md]\nsome notes".into());
        request.history.push(ChatMessage::steward("hi"));

        let messages = OllamaClient::to_api_messages(&request);
        let current = &messages.last().unwrap().content;
        assert!(current.starts_with("Context Information:\n"));
        assert!(current.ends_with("what is this?"));
    }

    #[test]
    fn parse_chat_response() {
        let json = r#"{"model":"ministral-3b","message":{"role":"assistant","content":"hello there"},"done":true,"prompt_eval_count":12,"eval_count":4}"#;
        let api: ApiChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(api.message.unwrap().content, "hello there");
        assert_eq!(api.prompt_eval_count, Some(12));
    }

    #[test]
    fn parse_stream_frames() {
        let mid = r#"{"message":{"role":"assistant","content":"par"},"done":false}"#;
        let last = r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":9}"#;
        let mid: ApiChatResponse = serde_json::from_str(mid).unwrap();
        let last: ApiChatResponse = serde_json::from_str(last).unwrap();
        assert_eq!(mid.done, Some(false));
        assert_eq!(last.done, Some(true));
        assert_eq!(last.eval_count, Some(9));
    }

    #[test]
    fn parse_tags_response() {
        let json = r#"{"models":[
            {"name":"ministral-3b","size":2000000000,"modified_at":"2026-01-02T03:04:05Z","details":{"family":"mistral"}},
            {"name":"bare-model"}
        ]}"#;
        let body: ApiTagsResponse = serde_json::from_str(json).unwrap();
        let infos: Vec<ModelInfo> = body.models.into_iter().map(ApiModel::into_info).collect();
        assert_eq!(infos[0].family.as_deref(), Some("mistral"));
        assert_eq!(infos[1].name, "bare-model");
        assert!(infos[1].size.is_none());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            OllamaClient::map_status(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            OllamaClient::map_status(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            OllamaClient::map_status(404, "model 'x' not found".into()),
            ProviderError::ModelNotFound(_)
        ));
        assert!(matches!(
            OllamaClient::map_status(500, String::new()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }
}
