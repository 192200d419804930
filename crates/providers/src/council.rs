//! The council seat: a second model consulted for an outside opinion.
//!
//! The seat wraps whichever backend carries council calls and holds the
//! currently seated model. A consultation is a single-shot generation of the
//! prepared brief; if the seated model fails or times out, the failure is
//! reported as-is. No response is ever synthesized on the council's behalf.

use sovwren_core::client::{GenerateRequest, LlmClient};
use sovwren_core::error::ProviderError;
use sovwren_config::{AppConfig, CouncilConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::ollama::OllamaClient;
use crate::openai_compat::OpenAiCompatClient;

const COUNCIL_SYSTEM: &str = "You are a consulting model providing a second \
opinion. You receive a prepared brief, not the full conversation. Answer the \
question in the brief directly and concisely.";

pub struct CouncilSeat {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl CouncilSeat {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    /// Build the seat from configuration, choosing the backend the config
    /// names for council calls.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let timeout = config.timeouts.council();
        let client = build_backend(&config.council, config, timeout)?;
        Ok(Self::new(client, config.council.default_model.clone(), timeout))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_name(&self) -> &str {
        self.client.name()
    }

    /// Re-seat a different model. The backend stays the same.
    pub fn seat(&mut self, model: impl Into<String>) {
        self.model = model.into();
        info!(model = %self.model, "council model seated");
    }

    /// Send a prepared brief to the seated model and return its response.
    pub async fn consult(&self, brief: &str) -> Result<String, ProviderError> {
        debug!(model = %self.model, brief_chars = brief.len(), "consulting council");

        let mut request = GenerateRequest::single_shot(&self.model, brief);
        request.system = Some(COUNCIL_SYSTEM.to_string());

        let response = tokio::time::timeout(self.timeout, self.client.generate(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "council model '{}' did not respond within {}s",
                    self.model,
                    self.timeout.as_secs()
                ))
            })??;

        Ok(response.text)
    }

    pub async fn health_check(&self) -> bool {
        self.client.health_check().await.unwrap_or(false)
    }
}

fn build_backend(
    council: &CouncilConfig,
    config: &AppConfig,
    timeout: Duration,
) -> Result<Arc<dyn LlmClient>, ProviderError> {
    match council.backend.as_str() {
        "openai" => {
            let compat = &config.openai_compat;
            let base_url = compat.base_url.clone().ok_or_else(|| {
                ProviderError::NotConfigured(
                    "council backend is 'openai' but no base_url is set".into(),
                )
            })?;
            let client = OpenAiCompatClient::new(
                base_url,
                compat.api_key.clone(),
                config.embedding_model.clone(),
                timeout,
            )?;
            Ok(Arc::new(client))
        }
        _ => {
            let client = OllamaClient::new(
                config.ollama.base_url.clone(),
                config.embedding_model.clone(),
                timeout,
            )?;
            Ok(Arc::new(client))
        }
    }
}
