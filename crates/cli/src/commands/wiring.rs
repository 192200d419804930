//! Shared construction of the backend stack from configuration.

use std::sync::Arc;

use sovwren_config::AppConfig;
use sovwren_core::client::LlmClient;
use sovwren_providers::OllamaClient;
use sovwren_store::Store;

pub async fn open_store() -> Result<Arc<Store>, Box<dyn std::error::Error>> {
    let db_path = AppConfig::db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::new(&format!("sqlite://{}", db_path.display())).await?;
    Ok(Arc::new(store))
}

pub fn build_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>, Box<dyn std::error::Error>> {
    let client = OllamaClient::new(
        &config.ollama.base_url,
        &config.embedding_model,
        config.timeouts.llm_response(),
    )?;
    Ok(Arc::new(client))
}
