//! Configuration loading and validation for Sovwren.
//!
//! Loads configuration from `~/.sovwren/config.toml` with environment
//! variable overrides. Every setting has a built-in default; a missing
//! config file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.sovwren/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model for the primary seat
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used for embedding calls
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Display name override for the Node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_name: Option<String>,

    /// Persona profile to load at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Ollama backend
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI-compatible backend (used by the council seat when keyed)
    #[serde(default)]
    pub openai_compat: OpenAiCompatConfig,

    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Council seat settings
    #[serde(default)]
    pub council: CouncilConfig,

    /// Timeout table for externalizing calls
    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_model() -> String {
    "ministral-3b".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiCompatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
        }
    }
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Provider used when the gate is opened without an explicit choice
    #[serde(default = "default_search_provider")]
    pub default_provider: String,

    /// Whether the search gate starts open
    #[serde(default)]
    pub open_at_startup: bool,

    /// API key for the keyed web search provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Maximum results woven into a single turn
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_provider() -> String {
    "duckduckgo".into()
}
fn default_max_results() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_provider: default_search_provider(),
            open_at_startup: false,
            api_key: None,
            max_results: default_max_results(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("default_provider", &self.default_provider)
            .field("open_at_startup", &self.open_at_startup)
            .field("api_key", &redact(&self.api_key))
            .field("max_results", &self.max_results)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Default council model when `/seat` names none
    #[serde(default = "default_council_model")]
    pub default_model: String,

    /// Which backend shape carries council calls: "ollama" or "openai"
    #[serde(default = "default_council_backend")]
    pub backend: String,
}

fn default_council_model() -> String {
    "mistral-nemo".into()
}
fn default_council_backend() -> String {
    "ollama".into()
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            default_model: default_council_model(),
            backend: default_council_backend(),
        }
    }
}

/// Timeouts for every externalizing call, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_embedding_secs")]
    pub embedding_secs: u64,

    #[serde(default = "default_vector_search_secs")]
    pub vector_search_secs: u64,

    #[serde(default = "default_context_building_secs")]
    pub context_building_secs: u64,

    #[serde(default = "default_llm_response_secs")]
    pub llm_response_secs: u64,

    #[serde(default = "default_web_search_secs")]
    pub web_search_secs: u64,

    #[serde(default = "default_web_scraping_secs")]
    pub web_scraping_secs: u64,

    #[serde(default = "default_council_secs")]
    pub council_secs: u64,

    #[serde(default = "default_confirmation_secs")]
    pub confirmation_secs: u64,
}

fn default_embedding_secs() -> u64 {
    60
}
fn default_vector_search_secs() -> u64 {
    10
}
fn default_context_building_secs() -> u64 {
    60
}
fn default_llm_response_secs() -> u64 {
    300
}
fn default_web_search_secs() -> u64 {
    30
}
fn default_web_scraping_secs() -> u64 {
    45
}
fn default_council_secs() -> u64 {
    120
}
fn default_confirmation_secs() -> u64 {
    60
}

impl Timeouts {
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }
    pub fn vector_search(&self) -> Duration {
        Duration::from_secs(self.vector_search_secs)
    }
    pub fn context_building(&self) -> Duration {
        Duration::from_secs(self.context_building_secs)
    }
    pub fn llm_response(&self) -> Duration {
        Duration::from_secs(self.llm_response_secs)
    }
    pub fn web_search(&self) -> Duration {
        Duration::from_secs(self.web_search_secs)
    }
    pub fn web_scraping(&self) -> Duration {
        Duration::from_secs(self.web_scraping_secs)
    }
    pub fn council(&self) -> Duration {
        Duration::from_secs(self.council_secs)
    }
    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedding_secs: default_embedding_secs(),
            vector_search_secs: default_vector_search_secs(),
            context_building_secs: default_context_building_secs(),
            llm_response_secs: default_llm_response_secs(),
            web_search_secs: default_web_search_secs(),
            web_scraping_secs: default_web_scraping_secs(),
            council_secs: default_council_secs(),
            confirmation_secs: default_confirmation_secs(),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_model", &self.default_model)
            .field("embedding_model", &self.embedding_model)
            .field("assistant_name", &self.assistant_name)
            .field("default_profile", &self.default_profile)
            .field("ollama", &self.ollama)
            .field("openai_compat", &self.openai_compat)
            .field("search", &self.search)
            .field("council", &self.council)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default location with environment
    /// variable overrides:
    /// - `SOVWREN_MODEL` overrides the default model
    /// - `OLLAMA_URL` overrides the Ollama base URL
    /// - `SOVWREN_ASSISTANT_NAME` overrides the Node display name
    /// - `OLLAMA_API_KEY` supplies the keyed web search credential
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("SOVWREN_MODEL") {
            config.default_model = model;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.ollama.base_url = url;
        }
        if let Ok(name) = std::env::var("SOVWREN_ASSISTANT_NAME") {
            config.assistant_name = Some(name);
        }
        if config.search.api_key.is_none() {
            config.search.api_key = std::env::var("OLLAMA_API_KEY").ok();
        }
        if config.openai_compat.api_key.is_none() {
            config.openai_compat.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sovwren")
    }

    /// Get the workspace directory path (bookmarks, memory, vector index).
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// SQLite database path.
    pub fn db_path() -> PathBuf {
        Self::config_dir().join("sovwren.db")
    }

    /// Vector index path stem (`.index` and `.map.json` hang off this).
    pub fn index_path() -> PathBuf {
        Self::workspace_dir().join("knowledge")
    }

    /// Memory entity store path.
    pub fn memory_path() -> PathBuf {
        Self::workspace_dir().join("memory.json")
    }

    /// Persona profiles directory.
    pub fn profiles_dir() -> PathBuf {
        Self::config_dir().join("profiles")
    }

    /// Bookmarks directory.
    pub fn bookmarks_dir() -> PathBuf {
        Self::workspace_dir().join("bookmarks")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be at least 1".into(),
            ));
        }
        if self.council.backend != "ollama" && self.council.backend != "openai" {
            return Err(ConfigError::ValidationError(format!(
                "council.backend must be \"ollama\" or \"openai\", got {:?}",
                self.council.backend
            )));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            embedding_model: default_embedding_model(),
            assistant_name: None,
            default_profile: None,
            ollama: OllamaConfig::default(),
            openai_compat: OpenAiCompatConfig::default(),
            search: SearchConfig::default(),
            council: CouncilConfig::default(),
            timeouts: Timeouts::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for sovwren_core::Error {
    fn from(e: ConfigError) -> Self {
        sovwren_core::Error::Config {
            message: e.to_string(),
        }
    }
}
