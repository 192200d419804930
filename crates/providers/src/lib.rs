//! LLM backend adapters.
//!
//! Two wire shapes are supported: the native Ollama API and the
//! OpenAI-compatible `/chat/completions` shape. Both implement
//! [`sovwren_core::client::LlmClient`]; the council seat wraps either one.

pub mod council;
pub mod ollama;
pub mod openai_compat;

pub use council::CouncilSeat;
pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;
