//! Consent-gated web search for Sovwren.
//!
//! Adapters find sources and return structured, attributed results; the
//! gate enforces steward consent and sanitizes everything before it can
//! touch a prompt.

pub mod adapter;
pub mod duckduckgo;
pub mod gate;
pub mod ollama_web;
pub mod sanitize;

pub use adapter::{SearchAdapter, SearchResult};
pub use duckduckgo::DuckDuckGoAdapter;
pub use gate::{SearchGate, UNTRUSTED_CLOSE, UNTRUSTED_OPEN};
pub use ollama_web::OllamaWebAdapter;
