//! # Sovwren Core
//!
//! Domain types, traits, and error definitions for the Sovwren terminal
//! cockpit. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! The seams are traits: `LlmClient` for model backends, with concrete
//! implementations living in their own crates. Everything depends inward
//! on core.

pub mod client;
pub mod entity;
pub mod error;
pub mod message;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use client::{GenerateRequest, GenerateResponse, LlmClient, ModelInfo, StreamChunk, Usage};
pub use entity::pref;
pub use entity::{EventKind, Preference, ProtocolEvent, Session, Turn};
pub use error::{
    ConsentError, Error, IndexError, MemoryError, ProviderError, Result, SearchError,
    StorageError,
};
pub use message::{ChatMessage, Role, SessionId};
pub use state::{ContextBand, GateState, Initiative, Lens, Mode, SessionState, SocialCarryover};
