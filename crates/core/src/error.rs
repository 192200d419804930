//! Error types for the Sovwren domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Sovwren operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Search errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Consent errors ---
    #[error("Consent error: {0}")]
    Consent(#[from] ConsentError),

    // --- Memory store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Vector index errors ---
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Search failures carry the provider name so the cockpit can report
/// which backend failed and whether retrying makes sense.
#[derive(Debug, Clone, Error)]
#[error("[{provider}] {message}")]
pub struct SearchError {
    pub message: String,
    pub provider: String,
    pub recoverable: bool,
}

impl SearchError {
    pub fn recoverable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            provider: provider.into(),
            recoverable: true,
        }
    }

    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            provider: provider.into(),
            recoverable: false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConsentError {
    #[error("No pending confirmation of kind {0}")]
    NothingPending(String),

    #[error("Confirmation expired after {timeout_secs}s, re-invoke the action")]
    Expired { timeout_secs: u64 },

    #[error("Action declined by steward")]
    Declined,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory file I/O failed: {0}")]
    Io(String),

    #[error("Memory file is not valid JSON: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index file I/O failed: {0}")]
    Io(String),

    #[error("Index and document map disagree: {0}")]
    Inconsistent(String),

    #[error("Legacy document map format at {path}, rebuild required")]
    LegacyFormat { path: String },

    #[error("Dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn search_error_carries_provider() {
        let err = SearchError::recoverable("duckduckgo", "rate limited");
        assert!(err.to_string().contains("duckduckgo"));
        assert!(err.recoverable);
    }

    #[test]
    fn consent_expiry_mentions_reinvoke() {
        let err = ConsentError::Expired { timeout_secs: 60 };
        assert!(err.to_string().contains("re-invoke"));
    }
}
