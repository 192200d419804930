//! Retriever — embeds a query, searches the vector store, and serializes
//! the winning chunks into a bounded context block.

use crate::index::{SearchHit, VectorStore};
use sovwren_core::error::{IndexError, ProviderError};
use sovwren_core::LlmClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Hard cap on serialized context characters.
pub const MAX_CONTEXT_CHARS: usize = 2048;
/// Similarity floor below which chunks are ignored.
pub const SIMILARITY_THRESHOLD: f32 = 0.1;
/// Default number of chunks woven into a turn.
pub const DEFAULT_CHUNK_LIMIT: usize = 3;

/// Overlapping character chunks for file ingestion.
const CHUNK_CHARS: usize = 1000;
const CHUNK_OVERLAP: usize = 200;

/// What a retrieval produced, with an optional debug trace.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub text: String,
    pub trace: Option<RetrievalTrace>,
}

#[derive(Debug, Clone)]
pub struct RetrievalTrace {
    pub chunks_considered: usize,
    pub chunks_used: usize,
    pub scores: Vec<f32>,
    pub sources: Vec<String>,
    pub elapsed_ms: u64,
}

pub struct Retriever {
    store: Arc<Mutex<VectorStore>>,
    client: Arc<dyn LlmClient>,
    embedding_model: String,
    embedding_timeout: Duration,
    search_timeout: Duration,
}

impl Retriever {
    pub fn new(
        store: Arc<Mutex<VectorStore>>,
        client: Arc<dyn LlmClient>,
        embedding_model: impl Into<String>,
        embedding_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        Self {
            store,
            client,
            embedding_model: embedding_model.into(),
            embedding_timeout,
            search_timeout,
        }
    }

    /// Retrieve context for a query. Returns `None` when nothing clears the
    /// similarity floor or the index is empty.
    pub async fn retrieve_context(
        &self,
        query: &str,
        limit: usize,
        debug_trace: bool,
    ) -> Result<Option<RetrievedContext>, ProviderError> {
        let started = std::time::Instant::now();

        {
            let store = self.store.lock().await;
            if store.is_empty() {
                return Ok(None);
            }
        }

        let embedding = self.embed_one(query).await?;

        let store = self.store.clone();
        let search = tokio::time::timeout(self.search_timeout, async move {
            let store = store.lock().await;
            store.search(&embedding, limit.max(1), SIMILARITY_THRESHOLD)
        });
        let hits = match search.await {
            Ok(hits) => hits,
            Err(_) => {
                warn!("vector search timed out");
                return Ok(None);
            }
        };

        if hits.is_empty() {
            return Ok(None);
        }

        let considered = hits.len();
        let (text, used) = serialize_hits(&hits);
        debug!(chunks = used, chars = text.len(), "retrieval context built");

        let trace = debug_trace.then(|| RetrievalTrace {
            chunks_considered: considered,
            chunks_used: used,
            scores: hits.iter().take(used).map(|h| h.score).collect(),
            sources: hits.iter().take(used).map(|h| source_of(h)).collect(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        Ok(Some(RetrievedContext { text, trace }))
    }

    /// Ingest a file's text under a `file://` source URL: chunk, embed, add.
    /// Returns the number of chunks indexed.
    pub async fn ingest_file(
        &self,
        rel_path: &str,
        content: &str,
    ) -> Result<usize, sovwren_core::Error> {
        let chunks = chunk_text(content);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = tokio::time::timeout(
            self.embedding_timeout,
            self.client.embed(&chunks),
        )
        .await
        .map_err(|_| ProviderError::Timeout("embedding".into()))??;

        let url = format!("file://{rel_path}");
        let metadata = chunks
            .iter()
            .map(|_| serde_json::json!({"url": url, "model": self.embedding_model}))
            .collect();

        let count = chunks.len();
        let store = self.store.clone();
        let added: Result<(), IndexError> = tokio::task::spawn_blocking(move || {
            // lock is uncontended here, blocking_lock keeps the file writes
            // off the async threads
            let mut store = store.blocking_lock();
            store.add_documents(chunks, embeddings, metadata)
        })
        .await
        .map_err(|e| sovwren_core::Error::Internal(format!("index task: {e}")))?;
        added?;
        Ok(count)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let texts = vec![text.to_string()];
        let mut embeddings = tokio::time::timeout(self.embedding_timeout, self.client.embed(&texts))
            .await
            .map_err(|_| ProviderError::Timeout("embedding".into()))??;
        embeddings
            .pop()
            .ok_or_else(|| ProviderError::EmbeddingFailed("backend returned no vectors".into()))
    }
}

fn source_of(hit: &SearchHit) -> String {
    hit.metadata
        .get("url")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Serialize hits as `[source]\n<text>` blocks, stopping before the
/// character cap. Returns the block and how many hits made it in.
fn serialize_hits(hits: &[SearchHit]) -> (String, usize) {
    let mut blocks: Vec<String> = Vec::new();
    let mut total = 0usize;
    for hit in hits {
        let block = format!("[{}]\n{}", source_of(hit), hit.text.trim());
        let cost = block.len() + if blocks.is_empty() { 0 } else { 2 };
        if total + cost > MAX_CONTEXT_CHARS && !blocks.is_empty() {
            break;
        }
        total += cost;
        blocks.push(block);
    }
    let used = blocks.len();
    let mut text = blocks.join("\n\n");
    if text.len() > MAX_CONTEXT_CHARS {
        text.truncate(MAX_CONTEXT_CHARS);
    }
    (text, used)
}

/// Split text into overlapping character chunks on char boundaries.
pub fn chunk_text(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + CHUNK_CHARS).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(CHUNK_OVERLAP);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sovwren_core::client::{GenerateRequest, GenerateResponse};
    use tempfile::TempDir;

    /// Embeds each text as a fixed-dimension bag of marker values so tests
    /// can steer similarity.
    struct StubEmbedder;

    #[async_trait]
    impl LlmClient for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerateResponse, ProviderError> {
            unimplemented!("retrieval tests never generate")
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("rust") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn retriever(dir: &TempDir) -> Retriever {
        let store = VectorStore::open(dir.path().join("knowledge"), dir.path()).unwrap();
        Retriever::new(
            Arc::new(Mutex::new(store)),
            Arc::new(StubEmbedder),
            "stub-embed",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn empty_index_retrieves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let r = retriever(&dir);
        assert!(r.retrieve_context("anything", 3, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ingest_then_retrieve_matching_chunk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "x").unwrap();
        let r = retriever(&dir);

        let n = r
            .ingest_file("notes.md", "rust borrow checker notes")
            .await
            .unwrap();
        assert_eq!(n, 1);

        let ctx = r
            .retrieve_context("rust lifetimes", 3, true)
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.text.contains("borrow checker"));
        assert!(ctx.text.starts_with("[file://notes.md]"));

        let trace = ctx.trace.unwrap();
        assert_eq!(trace.chunks_used, 1);
        assert_eq!(trace.sources, vec!["file://notes.md".to_string()]);
    }

    #[tokio::test]
    async fn dissimilar_query_retrieves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "x").unwrap();
        let r = retriever(&dir);
        r.ingest_file("notes.md", "rust notes").await.unwrap();

        // stub embeds non-rust queries orthogonally
        assert!(r.retrieve_context("gardening", 3, false).await.unwrap().is_none());
    }

    #[test]
    fn chunking_overlaps_and_skips_blank() {
        let text = "a".repeat(2500);
        let chunks = chunk_text(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert!(chunk_text("   \n  ").is_empty());
    }

    #[test]
    fn serialization_respects_char_cap() {
        let hits: Vec<SearchHit> = (0..5)
            .map(|i| SearchHit {
                text: format!("{}", "x".repeat(900)),
                score: 1.0 - i as f32 * 0.1,
                metadata: serde_json::json!({"url": format!("file://{i}.md")}),
            })
            .collect();
        let (text, used) = serialize_hits(&hits);
        assert!(text.len() <= MAX_CONTEXT_CHARS);
        assert!(used >= 1 && used < 5);
    }
}
