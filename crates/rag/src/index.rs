//! On-disk vector index with a JSON document map.
//!
//! Two files hang off a path stem:
//! - `<stem>.index` — embedding matrix, little-endian f32 with a small header
//! - `<stem>.map.json` — position → `{text, metadata, added_at}`
//!
//! A legacy `<stem>.map` file (pre-JSON format) is refused: the store starts
//! empty and the index is rebuilt as documents are re-added.

use crate::vector;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sovwren_core::error::IndexError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAGIC: &[u8; 8] = b"SVWNIDX1";

/// One stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub added_at: String,
}

impl DocEntry {
    /// The source URL recorded in metadata, if any.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").and_then(|v| v.as_str())
    }
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// The vector store: parallel embedding rows and document entries.
#[derive(Debug)]
pub struct VectorStore {
    stem: PathBuf,
    /// Directory `file://` URLs resolve against for staleness checks.
    base_dir: PathBuf,
    dimension: usize,
    embeddings: Vec<Vec<f32>>,
    documents: Vec<DocEntry>,
}

impl VectorStore {
    /// Open the store at the given path stem, loading existing files.
    pub fn open(stem: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let stem = stem.into();
        let mut store = Self {
            stem: stem.clone(),
            base_dir: base_dir.into(),
            dimension: 0,
            embeddings: Vec::new(),
            documents: Vec::new(),
        };

        let map_json = store.map_json_path();
        let legacy_map = stem.with_extension("map");
        if legacy_map.exists() && !map_json.exists() {
            warn!(
                path = %legacy_map.display(),
                "legacy document map format found, starting with an empty index"
            );
            return Ok(store);
        }

        if map_json.exists() {
            store.load()?;
        }
        Ok(store)
    }

    fn index_path(&self) -> PathBuf {
        self.stem.with_extension("index")
    }

    fn map_json_path(&self) -> PathBuf {
        let mut p = self.stem.clone().into_os_string();
        p.push(".map.json");
        PathBuf::from(p)
    }

    fn load(&mut self) -> Result<(), IndexError> {
        let map_bytes = std::fs::read(self.map_json_path())
            .map_err(|e| IndexError::Io(format!("read document map: {e}")))?;
        let map: BTreeMap<usize, DocEntry> = serde_json::from_slice(&map_bytes)
            .map_err(|e| IndexError::Inconsistent(format!("document map parse: {e}")))?;

        let index_bytes = std::fs::read(self.index_path())
            .map_err(|e| IndexError::Io(format!("read index: {e}")))?;
        let (dimension, rows) = decode_index(&index_bytes)?;

        if rows.len() != map.len() {
            return Err(IndexError::Inconsistent(format!(
                "index has {} rows but map has {} entries",
                rows.len(),
                map.len()
            )));
        }

        // positions in the map are dense 0..n by construction; fold into
        // insertion order regardless of key gaps left by older writers
        self.documents = map.into_values().collect();
        self.embeddings = rows;
        self.dimension = dimension;
        debug!(chunks = self.documents.len(), "vector index loaded");
        Ok(())
    }

    /// Persist both files. The index is written before the map so a crash
    /// between the two is caught by the length check on the next load.
    pub fn persist(&self) -> Result<(), IndexError> {
        if let Some(parent) = self.stem.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Io(format!("create index dir: {e}")))?;
        }

        std::fs::write(self.index_path(), encode_index(self.dimension, &self.embeddings))
            .map_err(|e| IndexError::Io(format!("write index: {e}")))?;

        let map: BTreeMap<usize, &DocEntry> = self.documents.iter().enumerate().collect();
        let json = serde_json::to_vec_pretty(&map)
            .map_err(|e| IndexError::Io(format!("serialize document map: {e}")))?;
        std::fs::write(self.map_json_path(), json)
            .map_err(|e| IndexError::Io(format!("write document map: {e}")))?;
        Ok(())
    }

    /// Drop chunks whose `file://` source no longer exists on disk, then
    /// persist the compacted index. Idempotent; running it twice in a row
    /// changes nothing the second time.
    pub fn prune_stale(&mut self) -> Result<usize, IndexError> {
        let keep: Vec<bool> = self
            .documents
            .iter()
            .map(|doc| !self.is_stale(doc))
            .collect();
        let pruned = keep.iter().filter(|k| !**k).count();
        if pruned == 0 {
            return Ok(0);
        }

        let mut keep_iter = keep.iter();
        self.documents.retain(|_| *keep_iter.next().unwrap_or(&true));
        let mut keep_iter = keep.iter();
        self.embeddings.retain(|_| *keep_iter.next().unwrap_or(&true));

        self.persist()?;
        info!(pruned, remaining = self.documents.len(), "stale chunks pruned");
        Ok(pruned)
    }

    fn is_stale(&self, doc: &DocEntry) -> bool {
        let Some(url) = doc.url() else {
            return false;
        };
        let Some(rel) = url.strip_prefix("file://") else {
            return false;
        };
        let path = Path::new(rel);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        !resolved.exists()
    }

    /// Add documents with their embeddings. Rows are normalized in place;
    /// zero-norm rows are kept unnormalized with a warning (they can never
    /// match a query).
    pub fn add_documents(
        &mut self,
        texts: Vec<String>,
        mut embeddings: Vec<Vec<f32>>,
        metadata: Vec<serde_json::Value>,
    ) -> Result<(), IndexError> {
        if texts.len() != embeddings.len() || texts.len() != metadata.len() {
            return Err(IndexError::Inconsistent(format!(
                "{} texts, {} embeddings, {} metadata entries",
                texts.len(),
                embeddings.len(),
                metadata.len()
            )));
        }
        if texts.is_empty() {
            return Ok(());
        }

        let dim = embeddings[0].len();
        if self.dimension == 0 {
            self.dimension = dim;
        } else if dim != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: dim,
            });
        }

        let now = Utc::now().to_rfc3339();
        for ((text, row), meta) in texts.into_iter().zip(embeddings.iter_mut()).zip(metadata) {
            if row.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: row.len(),
                });
            }
            if !vector::normalize(row) {
                warn!("zero-norm embedding stored unnormalized");
            }
            self.documents.push(DocEntry {
                text,
                metadata: meta,
                added_at: now.clone(),
            });
        }
        self.embeddings.append(&mut embeddings);
        self.persist()
    }

    /// Top-k search. Results come back in descending score order; equal
    /// scores keep insertion order. A zero-norm query matches nothing.
    /// Chunks whose source file has vanished are skipped here too.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchHit> {
        if vector::l2_norm(query) < 1e-6 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .embeddings
            .iter()
            .zip(self.documents.iter())
            .filter(|(_, doc)| !self.is_stale(doc))
            .filter_map(|(row, doc)| {
                let score = vector::cosine_similarity(row, query);
                if score >= threshold {
                    Some(SearchHit {
                        text: doc.text.clone(),
                        score,
                        metadata: doc.metadata.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        // stable sort preserves insertion order among ties
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn encode_index(dimension: usize, rows: &[Vec<f32>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + rows.len() * dimension * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(dimension as u32).to_le_bytes());
    out.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    for row in rows {
        for x in row {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }
    out
}

fn decode_index(bytes: &[u8]) -> Result<(usize, Vec<Vec<f32>>), IndexError> {
    if bytes.len() < 16 || &bytes[..8] != MAGIC {
        return Err(IndexError::Inconsistent("bad index header".into()));
    }
    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

    let expected = 16 + count * dimension * 4;
    if bytes.len() != expected {
        return Err(IndexError::Inconsistent(format!(
            "index declares {count} rows of dim {dimension} but has {} bytes",
            bytes.len()
        )));
    }

    let mut rows = Vec::with_capacity(count);
    let mut offset = 16;
    for _ in 0..count {
        let mut row = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            row.push(f32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]));
            offset += 4;
        }
        rows.push(row);
    }
    Ok((dimension, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &Path) -> VectorStore {
        VectorStore::open(dir.join("knowledge"), dir).unwrap()
    }

    #[test]
    fn add_and_search_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store
            .add_documents(
                vec!["rust ownership".into(), "gardening tips".into()],
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                vec![json!({"source": "notes"}), json!({"source": "notes"})],
            )
            .unwrap();

        // reopen from disk
        let store = store_in(dir.path());
        assert_eq!(store.len(), 2);

        let hits = store.search(&[1.0, 0.1, 0.0], 3, 0.1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "rust ownership");
    }

    #[test]
    fn zero_norm_query_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store
            .add_documents(vec!["x".into()], vec![vec![1.0, 0.0]], vec![json!({})])
            .unwrap();
        assert!(store.search(&[0.0, 0.0], 3, 0.0).is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store
            .add_documents(
                vec!["first".into(), "second".into()],
                vec![vec![1.0, 0.0], vec![1.0, 0.0]],
                vec![json!({}), json!({})],
            )
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2, 0.1);
        assert_eq!(hits[0].text, "first");
        assert_eq!(hits[1].text, "second");
    }

    #[test]
    fn prune_drops_chunks_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live.md");
        std::fs::write(&live, "content").unwrap();

        let mut store = store_in(dir.path());
        store
            .add_documents(
                vec!["live chunk".into(), "dead chunk".into(), "web chunk".into()],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
                vec![
                    json!({"url": "file://live.md"}),
                    json!({"url": "file://gone.md"}),
                    json!({"url": "https://example.com/page"}),
                ],
            )
            .unwrap();

        assert_eq!(store.prune_stale().unwrap(), 1);
        assert_eq!(store.len(), 2);
        // idempotent
        assert_eq!(store.prune_stale().unwrap(), 0);

        // compaction survives a reload
        let store = store_in(dir.path());
        assert_eq!(store.len(), 2);
        let texts: Vec<_> = store.search(&[1.0, 1.0], 5, -1.0);
        assert!(texts.iter().all(|h| h.text != "dead chunk"));
    }

    #[test]
    fn search_skips_freshly_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let doomed = dir.path().join("doomed.md");
        std::fs::write(&doomed, "content").unwrap();

        let mut store = store_in(dir.path());
        store
            .add_documents(
                vec!["doomed".into()],
                vec![vec![1.0, 0.0]],
                vec![json!({"url": "file://doomed.md"})],
            )
            .unwrap();

        // file vanishes after indexing, before pruning runs again
        std::fs::remove_file(&doomed).unwrap();
        assert!(store.search(&[1.0, 0.0], 3, 0.1).is_empty());
    }

    #[test]
    fn legacy_map_refused_and_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("knowledge.map"), b"\x80\x04not json").unwrap();

        let store = store_in(dir.path());
        assert!(store.is_empty());
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store
            .add_documents(vec!["a".into()], vec![vec![1.0, 0.0]], vec![json!({})])
            .unwrap();

        let err = store
            .add_documents(vec!["b".into()], vec![vec![1.0, 0.0, 0.0]], vec![json!({})])
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn truncated_index_file_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store
            .add_documents(vec!["a".into()], vec![vec![1.0, 0.0]], vec![json!({})])
            .unwrap();

        // chop the index file
        let index = dir.path().join("knowledge.index");
        let bytes = std::fs::read(&index).unwrap();
        std::fs::write(&index, &bytes[..bytes.len() - 4]).unwrap();

        let err = VectorStore::open(dir.path().join("knowledge"), dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::Inconsistent(_)));
    }
}
