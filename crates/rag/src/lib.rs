//! Local retrieval for Sovwren.
//!
//! - `vector` — similarity math
//! - `index` — on-disk vector index with a JSON document map and stale-file
//!   pruning
//! - `retriever` — query embedding, search, and bounded context assembly
//! - `memory` — the JSON entity store behind `remember:` intents

pub mod index;
pub mod memory;
pub mod retriever;
pub mod vector;

pub use index::{DocEntry, SearchHit, VectorStore};
pub use memory::{MemoryEntity, MemoryStore};
pub use retriever::{RetrievalTrace, RetrievedContext, Retriever};
