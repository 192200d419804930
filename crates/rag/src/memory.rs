//! Durable memory entity store.
//!
//! A single JSON file of named entities with observation lists. Writes are
//! whole-file read-modify-write; the file is small and the cockpit is the
//! only writer.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sovwren_core::error::MemoryError;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub observations: Vec<String>,
    pub created: String,
    pub updated: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    entities: Vec<MemoryEntity>,
}

pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<MemoryFile, MemoryError> {
        if !self.path.exists() {
            return Ok(MemoryFile::default());
        }
        let bytes = std::fs::read(&self.path).map_err(|e| MemoryError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| MemoryError::Corrupt(e.to_string()))
    }

    fn save(&self, file: &MemoryFile) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::Io(e.to_string()))?;
        }
        let json =
            serde_json::to_vec_pretty(file).map_err(|e| MemoryError::Corrupt(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| MemoryError::Io(e.to_string()))
    }

    /// Add observations to an entity, creating it if needed. Entity names
    /// fold case-insensitively; duplicate observations are not appended
    /// twice, so the call is idempotent.
    pub fn add_observations(
        &self,
        name: &str,
        entity_type: &str,
        observations: &[String],
    ) -> Result<(), MemoryError> {
        let mut file = self.load()?;
        let now = Utc::now().to_rfc3339();
        let folded = name.to_lowercase();

        match file
            .entities
            .iter_mut()
            .find(|e| e.name.to_lowercase() == folded)
        {
            Some(entity) => {
                let mut changed = false;
                for obs in observations {
                    if !entity.observations.iter().any(|o| o == obs) {
                        entity.observations.push(obs.clone());
                        changed = true;
                    }
                }
                if changed {
                    entity.updated = now;
                }
            }
            None => {
                file.entities.push(MemoryEntity {
                    name: name.to_string(),
                    entity_type: entity_type.to_string(),
                    observations: observations.to_vec(),
                    created: now.clone(),
                    updated: now,
                });
            }
        }

        debug!(entity = name, "memory observations recorded");
        self.save(&file)
    }

    /// Case-insensitive substring search over names and observations.
    pub fn search(&self, query: &str) -> Result<Vec<MemoryEntity>, MemoryError> {
        let file = self.load()?;
        let q = query.to_lowercase();
        Ok(file
            .entities
            .into_iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&q)
                    || e.observations.iter().any(|o| o.to_lowercase().contains(&q))
            })
            .collect())
    }

    pub fn all(&self) -> Result<Vec<MemoryEntity>, MemoryError> {
        Ok(self.load()?.entities)
    }

    /// Format entities as short lines for prompt injection.
    pub fn format_for_injection(entities: &[MemoryEntity]) -> String {
        entities
            .iter()
            .map(|e| format!("{} ({}): {}", e.name, e.entity_type, e.observations.join("; ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("memory.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty_store() {
        let (_dir, store) = store();
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn observations_append_idempotently() {
        let (_dir, store) = store();
        store
            .add_observations("Alex", "person", &["likes rust".into()])
            .unwrap();
        store
            .add_observations("alex", "person", &["likes rust".into(), "dislikes mondays".into()])
            .unwrap();

        let entities = store.all().unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Alex");
        assert_eq!(entities[0].observations.len(), 2);
    }

    #[test]
    fn search_matches_names_and_observations() {
        let (_dir, store) = store();
        store
            .add_observations("project-sparrow", "note", &["due in march".into()])
            .unwrap();
        store
            .add_observations("Alex", "person", &["prefers dark mode".into()])
            .unwrap();

        assert_eq!(store.search("sparrow").unwrap().len(), 1);
        assert_eq!(store.search("DARK MODE").unwrap().len(), 1);
        assert!(store.search("nothing").unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_reports_corrupt() {
        let (_dir, store) = store();
        std::fs::write(&store.path, b"not json").unwrap();
        assert!(matches!(store.all().unwrap_err(), MemoryError::Corrupt(_)));
    }

    #[test]
    fn injection_format_is_compact() {
        let entities = vec![MemoryEntity {
            name: "Alex".into(),
            entity_type: "person".into(),
            observations: vec!["likes rust".into(), "early riser".into()],
            created: "2026-01-01T00:00:00Z".into(),
            updated: "2026-01-01T00:00:00Z".into(),
        }];
        let text = MemoryStore::format_for_injection(&entities);
        assert_eq!(text, "Alex (person): likes rust; early riser");
    }
}
