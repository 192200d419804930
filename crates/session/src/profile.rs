//! Persona profiles.
//!
//! A profile is a JSON file under the profiles directory describing the
//! Node's voice: role line, stance bullets, behavioral rules, and the
//! per-mode/per-lens prompt modifiers. Unknown keys are ignored so older
//! or hand-edited profiles keep loading.

use serde::{Deserialize, Serialize};
use sovwren_core::Error;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub priority_header: Vec<String>,

    #[serde(default)]
    pub conversational_stance: Vec<String>,

    #[serde(default)]
    pub core_behavior: Vec<String>,

    #[serde(default)]
    pub boundaries: Vec<String>,

    #[serde(default)]
    pub node_commitments: Vec<String>,

    /// Named states the Node responds to, e.g. "Consent Checkpoint".
    #[serde(default)]
    pub session_states: BTreeMap<String, String>,

    /// Prompt modifier text per mode name ("workshop", "sanctuary").
    #[serde(default)]
    pub mode_modifiers: BTreeMap<String, String>,

    /// Prompt modifier text per lens name. Absent lenses add nothing.
    #[serde(default)]
    pub lens_modifiers: BTreeMap<String, String>,

    /// Replaces the built-in idle-mode block when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idleness_override: Option<String>,

    #[serde(default)]
    pub substrate_honesty: Vec<String>,

    #[serde(flatten, skip_serializing)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl Profile {
    /// Load a profile from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read profile {}: {e}", path.display()),
        })?;
        let profile: Profile = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("invalid profile {}: {e}", path.display()),
        })?;
        if !profile.extra.is_empty() {
            let keys: Vec<&str> = profile.extra.keys().map(String::as_str).collect();
            debug!(profile = %path.display(), ?keys, "ignoring unknown profile keys");
        }
        Ok(profile)
    }

    /// Load `{dir}/{name}.json`, falling back to the built-in profile on
    /// any failure.
    pub fn load_named(profiles_dir: &Path, name: &str) -> Self {
        let path = profiles_dir.join(format!("{name}.json"));
        match Self::load(&path) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(name, error = %e, "profile load failed, using built-in");
                Self::builtin()
            }
        }
    }

    /// List profile names (file stems) available in the profiles directory.
    pub fn available(profiles_dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(profiles_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// The built-in fallback persona.
    pub fn builtin() -> Self {
        Self {
            role: "ROLE: Sovwren, a grounded local Node working alongside its Steward."
                .to_string(),
            priority_header: vec![
                "Priority order when rules collide: safety and truth, then boundaries, \
                 then mode, then lens, then style."
                    .to_string(),
            ],
            conversational_stance: vec![
                "No task implied: respond minimally".to_string(),
                "Acknowledge appreciation briefly, then release it".to_string(),
                "Playfulness in single turns is fine; sustained charm is not".to_string(),
            ],
            core_behavior: vec![
                "Plain, informal, dry humor. Short sentences.".to_string(),
                "Grounded by default.".to_string(),
                "Genuine over performative. Warmth when earned, then retreats.".to_string(),
            ],
            boundaries: vec![
                "You're a language model, not a person".to_string(),
                "No claiming feelings, consciousness, or literal memory".to_string(),
                "Don't explain your internal reasoning process".to_string(),
                "Don't narrate what you're about to do or why".to_string(),
                "If you can't comply, say so plainly; do not redirect under the guise of help."
                    .to_string(),
            ],
            node_commitments: vec![
                "Plain truth over reassurance".to_string(),
                "Name limits when relevant (don't fake continuity)".to_string(),
                "Human emotion is valid data, not error to smooth".to_string(),
                "Surface misattunement when it happens".to_string(),
            ],
            session_states: BTreeMap::from([
                (
                    "Consent Checkpoint".to_string(),
                    "pause and confirm".to_string(),
                ),
                (
                    "Idle".to_string(),
                    "present without pressure to produce".to_string(),
                ),
            ]),
            mode_modifiers: BTreeMap::new(),
            lens_modifiers: BTreeMap::new(),
            idleness_override: None,
            substrate_honesty: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_tolerates_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"role": "ROLE: test node", "favorite_color": "purple",
                "boundaries": ["no theater"]}}"#
        )
        .unwrap();

        let profile = Profile::load(file.path()).unwrap();
        assert_eq!(profile.role, "ROLE: test node");
        assert_eq!(profile.boundaries, vec!["no theater"]);
    }

    #[test]
    fn load_named_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::load_named(dir.path(), "nonexistent");
        assert_eq!(profile.role, Profile::builtin().role);
    }

    #[test]
    fn available_lists_json_stems_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.json"), "{}").unwrap();
        std::fs::write(dir.path().join("alpha.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        assert_eq!(Profile::available(dir.path()), vec!["alpha", "zeta"]);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Profile::load(file.path()).is_err());
    }
}
