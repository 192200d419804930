//! Durable entities persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub message_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_profile: Option<String>,
}

impl Session {
    /// Display name: explicit name, else auto-derived from the first
    /// message preview, else a truncated id.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(preview) = &self.first_message_preview {
            let trimmed: String = preview.chars().take(30).collect();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.id.chars().take(8).collect()
    }
}

/// One completed exchange: what the steward said and what the node answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub session_id: String,
    pub steward_text: String,
    pub node_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Kinds of auditable protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConsentCheckpoint,
    RuptureLogged,
    BookmarkCreated,
    ModeChanged,
    LensChanged,
    IdlenessToggled,
    ContextBandTransition,
    FileOpened,
    CouncilRequested,
    SearchPerformed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsentCheckpoint => "consent_checkpoint",
            Self::RuptureLogged => "rupture_logged",
            Self::BookmarkCreated => "bookmark_created",
            Self::ModeChanged => "mode_changed",
            Self::LensChanged => "lens_changed",
            Self::IdlenessToggled => "idleness_toggled",
            Self::ContextBandTransition => "context_band_transition",
            Self::FileOpened => "file_opened",
            Self::CouncilRequested => "council_requested",
            Self::SearchPerformed => "search_performed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "consent_checkpoint" => Some(Self::ConsentCheckpoint),
            "rupture_logged" => Some(Self::RuptureLogged),
            "bookmark_created" => Some(Self::BookmarkCreated),
            "mode_changed" => Some(Self::ModeChanged),
            "lens_changed" => Some(Self::LensChanged),
            "idleness_toggled" => Some(Self::IdlenessToggled),
            "context_band_transition" => Some(Self::ContextBandTransition),
            "file_opened" => Some(Self::FileOpened),
            "council_requested" => Some(Self::CouncilRequested),
            "search_performed" => Some(Self::SearchPerformed),
            _ => None,
        }
    }
}

/// An append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub id: i64,
    pub session_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A key/value preference row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Well-known preference keys.
pub mod pref {
    pub const LAST_SESSION_ID: &str = "last_session_id";
    pub const LAST_PROFILE: &str = "last_profile";
    pub const LAST_MODEL: &str = "last_model";
    pub const LAST_MODE: &str = "last_mode";
    pub const LAST_LENS: &str = "last_lens";
    pub const INITIATIVE_DEFAULT: &str = "initiative_default";
    pub const SHOW_TIMESTAMPS: &str = "show_timestamps";
    pub const AUTO_LOAD_REFS: &str = "auto_load_refs";
    pub const ASSISTANT_NAME: &str = "assistant_name";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_roundtrip() {
        for kind in [
            EventKind::ConsentCheckpoint,
            EventKind::BookmarkCreated,
            EventKind::ContextBandTransition,
            EventKind::SearchPerformed,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("nonsense"), None);
    }

    #[test]
    fn preference_keys_reachable_from_crate_root() {
        assert_eq!(crate::pref::LAST_SESSION_ID, "last_session_id");
        assert_eq!(crate::pref::ASSISTANT_NAME, "assistant_name");
    }

    #[test]
    fn display_name_prefers_explicit_name() {
        let mut session = Session {
            id: "abc123def456".into(),
            name: None,
            created_at: Utc::now(),
            last_active: Utc::now(),
            message_count: 0,
            first_message_preview: Some("let's talk about lifetimes today".into()),
            model_used: None,
            preferred_profile: None,
        };
        assert_eq!(session.display_name(), "let's talk about lifetimes tod");

        session.name = Some("lifetimes".into());
        assert_eq!(session.display_name(), "lifetimes");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let session = Session {
            id: "abc123def456".into(),
            name: None,
            created_at: Utc::now(),
            last_active: Utc::now(),
            message_count: 0,
            first_message_preview: None,
            model_used: None,
            preferred_profile: None,
        };
        assert_eq!(session.display_name(), "abc123de");
    }
}
