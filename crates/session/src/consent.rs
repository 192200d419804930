//! Two-phase consent for destructive and externalizing actions.
//!
//! Nothing bound to a confirmation runs until the Steward explicitly
//! approves it, and approvals go stale after the expiry window. Three
//! reply channels exist so an answer can never approve the wrong thing:
//! `/confirm-yes|no` for the generic slot (git, deletes), `/council-yes|no`
//! for council dispatch, `/load-yes|no` for `@ref` file loads.

use serde_json::Value;
use sovwren_core::error::ConsentError;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const CONFIRMATION_TTL: Duration = Duration::from_secs(60);

/// What the confirmation is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsentKind {
    Git,
    DeleteSession,
    DeleteAllSessions,
    Council,
    RefLoad,
}

impl ConsentKind {
    pub fn slot(self) -> Slot {
        match self {
            Self::Git | Self::DeleteSession | Self::DeleteAllSessions => Slot::Generic,
            Self::Council => Slot::Council,
            Self::RefLoad => Slot::RefLoad,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::DeleteSession => "delete_session",
            Self::DeleteAllSessions => "delete_all_sessions",
            Self::Council => "council",
            Self::RefLoad => "ref_load",
        }
    }
}

/// Which reply command answers the confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// `/confirm-yes|no`
    Generic,
    /// `/council-yes|no`
    Council,
    /// `/load-yes|no`
    RefLoad,
}

#[derive(Debug, Clone)]
pub struct Pending {
    pub kind: ConsentKind,
    /// Action-specific payload, e.g. the prepared brief or the ref list.
    pub payload: Value,
    /// What the Steward saw when asked.
    pub preview: String,
    created: Instant,
}

impl Pending {
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

/// Holds at most one pending confirmation per slot. Expiry is checked
/// lazily at resolution time; there is no background timer.
#[derive(Debug)]
pub struct ConsentBroker {
    slots: HashMap<Slot, Pending>,
    ttl: Duration,
}

impl ConsentBroker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            ttl,
        }
    }

    /// Queue a confirmation. An existing pending entry in the same slot is
    /// replaced; other slots are untouched.
    pub fn propose(&mut self, kind: ConsentKind, payload: Value, preview: impl Into<String>) {
        let slot = kind.slot();
        if let Some(previous) = self.slots.get(&slot) {
            debug!(
                replaced = previous.kind.as_str(),
                with = kind.as_str(),
                "replacing pending confirmation"
            );
        }
        self.slots.insert(
            slot,
            Pending {
                kind,
                payload,
                preview: preview.into(),
                created: Instant::now(),
            },
        );
    }

    /// The live pending confirmation for a slot, if any. Expired entries
    /// read as absent.
    pub fn pending(&self, slot: Slot) -> Option<&Pending> {
        self.slots
            .get(&slot)
            .filter(|p| p.created.elapsed() <= self.ttl)
    }

    /// Resolve a slot with the Steward's answer.
    ///
    /// On approval the pending record is returned for the caller to
    /// dispatch; in every other case it is dropped and the error says why.
    pub fn resolve(&mut self, slot: Slot, approved: bool) -> Result<Pending, ConsentError> {
        let pending = self
            .slots
            .remove(&slot)
            .ok_or_else(|| ConsentError::NothingPending(format!("{slot:?}").to_lowercase()))?;

        if pending.created.elapsed() > self.ttl {
            info!(kind = pending.kind.as_str(), "confirmation expired before resolution");
            return Err(ConsentError::Expired {
                timeout_secs: self.ttl.as_secs(),
            });
        }
        if !approved {
            debug!(kind = pending.kind.as_str(), "confirmation declined");
            return Err(ConsentError::Declined);
        }

        info!(kind = pending.kind.as_str(), "confirmation approved");
        Ok(pending)
    }

    /// Drop every pending confirmation, e.g. on `/clear`.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl Default for ConsentBroker {
    fn default() -> Self {
        Self::new(CONFIRMATION_TTL)
    }
}
