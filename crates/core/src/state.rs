//! Declared session state.
//!
//! Everything the prompt composer reads lives here, declared and explicit.
//! Behavioral divergence flows through this record rather than through
//! ad-hoc flags scattered across call sites.

use serde::{Deserialize, Serialize};

/// Working posture of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Task-focused collaboration
    Workshop,
    /// Reflective, lower-pressure conversation
    Sanctuary,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "workshop" => Some(Self::Workshop),
            "sanctuary" => Some(Self::Sanctuary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workshop => "workshop",
            Self::Sanctuary => "sanctuary",
        }
    }
}

/// Interpretive lens layered over the mode. Blue adds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lens {
    Blue,
    Red,
    Purple,
}

impl Lens {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blue" => Some(Self::Blue),
            "red" => Some(Self::Red),
            "purple" => Some(Self::Purple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Purple => "purple",
        }
    }
}

/// How much unprompted direction the Node takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiative {
    Low,
    Normal,
    High,
}

impl Initiative {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Social warmth carryover between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialCarryover {
    Warm,
    Neutral,
}

/// Context-load severity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextBand {
    Low,
    Medium,
    High,
    Critical,
}

impl ContextBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

/// Latch state of a consent gate tied to a named backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "target")]
pub enum GateState {
    Closed,
    Open(String),
}

impl GateState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Open(t) => Some(t.as_str()),
            Self::Closed => None,
        }
    }
}

/// The full declared session state owned by the orchestrator.
///
/// Precedence rule: while `idleness` is true the mode is suspended (kept in
/// `suspended_mode` for restoration) and, while `idle_dim` is also active,
/// the effective initiative is forced to Low. Callers read
/// `effective_initiative()` instead of the raw field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub mode: Mode,
    pub lens: Lens,
    pub idleness: bool,
    /// The mode active when idleness was toggled on, restored on toggle off.
    pub suspended_mode: Option<Mode>,
    pub initiative: Initiative,
    pub social_carryover: SocialCarryover,
    pub search_gate: GateState,
    pub council_gate: GateState,
    pub context_band: ContextBand,
    pub idle_dim: bool,
    pub assistant_display_name: String,
}

impl SessionState {
    pub fn new(assistant_display_name: impl Into<String>) -> Self {
        Self {
            mode: Mode::Workshop,
            lens: Lens::Blue,
            idleness: false,
            suspended_mode: None,
            initiative: Initiative::Normal,
            social_carryover: SocialCarryover::Warm,
            search_gate: GateState::Closed,
            council_gate: GateState::Closed,
            context_band: ContextBand::Low,
            idle_dim: false,
            assistant_display_name: assistant_display_name.into(),
        }
    }

    /// Initiative after applying idleness dimming.
    pub fn effective_initiative(&self) -> Initiative {
        if self.idleness && self.idle_dim {
            Initiative::Low
        } else {
            self.initiative
        }
    }

    /// Toggle idleness on, suspending the current mode.
    pub fn enter_idleness(&mut self) {
        if !self.idleness {
            self.suspended_mode = Some(self.mode);
            self.idleness = true;
        }
    }

    /// Toggle idleness off, restoring the mode that was active at toggle-on.
    pub fn leave_idleness(&mut self) {
        if self.idleness {
            if let Some(m) = self.suspended_mode.take() {
                self.mode = m;
            }
            self.idleness = false;
            self.idle_dim = false;
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new("Node")
    }
}
