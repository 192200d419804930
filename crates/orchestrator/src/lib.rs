//! Turn orchestration for the cockpit.
//!
//! Everything between a raw Steward input line and a finished reply
//! lives here: slash command routing, literal memory intents, `@ref`
//! consent gating, bookmark weaving, and the generation pipeline
//! itself.

pub mod bookmark;
pub mod command;
pub mod intent;
pub mod orchestrator;

pub use bookmark::{weave, WovenBookmark};
pub use command::{Command, HELP_TEXT};
pub use orchestrator::{
    NodeReply, Orchestrator, OrchestratorOptions, Outcome, TurnStats, HISTORY_CONTEXT_TURNS,
    IDLE_THRESHOLD, MAX_RAM_EXCHANGES,
};
