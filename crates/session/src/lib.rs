//! Session-scoped machinery: everything between the Steward's raw input
//! and the request that reaches a backend.
//!
//! - [`profile`]: JSON persona profiles with a built-in fallback
//! - [`compose`]: deterministic system-prompt assembly
//! - [`accountant`]: approximate context-load bands
//! - [`consent`]: two-phase confirmations with lazy expiry
//! - [`brief`]: redacted council briefs

pub mod accountant;
pub mod brief;
pub mod compose;
pub mod consent;
pub mod profile;

pub use accountant::{Assessment, ContextAccountant};
pub use brief::{prepare_brief, BriefInput, BriefMeta, RequestType};
pub use compose::compose;
pub use consent::{ConsentBroker, ConsentKind, Pending, Slot};
pub use profile::Profile;
