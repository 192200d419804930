//! Durable storage for Sovwren sessions.
//!
//! A single SQLite database file holds four tables:
//! - `sessions` — one row per conversation session
//! - `turns` — append-only exchange log
//! - `protocol_events` — append-only audit trail
//! - `user_preferences` — key/value preferences

mod sqlite;

pub use sqlite::{SessionUpdate, Store};
