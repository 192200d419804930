pub mod chat;
pub mod doctor;
pub mod models;
pub mod sessions;

pub(crate) mod wiring;
