//! # browserhub-entity
//!
//! Domain models for the BrowserHub scheduler. Every struct in this crate
//! is a persisted record or a value object handed to callers and clients.
//! All entities derive `Debug`, `Clone`, `Serialize` and `Deserialize`.

pub mod container;
pub mod event;
pub mod lease;
pub mod queue;
pub mod room;
