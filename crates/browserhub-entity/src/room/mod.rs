//! Per-room scheduling views.

pub mod cooldown;

pub use cooldown::CooldownStatus;
