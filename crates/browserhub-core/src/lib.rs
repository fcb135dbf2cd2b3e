//! # browserhub-core
//!
//! Core crate for BrowserHub. Contains configuration schemas, typed
//! identifiers, the wall-clock abstraction used by every expiry policy,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other BrowserHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
