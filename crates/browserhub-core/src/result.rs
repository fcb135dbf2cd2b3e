//! Convenience result type alias for BrowserHub.

use crate::error::AppError;

/// A specialized `Result` type for BrowserHub operations.
pub type AppResult<T> = Result<T, AppError>;
