//! Convenience result type alias for AccelHub.

use crate::error::AppError;

/// A specialized `Result` type for AccelHub operations.
pub type AppResult<T> = Result<T, AppError>;
