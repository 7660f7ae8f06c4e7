//! # accelhub-core
//!
//! Core crate for AccelHub. Contains configuration schemas, typed
//! identifiers, quota limit types, the seam traits implemented by the
//! storage and quota crates, and the unified error system.
//!
//! This crate has **no** internal dependencies on other AccelHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
