//! Core traits defined in `accelhub-core` and implemented by other crates.

pub mod limit_provider;
pub mod usage_source;

pub use limit_provider::QuotaLimitProvider;
pub use usage_source::UsageSource;
