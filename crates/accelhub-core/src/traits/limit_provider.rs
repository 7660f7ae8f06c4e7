//! Quota limit lookup trait.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::quota_limit::QuotaLimit;

/// Supplies the effective hard limit for a project's resource.
///
/// Lookups are pure: implementations never mutate quota state.
#[async_trait]
pub trait QuotaLimitProvider: Send + Sync + std::fmt::Debug {
    /// Resolve the effective limit for `(project_id, resource)`.
    ///
    /// Returns `None` when the resource is not registered at all.
    async fn limit_for(&self, project_id: &str, resource: &str) -> AppResult<Option<QuotaLimit>>;
}
