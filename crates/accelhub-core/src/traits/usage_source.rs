//! Source-of-truth usage counting for quota refreshes.

use async_trait::async_trait;

use crate::result::AppResult;

/// Counts the units of a resource a project actually consumes, as recorded
/// by the owning record store.
///
/// Implementations must not read or write quota usage rows; they are called
/// while such a row is locked.
#[async_trait]
pub trait UsageSource: Send + Sync + std::fmt::Debug {
    /// Return the authoritative `in_use` count for `(project_id, resource)`.
    async fn count_in_use(&self, project_id: &str, resource: &str) -> AppResult<i64>;
}
