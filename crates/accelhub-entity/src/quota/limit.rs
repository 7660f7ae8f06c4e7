//! Per-project quota limit override entity.

use accelhub_core::types::QuotaLimit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A per-project override of a resource's hard limit.
///
/// When present, this takes priority over the resource default from
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectQuota {
    /// The project whose limit is overridden.
    pub project_id: String,
    /// Resource name.
    pub resource: String,
    /// Hard limit; negative means unlimited.
    pub hard_limit: i64,
    /// When the override was created.
    pub created_at: DateTime<Utc>,
    /// When the override was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ProjectQuota {
    /// The override as a [`QuotaLimit`].
    pub fn limit(&self) -> QuotaLimit {
        QuotaLimit::from(self.hard_limit)
    }
}
