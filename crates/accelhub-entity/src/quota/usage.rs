//! Per-(project, resource) usage row.

use accelhub_core::types::UsageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Accounting row for one resource of one project.
///
/// `reserved` is written only by the reservation engine; `in_use` only by
/// commits and usage refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ResourceUsage {
    /// Row identifier referenced by reservations.
    pub id: UsageId,
    /// Project the row accounts for.
    pub project_id: String,
    /// Resource name (`accelerators`, `fpga`, ...).
    pub resource: String,
    /// Units currently consumed, as last refreshed or committed.
    pub in_use: i64,
    /// Units held by pending reservations.
    pub reserved: i64,
    /// Reservations left before `in_use` is recomputed. `None` until the
    /// first refresh.
    pub until_refresh: Option<i32>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When `in_use` was last recomputed.
    pub updated_at: DateTime<Utc>,
}

impl ResourceUsage {
    /// A zero-initialized row that has never been refreshed.
    pub fn empty(project_id: impl Into<String>, resource: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: UsageId::new(),
            project_id: project_id.into(),
            resource: resource.into(),
            in_use: 0,
            reserved: 0,
            until_refresh: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `in_use + reserved`.
    pub fn total(&self) -> i64 {
        self.in_use.saturating_add(self.reserved)
    }
}
