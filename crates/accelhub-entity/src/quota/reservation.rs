//! Quota reservation entity model.

use accelhub_core::types::{ReservationId, UsageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::ReservationStatus;

/// A provisional hold of `delta` units of one resource for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    /// Unique reservation identifier.
    pub id: ReservationId,
    /// Usage row the delta is accounted against (by id only).
    pub usage_id: UsageId,
    /// Project holding the reservation.
    pub project_id: String,
    /// Resource name.
    pub resource: String,
    /// Signed number of units; negative for releases.
    pub delta: i64,
    /// Current lifecycle state.
    pub status: ReservationStatus,
    /// After this instant a pending reservation may be reclaimed.
    pub expire_at: DateTime<Utc>,
    /// When the reservation was admitted.
    pub created_at: DateTime<Utc>,
    /// When the reservation last changed state.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// A new pending reservation against `usage_id`.
    pub fn pending(
        usage_id: UsageId,
        project_id: impl Into<String>,
        resource: impl Into<String>,
        delta: i64,
        expire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            usage_id,
            project_id: project_id.into(),
            resource: resource.into(),
            delta,
            status: ReservationStatus::Pending,
            expire_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the reservation is pending and past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expire_at < now
    }
}
