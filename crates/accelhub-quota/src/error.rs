//! Quota engine error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use accelhub_core::error::{AppError, ErrorKind};
use accelhub_core::types::ReservationId;

/// Detail for one over-subscribed resource of a rejected reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverQuota {
    /// Resource name.
    pub resource: String,
    /// Delta the caller asked for.
    pub requested: i64,
    /// Effective hard limit.
    pub limit: i64,
    /// `in_use + reserved + requested` at admission time.
    pub projected: i64,
}

impl fmt::Display for OverQuota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (requested {}, limit {}, projected {})",
            self.resource, self.requested, self.limit, self.projected
        )
    }
}

/// Errors returned by the quota engine.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// One or more resources would exceed their limit. Nothing was reserved.
    #[error("Quota exceeded for project {project_id}: {}", join(.overs))]
    OverQuota {
        /// Project the reservation was made for.
        project_id: String,
        /// Every over-subscribed resource.
        overs: Vec<OverQuota>,
    },

    /// Commit or rollback named reservations that do not exist.
    #[error("Unknown reservations: {}", join(.ids))]
    UnknownReservation {
        /// The IDs that were not found.
        ids: Vec<ReservationId>,
    },

    /// The resource has neither a configured default nor a project override.
    #[error("Unknown quota resource: {resource}")]
    UnknownResource {
        /// Resource name.
        resource: String,
    },

    /// A stale usage row could not be recomputed. The reservation is refused.
    #[error("Failed to refresh usage of {resource} for project {project_id}")]
    StaleUsage {
        /// Project being refreshed.
        project_id: String,
        /// Resource being refreshed.
        resource: String,
        /// Failure reported by the usage source.
        #[source]
        source: AppError,
    },

    /// The request is malformed.
    #[error("Invalid reservation request: {0}")]
    InvalidRequest(String),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] AppError),
}

impl QuotaError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_transient())
    }
}

impl From<QuotaError> for AppError {
    fn from(err: QuotaError) -> Self {
        let kind = match err {
            QuotaError::Storage(inner) => return inner,
            QuotaError::OverQuota { .. } => ErrorKind::Conflict,
            QuotaError::UnknownReservation { .. } => ErrorKind::NotFound,
            QuotaError::UnknownResource { .. } | QuotaError::InvalidRequest(_) => {
                ErrorKind::Validation
            }
            QuotaError::StaleUsage { .. } => ErrorKind::ServiceUnavailable,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
