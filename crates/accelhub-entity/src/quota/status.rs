//! Reservation status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a quota reservation.
///
/// A reservation starts `Pending` and moves exactly once to a terminal
/// state. Terminal reservations are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holding quota; awaiting commit, rollback, or expiry.
    Pending,
    /// Delta moved into `in_use`.
    Committed,
    /// Hold released without touching `in_use`.
    RolledBack,
}

impl ReservationStatus {
    /// Check if the reservation is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
