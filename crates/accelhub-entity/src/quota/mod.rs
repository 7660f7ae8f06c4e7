//! Quota accounting entities: usage rows, reservations, and per-project
//! limit overrides.

pub mod limit;
pub mod reservation;
pub mod status;
pub mod usage;

pub use limit::ProjectQuota;
pub use reservation::Reservation;
pub use status::ReservationStatus;
pub use usage::ResourceUsage;
