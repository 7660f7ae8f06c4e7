//! Built-in job handler implementations.

pub mod reservation;

pub use reservation::{ReservationExpiryJobHandler, ReservationPurgeJobHandler};
