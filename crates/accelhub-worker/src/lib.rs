//! Scheduled maintenance jobs for AccelHub.
//!
//! This crate provides:
//! - A job executor that dispatches scheduled runs to the correct handler
//! - A cron scheduler that triggers the executor on configured schedules
//! - Built-in handlers for the reservation expiry sweep and retention purge

pub mod executor;
pub mod jobs;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler, JobRun};
pub use scheduler::CronScheduler;
pub use jobs::{ReservationExpiryJobHandler, ReservationPurgeJobHandler};
