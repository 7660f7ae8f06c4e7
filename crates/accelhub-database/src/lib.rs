//! # accelhub-database
//!
//! PostgreSQL connection management and concrete repository
//! implementations for the accelerator records and the quota ledger.

pub mod connection;
pub mod error;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
