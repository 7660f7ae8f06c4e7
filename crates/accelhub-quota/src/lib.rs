//! # accelhub-quota
//!
//! Two-phase quota reservation engine.
//!
//! Callers reserve a set of signed resource deltas for a project, perform
//! the guarded work, and then commit or roll back the returned handle.
//! Pending reservations that are never settled are reclaimed by the expiry
//! sweep. State lives either in PostgreSQL (row locks, multi-node) or in a
//! process-local ledger (single node), selected by
//! [`QuotaBackend`](accelhub_core::config::QuotaBackend).

pub mod admission;
pub mod engine;
pub mod error;
pub mod limits;
pub mod refresher;
pub mod store;

pub use admission::{RefreshPolicy, ReserveRequest, Settlement};
pub use engine::{QuotaEngine, ReservationHandle};
pub use error::{OverQuota, QuotaError};
pub use limits::{LimitOverrides, QuotaLimiter};
pub use refresher::UsageRefresher;
pub use store::{QuotaStore, QuotaStoreDispatch};
