//! Storage backends for usage rows and reservations.
//!
//! Provides atomic admission and settlement using either:
//! - PostgreSQL row locks (for multi-node deployments)
//! - Per-project Tokio mutexes (for single-node deployments)

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use accelhub_core::config::{QuotaBackend, QuotaConfig};
use accelhub_core::result::AppResult;
use accelhub_core::types::ReservationId;
use accelhub_entity::quota::{Reservation, ResourceUsage};

use crate::admission::{RefreshPolicy, ReservePlan, Settlement};
use crate::error::QuotaError;
use crate::refresher::UsageRefresher;

pub use memory::MemoryQuotaStore;
pub use postgres::PostgresQuotaStore;

/// Atomic operations on usage rows and reservations.
///
/// Implementations must be thread-safe. Every mutating call is
/// all-or-nothing: on error, no row or reservation has changed.
#[async_trait]
pub trait QuotaStore: Send + Sync + std::fmt::Debug {
    /// Lock the plan's rows, run admission, and persist the result.
    async fn reserve(&self, plan: &ReservePlan) -> Result<Vec<Reservation>, QuotaError>;

    /// Settle the still-pending reservations among `ids`.
    ///
    /// Fails with [`QuotaError::UnknownReservation`] before touching
    /// anything if an ID does not exist. Returns the reservations this call
    /// moved out of `pending`; already settled ones are skipped.
    async fn settle(
        &self,
        ids: &[ReservationId],
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError>;

    /// Unconditionally recompute `in_use` of one row.
    async fn refresh(
        &self,
        project_id: &str,
        resource: &str,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Result<ResourceUsage, QuotaError>;

    /// Pending reservations that expired before `now`, oldest first.
    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ReservationId>>;

    /// Usage rows of a project.
    async fn usage(&self, project_id: &str) -> AppResult<Vec<ResourceUsage>>;

    /// Find a reservation by ID.
    async fn reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>>;

    /// Delete committed and rolled-back reservations settled before `before`.
    async fn purge_settled(&self, before: DateTime<Utc>) -> AppResult<u64>;
}

/// Dispatcher for quota storage backends.
///
/// Switches between PostgreSQL and in-memory state based on configuration.
#[derive(Debug, Clone)]
pub enum QuotaStoreDispatch {
    /// Process-local ledger (single node).
    Memory(MemoryQuotaStore),
    /// PostgreSQL tables (multi-node).
    Postgres(PostgresQuotaStore),
}

impl QuotaStoreDispatch {
    /// Creates the backend selected by `config.backend`.
    pub fn new(config: &QuotaConfig, pool: PgPool, refresher: UsageRefresher) -> Self {
        match config.backend {
            QuotaBackend::Memory => Self::Memory(MemoryQuotaStore::new(refresher)),
            QuotaBackend::Postgres => Self::Postgres(PostgresQuotaStore::new(pool, refresher)),
        }
    }
}

#[async_trait]
impl QuotaStore for QuotaStoreDispatch {
    async fn reserve(&self, plan: &ReservePlan) -> Result<Vec<Reservation>, QuotaError> {
        match self {
            Self::Memory(inner) => inner.reserve(plan).await,
            Self::Postgres(inner) => inner.reserve(plan).await,
        }
    }

    async fn settle(
        &self,
        ids: &[ReservationId],
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError> {
        match self {
            Self::Memory(inner) => inner.settle(ids, settlement, now).await,
            Self::Postgres(inner) => inner.settle(ids, settlement, now).await,
        }
    }

    async fn refresh(
        &self,
        project_id: &str,
        resource: &str,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Result<ResourceUsage, QuotaError> {
        match self {
            Self::Memory(inner) => inner.refresh(project_id, resource, policy, now).await,
            Self::Postgres(inner) => inner.refresh(project_id, resource, policy, now).await,
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ReservationId>> {
        match self {
            Self::Memory(inner) => inner.find_expired(now, limit).await,
            Self::Postgres(inner) => inner.find_expired(now, limit).await,
        }
    }

    async fn usage(&self, project_id: &str) -> AppResult<Vec<ResourceUsage>> {
        match self {
            Self::Memory(inner) => inner.usage(project_id).await,
            Self::Postgres(inner) => inner.usage(project_id).await,
        }
    }

    async fn reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        match self {
            Self::Memory(inner) => inner.reservation(id).await,
            Self::Postgres(inner) => inner.reservation(id).await,
        }
    }

    async fn purge_settled(&self, before: DateTime<Utc>) -> AppResult<u64> {
        match self {
            Self::Memory(inner) => inner.purge_settled(before).await,
            Self::Postgres(inner) => inner.purge_settled(before).await,
        }
    }
}
