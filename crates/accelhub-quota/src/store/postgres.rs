//! PostgreSQL quota store using row-level locks for multi-node deployments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use accelhub_core::error::AppError;
use accelhub_core::result::AppResult;
use accelhub_core::types::ReservationId;
use accelhub_database::error::db_error;
use accelhub_database::repositories::{QuotaUsageRepository, ReservationRepository};
use accelhub_entity::quota::{Reservation, ResourceUsage};

use super::QuotaStore;
use crate::admission::{self, RefreshPolicy, ReservePlan, Settlement};
use crate::error::QuotaError;
use crate::refresher::UsageRefresher;

/// PostgreSQL-backed quota store.
///
/// Every mutating call runs in one transaction. Usage rows are locked with
/// `SELECT ... FOR UPDATE` in a fixed order (resource name on admission,
/// row id on settlement), so concurrent callers on the same project
/// serialize instead of over-admitting. Any error drops the transaction,
/// which rolls every change back.
#[derive(Debug, Clone)]
pub struct PostgresQuotaStore {
    usages: Arc<QuotaUsageRepository>,
    reservations: Arc<ReservationRepository>,
    refresher: UsageRefresher,
}

impl PostgresQuotaStore {
    /// Creates a store over `pool`.
    pub fn new(pool: PgPool, refresher: UsageRefresher) -> Self {
        Self {
            usages: Arc::new(QuotaUsageRepository::new(pool.clone())),
            reservations: Arc::new(ReservationRepository::new(pool)),
            refresher,
        }
    }
}

#[async_trait]
impl QuotaStore for PostgresQuotaStore {
    async fn reserve(&self, plan: &ReservePlan) -> Result<Vec<Reservation>, QuotaError> {
        let resources = plan.resources();
        let mut tx = self.usages.begin().await?;

        QuotaUsageRepository::ensure_rows(&mut *tx, &plan.project_id, &resources).await?;
        let mut rows: BTreeMap<String, ResourceUsage> =
            QuotaUsageRepository::lock_rows(&mut *tx, &plan.project_id, &resources)
                .await?
                .into_iter()
                .map(|row| (row.resource.clone(), row))
                .collect();

        let created = admission::admit(&mut rows, plan, &self.refresher).await?;

        for row in rows.values() {
            QuotaUsageRepository::save(&mut *tx, row).await?;
        }
        ReservationRepository::insert(&mut *tx, &created).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit reservation", e))?;

        Ok(created)
    }

    async fn settle(
        &self,
        ids: &[ReservationId],
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError> {
        let mut uuids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
        uuids.sort_unstable();
        uuids.dedup();

        let mut tx = self.reservations.begin().await?;

        let existing: HashSet<ReservationId> =
            ReservationRepository::find_existing_ids(&mut *tx, &uuids)
                .await?
                .into_iter()
                .collect();
        if existing.len() != uuids.len() {
            let missing: Vec<ReservationId> = ids
                .iter()
                .filter(|id| !existing.contains(*id))
                .copied()
                .collect();
            return Err(QuotaError::UnknownReservation { ids: missing });
        }

        // Compare-and-set: only rows still pending under the lock are ours.
        let mut pending = ReservationRepository::lock_pending(&mut *tx, &uuids).await?;
        if pending.is_empty() {
            debug!(count = uuids.len(), "Reservations already settled");
            return Ok(Vec::new());
        }

        let mut usage_ids: Vec<Uuid> = pending.iter().map(|r| r.usage_id.into_uuid()).collect();
        usage_ids.sort_unstable();
        usage_ids.dedup();
        let mut rows: HashMap<Uuid, ResourceUsage> =
            QuotaUsageRepository::lock_by_ids(&mut *tx, &usage_ids)
                .await?
                .into_iter()
                .map(|row| (row.id.into_uuid(), row))
                .collect();

        for reservation in &mut pending {
            let row = rows.get_mut(reservation.usage_id.as_uuid()).ok_or_else(|| {
                AppError::internal(format!(
                    "Usage row {} of reservation {} is missing",
                    reservation.usage_id, reservation.id
                ))
            })?;
            admission::apply_settlement(row, reservation.delta, settlement);
            reservation.status = settlement.status();
            reservation.updated_at = now;
        }

        for row in rows.values() {
            QuotaUsageRepository::save(&mut *tx, row).await?;
        }
        let pending_ids: Vec<Uuid> = pending.iter().map(|r| r.id.into_uuid()).collect();
        ReservationRepository::transition(&mut *tx, &pending_ids, settlement.status(), now)
            .await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit settlement", e))?;

        Ok(pending)
    }

    async fn refresh(
        &self,
        project_id: &str,
        resource: &str,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Result<ResourceUsage, QuotaError> {
        let resources = vec![resource.to_string()];
        let mut tx = self.usages.begin().await?;

        QuotaUsageRepository::ensure_rows(&mut *tx, project_id, &resources).await?;
        let mut row = QuotaUsageRepository::lock_rows(&mut *tx, project_id, &resources)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::internal(format!(
                    "Usage row for {resource} of project {project_id} was not created"
                ))
            })?;

        self.refresher.refresh(&mut row, policy, now).await?;
        QuotaUsageRepository::save(&mut *tx, &row).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit usage refresh", e))?;

        Ok(row)
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ReservationId>> {
        self.reservations.find_expired(now, limit).await
    }

    async fn usage(&self, project_id: &str) -> AppResult<Vec<ResourceUsage>> {
        self.usages.find_by_project(project_id).await
    }

    async fn reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        self.reservations.find_by_id(id).await
    }

    async fn purge_settled(&self, before: DateTime<Utc>) -> AppResult<u64> {
        self.reservations.purge_settled(before).await
    }
}
