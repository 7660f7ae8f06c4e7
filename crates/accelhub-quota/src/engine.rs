//! The quota reservation engine.
//!
//! Callers follow a two-phase contract:
//!
//! 1. [`QuotaEngine::reserve`] the deltas the operation will cause.
//! 2. Perform the operation.
//! 3. [`QuotaEngine::commit`] the handle on success, or
//!    [`QuotaEngine::rollback`] it on failure.
//!
//! [`QuotaEngine::run_reserved`] wraps the whole contract. Reservations a
//! caller never settles are rolled back by [`QuotaEngine::sweep_expired`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use accelhub_core::config::QuotaConfig;
use accelhub_core::error::AppError;
use accelhub_core::traits::QuotaLimitProvider;
use accelhub_core::types::{QuotaLimit, ReservationId};
use accelhub_entity::quota::{Reservation, ResourceUsage};

use crate::admission::{RefreshPolicy, ReservePlan, ReserveRequest, Settlement};
use crate::error::QuotaError;
use crate::store::QuotaStore;

/// Opaque result of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHandle {
    /// Project the reservations belong to.
    pub project_id: String,
    /// One reservation per requested resource.
    pub reservation_ids: Vec<ReservationId>,
}

impl ReservationHandle {
    /// The reservation IDs to commit or roll back.
    pub fn ids(&self) -> &[ReservationId] {
        &self.reservation_ids
    }
}

/// Admits, settles and expires quota reservations.
#[derive(Debug, Clone)]
pub struct QuotaEngine {
    store: Arc<dyn QuotaStore>,
    limits: Arc<dyn QuotaLimitProvider>,
    config: QuotaConfig,
}

impl QuotaEngine {
    /// Creates an engine over a store and a limit provider.
    pub fn new(
        store: Arc<dyn QuotaStore>,
        limits: Arc<dyn QuotaLimitProvider>,
        config: QuotaConfig,
    ) -> Self {
        Self {
            store,
            limits,
            config,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Atomically reserve every delta of `request`, or nothing.
    ///
    /// Fails with [`QuotaError::OverQuota`] listing every over-subscribed
    /// resource unless the request allows over-quota admission.
    pub async fn reserve(&self, request: ReserveRequest) -> Result<ReservationHandle, QuotaError> {
        request.validate()?;

        let mut limits = BTreeMap::new();
        for resource in request.deltas.keys() {
            limits.insert(resource.clone(), self.resolve_limit(&request.project_id, resource).await?);
        }

        let now = Utc::now();
        let expire_in = match request.expire_in {
            Some(expire_in) => expire_in,
            None => self.default_expiry()?,
        };
        let expire_at = now
            .checked_add_signed(expire_in)
            .ok_or_else(|| QuotaError::InvalidRequest("expiry is out of range".into()))?;
        let plan = ReservePlan {
            project_id: request.project_id,
            deltas: request.deltas,
            limits,
            policy: request
                .refresh_policy
                .unwrap_or_else(|| RefreshPolicy::from_config(&self.config)),
            allow_over_quota: request.allow_over_quota,
            expire_at,
            now,
        };

        let created = self
            .with_retry("reserve", || self.store.reserve(&plan))
            .await?;

        info!(
            project_id = %plan.project_id,
            deltas = ?plan.deltas,
            expire_at = %plan.expire_at,
            "Quota reserved"
        );

        Ok(ReservationHandle {
            project_id: plan.project_id,
            reservation_ids: created.into_iter().map(|r| r.id).collect(),
        })
    }

    /// Commit pending reservations. Returns how many this call settled;
    /// already settled reservations are skipped.
    pub async fn commit(&self, ids: &[ReservationId]) -> Result<usize, QuotaError> {
        self.settle(ids, Settlement::Commit, Utc::now()).await
    }

    /// Roll back pending reservations. Returns how many this call settled;
    /// already settled reservations are skipped.
    pub async fn rollback(&self, ids: &[ReservationId]) -> Result<usize, QuotaError> {
        self.settle(ids, Settlement::Rollback, Utc::now()).await
    }

    async fn settle(
        &self,
        ids: &[ReservationId],
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<usize, QuotaError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let settled = self
            .with_retry(settlement.as_str(), || {
                self.store.settle(ids, settlement, now)
            })
            .await?;

        if !settled.is_empty() {
            info!(
                requested = ids.len(),
                settled = settled.len(),
                status = %settlement.status(),
                "Reservations settled"
            );
        }
        Ok(settled.len())
    }

    /// Roll back every pending reservation that has expired.
    pub async fn sweep_expired(&self) -> Result<usize, QuotaError> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Roll back every pending reservation with `expire_at < now`, in
    /// batches of the configured size. Returns the number reclaimed.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize, QuotaError> {
        let batch_size = self.config.sweep_batch_size.max(1);
        let mut reclaimed = 0;

        loop {
            let expired = self
                .with_retry("find_expired", || async {
                    self.store
                        .find_expired(now, batch_size)
                        .await
                        .map_err(QuotaError::from)
                })
                .await?;
            if expired.is_empty() {
                break;
            }

            let settled = self.settle(&expired, Settlement::Rollback, now).await?;
            reclaimed += settled;

            if (expired.len() as i64) < batch_size || settled == 0 {
                break;
            }
        }

        if reclaimed > 0 {
            info!(reclaimed = reclaimed, "Expired reservations rolled back");
        }
        Ok(reclaimed)
    }

    /// Recompute `in_use` of one resource regardless of staleness.
    pub async fn refresh_usage(
        &self,
        project_id: &str,
        resource: &str,
    ) -> Result<ResourceUsage, QuotaError> {
        self.resolve_limit(project_id, resource).await?;
        let policy = RefreshPolicy::from_config(&self.config);
        let now = Utc::now();

        self.with_retry("refresh", || {
            self.store.refresh(project_id, resource, &policy, now)
        })
        .await
    }

    /// Usage rows of a project.
    pub async fn project_usage(&self, project_id: &str) -> Result<Vec<ResourceUsage>, QuotaError> {
        Ok(self.store.usage(project_id).await?)
    }

    /// Find a reservation by ID.
    pub async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, QuotaError> {
        Ok(self.store.reservation(id).await?)
    }

    /// Delete settled reservations older than the retention period.
    pub async fn purge_settled(&self) -> Result<u64, QuotaError> {
        let retention = Duration::try_days(self.config.reservation_retention_days.max(0))
            .ok_or_else(|| AppError::configuration("Reservation retention is out of range"))?;
        let purged = self.store.purge_settled(Utc::now() - retention).await?;
        if purged > 0 {
            info!(purged = purged, "Settled reservations purged");
        }
        Ok(purged)
    }

    /// Run `operation` under a reservation.
    ///
    /// The reservation is committed if the operation succeeds and rolled
    /// back if it fails. A failed rollback is logged and left to the
    /// expiry sweep; the operation's error is returned.
    pub async fn run_reserved<T, F, Fut>(
        &self,
        request: ReserveRequest,
        operation: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let handle = self.reserve(request).await?;

        match operation().await {
            Ok(value) => {
                self.commit(handle.ids()).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(handle.ids()).await {
                    error!(
                        project_id = %handle.project_id,
                        error = %rollback_err,
                        "Failed to roll back reservation, leaving it to expire"
                    );
                }
                Err(err)
            }
        }
    }

    async fn resolve_limit(&self, project_id: &str, resource: &str) -> Result<QuotaLimit, QuotaError> {
        self.limits
            .limit_for(project_id, resource)
            .await?
            .ok_or_else(|| QuotaError::UnknownResource {
                resource: resource.to_string(),
            })
    }

    fn default_expiry(&self) -> Result<Duration, QuotaError> {
        Duration::try_seconds(self.config.reservation_expire_seconds)
            .filter(|expire_in| *expire_in > Duration::zero())
            .ok_or_else(|| {
                QuotaError::Storage(AppError::configuration(
                    "quota.reservation_expire_seconds must be positive",
                ))
            })
    }

    /// Retry `attempt` on transient storage failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, QuotaError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QuotaError>>,
    {
        let max_backoff = StdDuration::from_millis(self.config.retry_backoff_max_ms);
        let mut backoff = StdDuration::from_millis(self.config.retry_backoff_ms).min(max_backoff);
        let mut retries = 0;

        loop {
            match attempt().await {
                Err(err) if err.is_transient() && retries < self.config.max_retries => {
                    retries += 1;
                    warn!(
                        operation = operation,
                        attempt = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient quota storage failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
                Err(err) => {
                    if err.is_transient() {
                        error!(operation = operation, retries = retries, error = %err, "Giving up after retries");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}
