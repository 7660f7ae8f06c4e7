//! In-memory quota store using Tokio mutexes for single-node deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use accelhub_core::result::AppResult;
use accelhub_core::types::ReservationId;
use accelhub_entity::quota::{Reservation, ReservationStatus, ResourceUsage};

use super::QuotaStore;
use crate::admission::{self, RefreshPolicy, ReservePlan, Settlement};
use crate::error::QuotaError;
use crate::refresher::UsageRefresher;

/// Usage rows of one project, keyed by resource name.
#[derive(Debug, Default)]
struct ProjectLedger {
    rows: HashMap<String, ResourceUsage>,
}

impl ProjectLedger {
    /// Working copies of the rows for `resources`, zero-initialized if absent.
    fn working_copy(
        &self,
        project_id: &str,
        resources: &[String],
        now: DateTime<Utc>,
    ) -> BTreeMap<String, ResourceUsage> {
        resources
            .iter()
            .map(|resource| {
                let row = self
                    .rows
                    .get(resource)
                    .cloned()
                    .unwrap_or_else(|| ResourceUsage::empty(project_id, resource.as_str(), now));
                (resource.clone(), row)
            })
            .collect()
    }
}

/// In-memory quota store.
///
/// Each project's rows sit behind their own mutex, so admissions for
/// different projects never contend. Reservations share one map. Locks are
/// always taken project first, then reservations.
///
/// Suitable for single-node deployments only.
#[derive(Debug, Clone)]
pub struct MemoryQuotaStore {
    projects: Arc<DashMap<String, Arc<Mutex<ProjectLedger>>>>,
    reservations: Arc<Mutex<HashMap<ReservationId, Reservation>>>,
    refresher: UsageRefresher,
}

impl MemoryQuotaStore {
    /// Creates an empty in-memory store.
    pub fn new(refresher: UsageRefresher) -> Self {
        Self {
            projects: Arc::new(DashMap::new()),
            reservations: Arc::new(Mutex::new(HashMap::new())),
            refresher,
        }
    }

    /// The ledger of a project, created on first use.
    fn ledger(&self, project_id: &str) -> Arc<Mutex<ProjectLedger>> {
        let entry = self.projects.entry(project_id.to_string()).or_default();
        Arc::clone(entry.value())
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn reserve(&self, plan: &ReservePlan) -> Result<Vec<Reservation>, QuotaError> {
        let ledger = self.ledger(&plan.project_id);
        let mut ledger = ledger.lock().await;

        let mut rows = ledger.working_copy(&plan.project_id, &plan.resources(), plan.now);
        let created = admission::admit(&mut rows, plan, &self.refresher).await?;

        ledger.rows.extend(rows);
        let mut reservations = self.reservations.lock().await;
        for reservation in &created {
            reservations.insert(reservation.id, reservation.clone());
        }

        Ok(created)
    }

    async fn settle(
        &self,
        ids: &[ReservationId],
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError> {
        let by_project = {
            let reservations = self.reservations.lock().await;
            let missing: Vec<ReservationId> = ids
                .iter()
                .filter(|id| !reservations.contains_key(*id))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(QuotaError::UnknownReservation { ids: missing });
            }

            let mut by_project: BTreeMap<String, Vec<ReservationId>> = BTreeMap::new();
            for reservation in ids.iter().filter_map(|id| reservations.get(id)) {
                if reservation.status == ReservationStatus::Pending {
                    by_project
                        .entry(reservation.project_id.clone())
                        .or_default()
                        .push(reservation.id);
                }
            }
            by_project
        };

        let mut settled = Vec::new();
        for (project_id, project_ids) in by_project {
            let ledger = self.ledger(&project_id);
            let mut ledger = ledger.lock().await;
            let mut reservations = self.reservations.lock().await;

            for id in project_ids {
                let Some(reservation) = reservations.get_mut(&id) else {
                    continue;
                };
                // Lost the race to another settlement.
                if reservation.status != ReservationStatus::Pending {
                    continue;
                }
                reservation.status = settlement.status();
                reservation.updated_at = now;

                if let Some(row) = ledger.rows.get_mut(&reservation.resource) {
                    admission::apply_settlement(row, reservation.delta, settlement);
                }
                settled.push(reservation.clone());
            }
        }

        Ok(settled)
    }

    async fn refresh(
        &self,
        project_id: &str,
        resource: &str,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Result<ResourceUsage, QuotaError> {
        let ledger = self.ledger(project_id);
        let mut ledger = ledger.lock().await;

        let mut row = ledger
            .rows
            .get(resource)
            .cloned()
            .unwrap_or_else(|| ResourceUsage::empty(project_id, resource, now));
        self.refresher.refresh(&mut row, policy, now).await?;

        ledger.rows.insert(resource.to_string(), row.clone());
        Ok(row)
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ReservationId>> {
        let reservations = self.reservations.lock().await;
        let mut expired: Vec<&Reservation> = reservations
            .values()
            .filter(|reservation| reservation.is_expired(now))
            .collect();
        expired.sort_by_key(|reservation| reservation.expire_at);

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(expired
            .into_iter()
            .take(limit)
            .map(|reservation| reservation.id)
            .collect())
    }

    async fn usage(&self, project_id: &str) -> AppResult<Vec<ResourceUsage>> {
        let Some(ledger) = self
            .projects
            .get(project_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return Ok(Vec::new());
        };

        let ledger = ledger.lock().await;
        let mut rows: Vec<ResourceUsage> = ledger.rows.values().cloned().collect();
        rows.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(rows)
    }

    async fn reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        Ok(self.reservations.lock().await.get(&id).cloned())
    }

    async fn purge_settled(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut reservations = self.reservations.lock().await;
        let len_before = reservations.len();
        reservations.retain(|_, reservation| {
            !(reservation.status.is_terminal() && reservation.updated_at < before)
        });
        Ok((len_before - reservations.len()) as u64)
    }
}
