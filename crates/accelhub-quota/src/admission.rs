//! Admission rules shared by every quota store.
//!
//! Stores load and lock the usage rows of a request, hand a working copy to
//! [`admit`], and persist the copy only if admission succeeds. All
//! accounting arithmetic lives here so that the backends cannot diverge.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use accelhub_core::config::QuotaConfig;
use accelhub_core::error::AppError;
use accelhub_core::types::QuotaLimit;
use accelhub_entity::quota::{Reservation, ReservationStatus, ResourceUsage};

use crate::error::{OverQuota, QuotaError};
use crate::refresher::UsageRefresher;

/// When a usage row's `in_use` must be recomputed before admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Reservations admitted between refreshes. `0` refreshes every time.
    pub until_refresh: u32,
    /// Maximum time since the last refresh.
    pub max_age: Option<Duration>,
}

impl RefreshPolicy {
    /// Policy described by the quota configuration.
    pub fn from_config(config: &QuotaConfig) -> Self {
        let max_age = (config.max_age_seconds > 0)
            .then(|| i64::try_from(config.max_age_seconds).ok())
            .flatten()
            .and_then(Duration::try_seconds);
        Self {
            until_refresh: config.until_refresh,
            max_age,
        }
    }

    /// Refresh on every reservation.
    pub fn always() -> Self {
        Self {
            until_refresh: 0,
            max_age: None,
        }
    }

    /// Countdown value written by a refresh.
    pub(crate) fn countdown(&self) -> i32 {
        i32::try_from(self.until_refresh).unwrap_or(i32::MAX)
    }

    /// Whether `usage` must be refreshed before it is used for admission.
    ///
    /// A row that was never refreshed, whose countdown ran out, that is
    /// older than `max_age`, or whose `in_use` went negative is stale.
    pub fn needs_refresh(&self, usage: &ResourceUsage, now: DateTime<Utc>) -> bool {
        let countdown_expired = usage.until_refresh.is_none_or(|left| left <= 0);
        let too_old = self
            .max_age
            .is_some_and(|max_age| now - usage.updated_at > max_age);
        countdown_expired || too_old || usage.in_use < 0
    }
}

/// How a pending reservation is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Move the delta into `in_use`.
    Commit,
    /// Release the hold; `in_use` is untouched.
    Rollback,
}

impl Settlement {
    /// Terminal status the reservation moves to.
    pub fn status(self) -> ReservationStatus {
        match self {
            Self::Commit => ReservationStatus::Committed,
            Self::Rollback => ReservationStatus::RolledBack,
        }
    }

    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

/// A caller's request to reserve resource deltas for a project.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    /// Project to charge.
    pub project_id: String,
    /// Signed delta per resource name.
    pub deltas: BTreeMap<String, i64>,
    /// Lifetime of the pending reservations. Defaults to the configured value.
    pub expire_in: Option<Duration>,
    /// Staleness policy. Defaults to the configured policy.
    pub refresh_policy: Option<RefreshPolicy>,
    /// Admit even if a limit would be exceeded.
    pub allow_over_quota: bool,
    /// Resource whose accumulated delta left the `i64` range.
    overflowed: Option<String>,
}

impl ReserveRequest {
    /// Empty request for a project.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            deltas: BTreeMap::new(),
            expire_in: None,
            refresh_policy: None,
            allow_over_quota: false,
            overflowed: None,
        }
    }

    /// Add `delta` units of `resource`. Repeated resources accumulate.
    pub fn delta(mut self, resource: impl Into<String>, delta: i64) -> Self {
        let resource = resource.into();
        let total = self.deltas.entry(resource.clone()).or_insert(0);
        match total.checked_add(delta) {
            Some(sum) => *total = sum,
            None => self.overflowed = Some(resource),
        }
        self
    }

    /// Override the reservation lifetime.
    pub fn expire_in(mut self, expire_in: Duration) -> Self {
        self.expire_in = Some(expire_in);
        self
    }

    /// Override the staleness policy.
    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = Some(policy);
        self
    }

    /// Administrative reservation that ignores limits.
    pub fn allow_over_quota(mut self) -> Self {
        self.allow_over_quota = true;
        self
    }

    /// Reject malformed requests before any storage access.
    pub fn validate(&self) -> Result<(), QuotaError> {
        if self.project_id.trim().is_empty() {
            return Err(QuotaError::InvalidRequest("project id is empty".into()));
        }
        if self.deltas.is_empty() {
            return Err(QuotaError::InvalidRequest("no resource deltas".into()));
        }
        if self.deltas.keys().any(|resource| resource.trim().is_empty()) {
            return Err(QuotaError::InvalidRequest("empty resource name".into()));
        }
        if let Some(resource) = &self.overflowed {
            return Err(QuotaError::InvalidRequest(format!(
                "delta for {resource} is out of range"
            )));
        }
        if self.expire_in.is_some_and(|expire_in| expire_in <= Duration::zero()) {
            return Err(QuotaError::InvalidRequest(
                "expiry must be in the future".into(),
            ));
        }
        Ok(())
    }
}

/// A validated request with limits resolved, ready for a store.
#[derive(Debug, Clone)]
pub struct ReservePlan {
    /// Project to charge.
    pub project_id: String,
    /// Signed delta per resource name.
    pub deltas: BTreeMap<String, i64>,
    /// Effective limit per resource name.
    pub limits: BTreeMap<String, QuotaLimit>,
    /// Staleness policy.
    pub policy: RefreshPolicy,
    /// Admit even if a limit would be exceeded.
    pub allow_over_quota: bool,
    /// Expiry stamped on every created reservation.
    pub expire_at: DateTime<Utc>,
    /// Admission instant.
    pub now: DateTime<Utc>,
}

impl ReservePlan {
    /// Resource names in lock order.
    pub fn resources(&self) -> Vec<String> {
        self.deltas.keys().cloned().collect()
    }
}

/// Over-subscribed resources if `deltas` were admitted against `rows`.
///
/// Non-positive deltas and unlimited resources always pass. A projection
/// that overflows `i64` is reported as `i64::MAX`.
pub fn check(
    rows: &BTreeMap<String, ResourceUsage>,
    deltas: &BTreeMap<String, i64>,
    limits: &BTreeMap<String, QuotaLimit>,
) -> Vec<OverQuota> {
    deltas
        .iter()
        .filter(|&(_, &delta)| delta > 0)
        .filter_map(|(resource, &delta)| {
            let limit = limits.get(resource)?;
            let max = limit.as_max()?;
            let usage = rows.get(resource)?;
            let projected = usage
                .in_use
                .checked_add(usage.reserved)
                .and_then(|total| total.checked_add(delta))
                .unwrap_or(i64::MAX);
            limit.is_exceeded_by(projected).then(|| OverQuota {
                resource: resource.clone(),
                requested: delta,
                limit: max,
                projected,
            })
        })
        .collect()
}

/// Hold an admitted delta. Only positive deltas are held.
///
/// Fails if the hold would overflow `reserved`; `usage` is then unchanged.
pub fn apply_reserve(usage: &mut ResourceUsage, delta: i64) -> Result<(), QuotaError> {
    if delta > 0 {
        usage.reserved = usage.reserved.checked_add(delta).ok_or_else(|| {
            QuotaError::InvalidRequest(format!(
                "delta for {} overflows the reserved count",
                usage.resource
            ))
        })?;
    }
    Ok(())
}

/// Apply the settlement of a pending reservation's delta to its row.
pub fn apply_settlement(usage: &mut ResourceUsage, delta: i64, settlement: Settlement) {
    let held = delta.max(0);
    usage.reserved = usage.reserved.saturating_sub(held).max(0);
    if settlement == Settlement::Commit {
        usage.in_use = usage.in_use.saturating_add(delta);
    }
}

/// Run admission against locked working copies of the request's rows.
///
/// `rows` must hold one entry per resource of the plan. On success the rows
/// carry the refreshed, counted-down and held values to persist, and the
/// new pending reservations are returned. On failure the caller must
/// discard `rows`.
pub async fn admit(
    rows: &mut BTreeMap<String, ResourceUsage>,
    plan: &ReservePlan,
    refresher: &UsageRefresher,
) -> Result<Vec<Reservation>, QuotaError> {
    for resource in plan.deltas.keys() {
        let usage = rows.get_mut(resource).ok_or_else(|| {
            AppError::internal(format!(
                "Usage row for {resource} of project {} was not loaded",
                plan.project_id
            ))
        })?;

        if plan.policy.needs_refresh(usage, plan.now) {
            refresher.refresh(usage, &plan.policy, plan.now).await?;
        } else if let Some(left) = usage.until_refresh.as_mut() {
            *left -= 1;
        }
    }

    let overs = check(rows, &plan.deltas, &plan.limits);
    if !overs.is_empty() {
        if !plan.allow_over_quota {
            warn!(
                project_id = %plan.project_id,
                resources = ?overs.iter().map(|o| o.resource.as_str()).collect::<Vec<_>>(),
                "Reservation refused, quota exceeded"
            );
            return Err(QuotaError::OverQuota {
                project_id: plan.project_id.clone(),
                overs,
            });
        }
        warn!(
            project_id = %plan.project_id,
            resources = ?overs.iter().map(|o| o.resource.as_str()).collect::<Vec<_>>(),
            "Admitting reservation over quota"
        );
    }

    let mut reservations = Vec::with_capacity(plan.deltas.len());
    for (resource, &delta) in &plan.deltas {
        if let Some(usage) = rows.get_mut(resource) {
            apply_reserve(usage, delta)?;
            reservations.push(Reservation::pending(
                usage.id,
                plan.project_id.clone(),
                resource.clone(),
                delta,
                plan.expire_at,
                plan.now,
            ));
        }
    }

    Ok(reservations)
}
