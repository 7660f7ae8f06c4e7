//! Recomputation of `in_use` from the authoritative record store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use accelhub_core::traits::UsageSource;
use accelhub_entity::quota::ResourceUsage;

use crate::admission::RefreshPolicy;
use crate::error::QuotaError;

/// Rewrites a usage row's `in_use` from a [`UsageSource`].
///
/// Always called with the row locked by the caller, so a refresh is
/// serialized with admission on the same row. `reserved` is never touched.
#[derive(Debug, Clone)]
pub struct UsageRefresher {
    source: Arc<dyn UsageSource>,
}

impl UsageRefresher {
    /// Creates a refresher counting usage through `source`.
    pub fn new(source: Arc<dyn UsageSource>) -> Self {
        Self { source }
    }

    /// Recompute `in_use`, reset the countdown and stamp `updated_at`.
    ///
    /// On failure the row is left untouched and [`QuotaError::StaleUsage`]
    /// is returned; callers must refuse the admission.
    pub async fn refresh(
        &self,
        usage: &mut ResourceUsage,
        policy: &RefreshPolicy,
        now: DateTime<Utc>,
    ) -> Result<i64, QuotaError> {
        let counted = self
            .source
            .count_in_use(&usage.project_id, &usage.resource)
            .await
            .map_err(|source| QuotaError::StaleUsage {
                project_id: usage.project_id.clone(),
                resource: usage.resource.clone(),
                source,
            })?;

        if counted != usage.in_use && usage.until_refresh.is_some() {
            warn!(
                project_id = %usage.project_id,
                resource = %usage.resource,
                recorded = usage.in_use,
                counted = counted,
                delta = usage.in_use - counted,
                "Usage drift detected, correcting"
            );
        }

        usage.in_use = counted;
        usage.until_refresh = Some(policy.countdown());
        usage.updated_at = now;

        debug!(
            project_id = %usage.project_id,
            resource = %usage.resource,
            in_use = counted,
            "Usage refreshed"
        );

        Ok(counted)
    }
}
