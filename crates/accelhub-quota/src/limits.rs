//! Quota limit resolution: determines the hard limit of a project's resource.
//!
//! Resolution order:
//! 1. Per-project override (database table or in-memory map)
//! 2. Resource default from configuration
//! 3. Unknown resource (`None`)

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::info;

use accelhub_core::config::{QuotaBackend, QuotaConfig};
use accelhub_core::result::AppResult;
use accelhub_core::traits::QuotaLimitProvider;
use accelhub_core::types::QuotaLimit;
use accelhub_database::repositories::QuotaLimitRepository;

/// Where per-project overrides are kept.
#[derive(Debug, Clone)]
pub enum LimitOverrides {
    /// `project_quotas` table.
    Database(Arc<QuotaLimitRepository>),
    /// Process-local map keyed by `(project_id, resource)`.
    Memory(Arc<DashMap<(String, String), i64>>),
}

impl LimitOverrides {
    /// Empty in-memory overrides.
    pub fn memory() -> Self {
        Self::Memory(Arc::new(DashMap::new()))
    }

    /// Overrides kept alongside the selected storage backend.
    pub fn for_backend(backend: QuotaBackend, pool: PgPool) -> Self {
        match backend {
            QuotaBackend::Postgres => Self::Database(Arc::new(QuotaLimitRepository::new(pool))),
            QuotaBackend::Memory => Self::memory(),
        }
    }
}

/// Resolves effective quota limits from overrides and configured defaults.
#[derive(Debug, Clone)]
pub struct QuotaLimiter {
    overrides: LimitOverrides,
    defaults: BTreeMap<String, i64>,
}

impl QuotaLimiter {
    /// Creates a limiter over `overrides` with the configured defaults.
    pub fn new(overrides: LimitOverrides, config: &QuotaConfig) -> Self {
        Self {
            overrides,
            defaults: config.limits.clone(),
        }
    }

    /// Look up the per-project override, if any.
    pub async fn project_override(
        &self,
        project_id: &str,
        resource: &str,
    ) -> AppResult<Option<QuotaLimit>> {
        match &self.overrides {
            LimitOverrides::Database(repo) => Ok(repo
                .find(project_id, resource)
                .await?
                .map(|quota| quota.limit())),
            LimitOverrides::Memory(map) => Ok(map
                .get(&(project_id.to_string(), resource.to_string()))
                .map(|entry| QuotaLimit::from(*entry.value()))),
        }
    }

    /// The configured default for a resource.
    pub fn default_limit(&self, resource: &str) -> Option<QuotaLimit> {
        self.defaults.get(resource).copied().map(QuotaLimit::from)
    }

    /// Configured defaults, by resource name.
    pub fn defaults(&self) -> &BTreeMap<String, i64> {
        &self.defaults
    }

    /// Sets a per-project override. A negative limit means unlimited.
    pub async fn set_project_limit(
        &self,
        project_id: &str,
        resource: &str,
        hard_limit: i64,
    ) -> AppResult<()> {
        match &self.overrides {
            LimitOverrides::Database(repo) => {
                repo.upsert(project_id, resource, hard_limit).await?;
            }
            LimitOverrides::Memory(map) => {
                map.insert((project_id.to_string(), resource.to_string()), hard_limit);
            }
        }
        info!(
            project_id = %project_id,
            resource = %resource,
            limit = %QuotaLimit::from(hard_limit),
            "Project quota limit set"
        );
        Ok(())
    }

    /// Removes a per-project override (falls back to the resource default).
    pub async fn remove_project_limit(&self, project_id: &str, resource: &str) -> AppResult<bool> {
        let removed = match &self.overrides {
            LimitOverrides::Database(repo) => repo.delete(project_id, resource).await?,
            LimitOverrides::Memory(map) => map
                .remove(&(project_id.to_string(), resource.to_string()))
                .is_some(),
        };
        if removed {
            info!(project_id = %project_id, resource = %resource, "Project quota limit removed");
        }
        Ok(removed)
    }
}

#[async_trait]
impl QuotaLimitProvider for QuotaLimiter {
    async fn limit_for(&self, project_id: &str, resource: &str) -> AppResult<Option<QuotaLimit>> {
        if let Some(limit) = self.project_override(project_id, resource).await? {
            return Ok(Some(limit));
        }
        Ok(self.default_limit(resource))
    }
}
