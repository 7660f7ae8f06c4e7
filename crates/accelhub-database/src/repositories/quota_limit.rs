//! Per-project quota limit override repository.

use sqlx::PgPool;

use accelhub_core::result::AppResult;
use accelhub_entity::quota::ProjectQuota;

use crate::error::db_error;

/// Repository for per-project quota limit overrides.
#[derive(Debug, Clone)]
pub struct QuotaLimitRepository {
    pool: PgPool,
}

impl QuotaLimitRepository {
    /// Create a new quota limit repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the override for one resource of a project.
    pub async fn find(&self, project_id: &str, resource: &str) -> AppResult<Option<ProjectQuota>> {
        sqlx::query_as::<_, ProjectQuota>(
            "SELECT * FROM project_quotas WHERE project_id = $1 AND resource = $2",
        )
        .bind(project_id)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find project quota", e))
    }

    /// All overrides of a project.
    pub async fn find_by_project(&self, project_id: &str) -> AppResult<Vec<ProjectQuota>> {
        sqlx::query_as::<_, ProjectQuota>(
            "SELECT * FROM project_quotas WHERE project_id = $1 ORDER BY resource ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list project quotas", e))
    }

    /// Insert or replace an override.
    pub async fn upsert(&self, project_id: &str, resource: &str, hard_limit: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO project_quotas (project_id, resource, hard_limit) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (project_id, resource) DO UPDATE SET \
                hard_limit = EXCLUDED.hard_limit, \
                updated_at = NOW()",
        )
        .bind(project_id)
        .bind(resource)
        .bind(hard_limit)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert project quota", e))?;
        Ok(())
    }

    /// Delete an override. Returns whether one existed.
    pub async fn delete(&self, project_id: &str, resource: &str) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM project_quotas WHERE project_id = $1 AND resource = $2")
                .bind(project_id)
                .bind(resource)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Failed to delete project quota", e))?;
        Ok(result.rows_affected() > 0)
    }
}
