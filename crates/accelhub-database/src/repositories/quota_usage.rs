//! Quota usage row repository.
//!
//! Methods taking a `&mut PgConnection` are meant to run inside a caller's
//! transaction so that row locks are held until commit.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use accelhub_core::result::AppResult;
use accelhub_entity::quota::ResourceUsage;

use crate::error::db_error;

/// Repository for per-(project, resource) usage rows.
#[derive(Debug, Clone)]
pub struct QuotaUsageRepository {
    pool: PgPool,
}

impl QuotaUsageRepository {
    /// Create a new quota usage repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert zero-initialized rows for any of `resources` the project does
    /// not have yet.
    pub async fn ensure_rows(
        conn: &mut PgConnection,
        project_id: &str,
        resources: &[String],
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO quota_usages (id, project_id, resource) \
             SELECT gen_random_uuid(), $1, r FROM UNNEST($2::text[]) AS r \
             ON CONFLICT (project_id, resource) DO NOTHING",
        )
        .bind(project_id)
        .bind(resources)
        .execute(conn)
        .await
        .map_err(|e| db_error("Failed to create usage rows", e))?;
        Ok(())
    }

    /// Lock a project's rows for `resources`, in resource order.
    pub async fn lock_rows(
        conn: &mut PgConnection,
        project_id: &str,
        resources: &[String],
    ) -> AppResult<Vec<ResourceUsage>> {
        sqlx::query_as::<_, ResourceUsage>(
            "SELECT * FROM quota_usages WHERE project_id = $1 AND resource = ANY($2) \
             ORDER BY resource ASC FOR UPDATE",
        )
        .bind(project_id)
        .bind(resources)
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("Failed to lock usage rows", e))
    }

    /// Lock rows by ID, in ID order.
    pub async fn lock_by_ids(
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> AppResult<Vec<ResourceUsage>> {
        sqlx::query_as::<_, ResourceUsage>(
            "SELECT * FROM quota_usages WHERE id = ANY($1) ORDER BY id ASC FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("Failed to lock usage rows by id", e))
    }

    /// Persist the counters of a locked row.
    pub async fn save(conn: &mut PgConnection, usage: &ResourceUsage) -> AppResult<()> {
        sqlx::query(
            "UPDATE quota_usages SET in_use = $2, reserved = $3, until_refresh = $4, \
             updated_at = $5 WHERE id = $1",
        )
        .bind(usage.id)
        .bind(usage.in_use)
        .bind(usage.reserved)
        .bind(usage.until_refresh)
        .bind(usage.updated_at)
        .execute(conn)
        .await
        .map_err(|e| db_error("Failed to save usage row", e))?;
        Ok(())
    }

    /// All usage rows of a project.
    pub async fn find_by_project(&self, project_id: &str) -> AppResult<Vec<ResourceUsage>> {
        sqlx::query_as::<_, ResourceUsage>(
            "SELECT * FROM quota_usages WHERE project_id = $1 ORDER BY resource ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list usage rows", e))
    }

    /// Start a transaction on the underlying pool.
    pub async fn begin(&self) -> AppResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))
    }
}
