//! Accelerator repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use accelhub_core::result::AppResult;
use accelhub_core::traits::UsageSource;
use accelhub_core::types::AcceleratorId;
use accelhub_entity::accelerator::{Accelerator, CreateAccelerator, UpdateAccelerator};

use crate::error::db_error;

/// Quota resource counting every accelerator of a project.
pub const RESOURCE_ACCELERATORS: &str = "accelerators";
/// Quota resource counting a project's deployables bound to an instance.
pub const RESOURCE_DEPLOYABLES: &str = "deployables";

/// Repository for accelerator CRUD operations.
///
/// Also the authoritative usage source for quota refreshes: any resource
/// name other than [`RESOURCE_ACCELERATORS`] and [`RESOURCE_DEPLOYABLES`]
/// counts the project's accelerators of that `device_type`.
#[derive(Debug, Clone)]
pub struct AcceleratorRepository {
    pool: PgPool,
}

impl AcceleratorRepository {
    /// Create a new accelerator repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an accelerator by ID.
    pub async fn find_by_id(&self, id: AcceleratorId) -> AppResult<Option<Accelerator>> {
        sqlx::query_as::<_, Accelerator>("SELECT * FROM accelerators WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find accelerator", e))
    }

    /// List accelerators, optionally restricted to one project.
    pub async fn find_all(&self, project_id: Option<&str>) -> AppResult<Vec<Accelerator>> {
        sqlx::query_as::<_, Accelerator>(
            "SELECT * FROM accelerators WHERE ($1::text IS NULL OR project_id = $1) \
             ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list accelerators", e))
    }

    /// Create a new accelerator.
    pub async fn create(&self, data: &CreateAccelerator) -> AppResult<Accelerator> {
        sqlx::query_as::<_, Accelerator>(
            "INSERT INTO accelerators (id, name, description, project_id, user_id, device_type, \
             acc_type, acc_capability, vendor_id, product_id, remotable) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(AcceleratorId::new())
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.project_id)
        .bind(&data.user_id)
        .bind(&data.device_type)
        .bind(&data.acc_type)
        .bind(&data.acc_capability)
        .bind(&data.vendor_id)
        .bind(&data.product_id)
        .bind(data.remotable)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create accelerator", e))
    }

    /// Apply a partial update. Returns `None` if the accelerator does not exist.
    pub async fn update(
        &self,
        id: AcceleratorId,
        data: &UpdateAccelerator,
    ) -> AppResult<Option<Accelerator>> {
        sqlx::query_as::<_, Accelerator>(
            "UPDATE accelerators SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                acc_type = COALESCE($4, acc_type), \
                acc_capability = COALESCE($5, acc_capability), \
                remotable = COALESCE($6, remotable), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.acc_type)
        .bind(&data.acc_capability)
        .bind(data.remotable)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update accelerator", e))
    }

    /// Delete an accelerator. Its deployables are removed by cascade.
    pub async fn delete(&self, id: AcceleratorId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM accelerators WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete accelerator", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Count all accelerators of a project.
    pub async fn count_by_project(&self, project_id: &str) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accelerators WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count accelerators", e))
    }

    /// Count a project's accelerators of one device type.
    pub async fn count_by_project_and_type(
        &self,
        project_id: &str,
        device_type: &str,
    ) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM accelerators WHERE project_id = $1 AND device_type = $2",
        )
        .bind(project_id)
        .bind(device_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count accelerators by type", e))
    }

    /// Count the deployables of a project's accelerators that are bound to
    /// an instance.
    pub async fn count_allocated_deployables(&self, project_id: &str) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM deployables d \
             JOIN accelerators a ON a.id = d.accelerator_id \
             WHERE a.project_id = $1 AND d.instance_id IS NOT NULL",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count allocated deployables", e))
    }
}

#[async_trait]
impl UsageSource for AcceleratorRepository {
    async fn count_in_use(&self, project_id: &str, resource: &str) -> AppResult<i64> {
        match resource {
            RESOURCE_ACCELERATORS => self.count_by_project(project_id).await,
            RESOURCE_DEPLOYABLES => self.count_allocated_deployables(project_id).await,
            device_type => self.count_by_project_and_type(project_id, device_type).await,
        }
    }
}
