//! Deployable repository implementation.

use sqlx::PgPool;

use accelhub_core::result::AppResult;
use accelhub_core::types::{AcceleratorId, DeployableId};
use accelhub_entity::deployable::{CreateDeployable, Deployable, UpdateDeployable};

use crate::error::db_error;

/// Repository for deployable CRUD operations.
#[derive(Debug, Clone)]
pub struct DeployableRepository {
    pool: PgPool,
}

impl DeployableRepository {
    /// Create a new deployable repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a deployable by ID.
    pub async fn find_by_id(&self, id: DeployableId) -> AppResult<Option<Deployable>> {
        sqlx::query_as::<_, Deployable>("SELECT * FROM deployables WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find deployable", e))
    }

    /// List the deployables installed in a host.
    pub async fn find_by_host(&self, host: &str) -> AppResult<Vec<Deployable>> {
        sqlx::query_as::<_, Deployable>(
            "SELECT * FROM deployables WHERE host = $1 ORDER BY pcie_address ASC",
        )
        .bind(host)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list deployables by host", e))
    }

    /// List every deployable.
    pub async fn find_all(&self) -> AppResult<Vec<Deployable>> {
        sqlx::query_as::<_, Deployable>("SELECT * FROM deployables ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list deployables", e))
    }

    /// List the deployables of one accelerator.
    pub async fn find_by_accelerator(
        &self,
        accelerator_id: AcceleratorId,
    ) -> AppResult<Vec<Deployable>> {
        sqlx::query_as::<_, Deployable>(
            "SELECT * FROM deployables WHERE accelerator_id = $1 ORDER BY created_at ASC",
        )
        .bind(accelerator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list deployables by accelerator", e))
    }

    /// Create a new deployable.
    pub async fn create(&self, data: &CreateDeployable) -> AppResult<Deployable> {
        sqlx::query_as::<_, Deployable>(
            "INSERT INTO deployables (id, name, parent_id, root_id, pcie_address, host, board, \
             vendor, version, deployable_type, assignable, availability, accelerator_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
        )
        .bind(DeployableId::new())
        .bind(&data.name)
        .bind(data.parent_id)
        .bind(data.root_id)
        .bind(&data.pcie_address)
        .bind(&data.host)
        .bind(&data.board)
        .bind(&data.vendor)
        .bind(&data.version)
        .bind(&data.deployable_type)
        .bind(data.assignable)
        .bind(&data.availability)
        .bind(data.accelerator_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create deployable", e))
    }

    /// Apply a partial update. Returns `None` if the deployable does not exist.
    pub async fn update(
        &self,
        id: DeployableId,
        data: &UpdateDeployable,
    ) -> AppResult<Option<Deployable>> {
        sqlx::query_as::<_, Deployable>(
            "UPDATE deployables SET \
                name = COALESCE($2, name), \
                version = COALESCE($3, version), \
                assignable = COALESCE($4, assignable), \
                instance_id = CASE WHEN $5 THEN $6 ELSE instance_id END, \
                availability = COALESCE($7, availability), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.version)
        .bind(data.assignable)
        .bind(data.instance_id.is_some())
        .bind(data.instance_id.flatten())
        .bind(&data.availability)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update deployable", e))
    }

    /// Delete a deployable. Its attributes are removed by cascade.
    pub async fn delete(&self, id: DeployableId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM deployables WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete deployable", e))?;
        Ok(result.rows_affected() > 0)
    }
}
