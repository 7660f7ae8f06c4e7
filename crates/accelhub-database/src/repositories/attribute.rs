//! Deployable attribute repository implementation.

use sqlx::PgPool;

use accelhub_core::result::AppResult;
use accelhub_core::types::{AttributeId, DeployableId};
use accelhub_entity::attribute::{Attribute, CreateAttribute};

use crate::error::db_error;

/// Repository for deployable attribute CRUD operations.
#[derive(Debug, Clone)]
pub struct AttributeRepository {
    pool: PgPool,
}

impl AttributeRepository {
    /// Create a new attribute repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an attribute by ID.
    pub async fn find_by_id(&self, id: AttributeId) -> AppResult<Option<Attribute>> {
        sqlx::query_as::<_, Attribute>("SELECT * FROM attributes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find attribute", e))
    }

    /// List every attribute of a deployable.
    pub async fn find_by_deployable(&self, deployable_id: DeployableId) -> AppResult<Vec<Attribute>> {
        sqlx::query_as::<_, Attribute>(
            "SELECT * FROM attributes WHERE deployable_id = $1 ORDER BY key ASC",
        )
        .bind(deployable_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list deployable attributes", e))
    }

    /// List the attributes of a deployable with a given key.
    pub async fn find_by_key(
        &self,
        deployable_id: DeployableId,
        key: &str,
    ) -> AppResult<Vec<Attribute>> {
        sqlx::query_as::<_, Attribute>(
            "SELECT * FROM attributes WHERE deployable_id = $1 AND key = $2 \
             ORDER BY created_at ASC",
        )
        .bind(deployable_id)
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find attributes by key", e))
    }

    /// Create a new attribute.
    pub async fn create(&self, data: &CreateAttribute) -> AppResult<Attribute> {
        sqlx::query_as::<_, Attribute>(
            "INSERT INTO attributes (id, deployable_id, key, value) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(AttributeId::new())
        .bind(data.deployable_id)
        .bind(&data.key)
        .bind(&data.value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create attribute", e))
    }

    /// Replace the key and value of an attribute.
    pub async fn update(&self, id: AttributeId, key: &str, value: &str) -> AppResult<Option<Attribute>> {
        sqlx::query_as::<_, Attribute>(
            "UPDATE attributes SET key = $2, value = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update attribute", e))
    }

    /// Delete an attribute.
    pub async fn delete(&self, id: AttributeId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM attributes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete attribute", e))?;
        Ok(result.rows_affected() > 0)
    }
}
