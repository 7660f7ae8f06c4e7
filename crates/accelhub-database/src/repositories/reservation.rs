//! Quota reservation repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use accelhub_core::result::AppResult;
use accelhub_core::types::ReservationId;
use accelhub_entity::quota::{Reservation, ReservationStatus};

use crate::error::db_error;

/// Repository for reservation records.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: PgPool,
}

impl ReservationRepository {
    /// Create a new reservation repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert newly admitted reservations.
    pub async fn insert(conn: &mut PgConnection, reservations: &[Reservation]) -> AppResult<()> {
        for r in reservations {
            sqlx::query(
                "INSERT INTO reservations (id, usage_id, project_id, resource, delta, status, \
                 expire_at, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(r.id)
            .bind(r.usage_id)
            .bind(&r.project_id)
            .bind(&r.resource)
            .bind(r.delta)
            .bind(r.status)
            .bind(r.expire_at)
            .bind(r.created_at)
            .bind(r.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("Failed to insert reservation", e))?;
        }
        Ok(())
    }

    /// IDs among `ids` that exist, in any status.
    pub async fn find_existing_ids(
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> AppResult<Vec<ReservationId>> {
        sqlx::query_scalar::<_, ReservationId>("SELECT id FROM reservations WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(conn)
            .await
            .map_err(|e| db_error("Failed to look up reservations", e))
    }

    /// Lock the still-pending reservations among `ids`, in ID order.
    pub async fn lock_pending(
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE id = ANY($1) AND status = 'pending' \
             ORDER BY id ASC FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| db_error("Failed to lock pending reservations", e))
    }

    /// Move locked pending reservations to a terminal status.
    pub async fn transition(
        conn: &mut PgConnection,
        ids: &[Uuid],
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE reservations SET status = $2, updated_at = $3 \
             WHERE id = ANY($1) AND status = 'pending'",
        )
        .bind(ids)
        .bind(status)
        .bind(now)
        .execute(conn)
        .await
        .map_err(|e| db_error("Failed to update reservation status", e))?;
        Ok(result.rows_affected())
    }

    /// Find a reservation by ID.
    pub async fn find_by_id(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find reservation", e))
    }

    /// Pending reservations that expired before `now`, oldest first.
    pub async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<ReservationId>> {
        sqlx::query_scalar::<_, ReservationId>(
            "SELECT id FROM reservations WHERE status = 'pending' AND expire_at < $1 \
             ORDER BY expire_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find expired reservations", e))
    }

    /// Delete settled reservations last updated before `before`.
    pub async fn purge_settled(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM reservations WHERE status <> 'pending' AND updated_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to purge settled reservations", e))?;
        Ok(result.rows_affected())
    }

    /// Start a transaction on the underlying pool.
    pub async fn begin(&self) -> AppResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))
    }
}
