//! Reservation expiry sweep and retention purge job handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use accelhub_quota::{QuotaEngine, QuotaError};

use crate::executor::{JobExecutionError, JobHandler, JobRun};

/// Job type of the expiry sweep
pub const RESERVATION_EXPIRY: &str = "reservation_expiry";
/// Job type of the retention purge
pub const RESERVATION_PURGE: &str = "reservation_purge";

fn classify(err: QuotaError) -> JobExecutionError {
    if err.is_transient() {
        JobExecutionError::Transient(err.to_string())
    } else {
        JobExecutionError::Internal(err.into())
    }
}

/// Rolls back pending reservations whose expiry has passed
#[derive(Debug)]
pub struct ReservationExpiryJobHandler {
    /// Quota engine
    engine: Arc<QuotaEngine>,
}

impl ReservationExpiryJobHandler {
    /// Create a new expiry sweep handler
    pub fn new(engine: Arc<QuotaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for ReservationExpiryJobHandler {
    fn job_type(&self) -> &str {
        RESERVATION_EXPIRY
    }

    async fn execute(&self, run: &JobRun) -> Result<Option<Value>, JobExecutionError> {
        tracing::debug!("Running reservation expiry sweep");

        let reclaimed = self
            .engine
            .sweep_expired_at(run.triggered_at)
            .await
            .map_err(classify)?;

        Ok(Some(serde_json::json!({
            "task": RESERVATION_EXPIRY,
            "reservations_reclaimed": reclaimed,
        })))
    }
}

/// Deletes settled reservations older than the retention period
#[derive(Debug)]
pub struct ReservationPurgeJobHandler {
    /// Quota engine
    engine: Arc<QuotaEngine>,
}

impl ReservationPurgeJobHandler {
    /// Create a new retention purge handler
    pub fn new(engine: Arc<QuotaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for ReservationPurgeJobHandler {
    fn job_type(&self) -> &str {
        RESERVATION_PURGE
    }

    async fn execute(&self, _run: &JobRun) -> Result<Option<Value>, JobExecutionError> {
        tracing::debug!("Running settled reservation purge");

        let purged = self.engine.purge_settled().await.map_err(classify)?;

        Ok(Some(serde_json::json!({
            "task": RESERVATION_PURGE,
            "reservations_purged": purged,
            "retention_days": self.engine.config().reservation_retention_days,
        })))
    }
}
