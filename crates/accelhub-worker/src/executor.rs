//! Job executor: dispatches scheduled runs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing;
use uuid::Uuid;

use accelhub_core::error::AppError;

/// One triggered execution of a scheduled job
#[derive(Debug, Clone)]
pub struct JobRun {
    /// Unique id of this run, for correlating log lines
    pub id: Uuid,
    /// Job type being run
    pub job_type: String,
    /// When the scheduler fired
    pub triggered_at: DateTime<Utc>,
}

impl JobRun {
    /// Create a run of `job_type` triggered now
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            triggered_at: Utc::now(),
        }
    }
}

/// Trait for job handler implementations
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// Get the job type this handler processes
    fn job_type(&self) -> &str;

    /// Execute one run of the job
    async fn execute(&self, run: &JobRun) -> Result<Option<Value>, JobExecutionError>;
}

/// Error from job execution
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure, do not retry
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure; the next scheduled run may succeed
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Dispatches runs to the appropriate handler based on job_type
#[derive(Debug)]
pub struct JobExecutor {
    /// Registered job handlers by type
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create a new job executor
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a job handler
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        tracing::info!("Registered job handler for type '{}'", job_type);
        self.handlers.insert(job_type, handler);
    }

    /// Execute a run by dispatching to the correct handler
    pub async fn execute(&self, run: &JobRun) -> Result<Option<Value>, JobExecutionError> {
        let handler = self.handlers.get(&run.job_type).ok_or_else(|| {
            JobExecutionError::Permanent(format!(
                "No handler registered for job type '{}'",
                run.job_type
            ))
        })?;

        tracing::debug!("Executing job: id={}, type='{}'", run.id, run.job_type);

        handler.execute(run).await
    }

    /// Execute a run and log its outcome. Failures are never retried
    /// inline; the next scheduled run picks up where this one stopped.
    pub async fn run_and_log(&self, run: &JobRun) {
        match self.execute(run).await {
            Ok(Some(result)) => {
                tracing::info!("Job {} ('{}') completed: {}", run.id, run.job_type, result);
            }
            Ok(None) => {
                tracing::info!("Job {} ('{}') completed", run.id, run.job_type);
            }
            Err(JobExecutionError::Transient(msg)) => {
                tracing::warn!(
                    "Job {} ('{}') failed (transient), will run again on schedule: {}",
                    run.id,
                    run.job_type,
                    msg
                );
            }
            Err(JobExecutionError::Permanent(msg)) => {
                tracing::error!("Job {} ('{}') failed permanently: {}", run.id, run.job_type, msg);
            }
            Err(JobExecutionError::Internal(err)) => {
                tracing::error!("Job {} ('{}') internal error: {}", run.id, run.job_type, err);
            }
        }
    }

    /// Check if a handler is registered for a job type
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Get the list of registered job types
    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}
