//! Quota engine configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::quota_limit::QuotaLimit;

/// Storage backend holding usage rows and reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    /// PostgreSQL tables with row-level locking (multi-node).
    #[default]
    Postgres,
    /// Process-local arena guarded by per-project mutexes (single node).
    Memory,
}

impl fmt::Display for QuotaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Quota reservation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Backend for usage and reservation state.
    #[serde(default)]
    pub backend: QuotaBackend,
    /// Default lifetime of a pending reservation, in seconds.
    #[serde(default = "default_reservation_expire")]
    pub reservation_expire_seconds: i64,
    /// Number of reservations admitted against a usage row before its
    /// `in_use` is recomputed. `0` recomputes on every reservation.
    #[serde(default)]
    pub until_refresh: u32,
    /// Maximum age of a usage row, in seconds, before it is recomputed.
    /// `0` disables the age check.
    #[serde(default)]
    pub max_age_seconds: u64,
    /// Attempts made after a transient storage failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff between retries, in milliseconds. Doubles per attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Upper bound for the retry backoff, in milliseconds.
    #[serde(default = "default_retry_backoff_max")]
    pub retry_backoff_max_ms: u64,
    /// Maximum number of expired reservations reclaimed per sweep pass.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: i64,
    /// Days a committed or rolled-back reservation is kept for audit.
    #[serde(default = "default_retention_days")]
    pub reservation_retention_days: i64,
    /// Default hard limit per resource name. Negative means unlimited.
    #[serde(default)]
    pub limits: BTreeMap<String, i64>,
}

impl QuotaConfig {
    /// Default limit for a resource, or `None` if the resource is not
    /// registered.
    pub fn default_limit(&self, resource: &str) -> Option<QuotaLimit> {
        self.limits.get(resource).copied().map(QuotaLimit::from)
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            backend: QuotaBackend::default(),
            reservation_expire_seconds: default_reservation_expire(),
            until_refresh: 0,
            max_age_seconds: 0,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            retry_backoff_max_ms: default_retry_backoff_max(),
            sweep_batch_size: default_sweep_batch_size(),
            reservation_retention_days: default_retention_days(),
            limits: BTreeMap::new(),
        }
    }
}

fn default_reservation_expire() -> i64 {
    86_400
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_backoff() -> u64 {
    50
}

fn default_retry_backoff_max() -> u64 {
    2_000
}

fn default_sweep_batch_size() -> i64 {
    500
}

fn default_retention_days() -> i64 {
    30
}
