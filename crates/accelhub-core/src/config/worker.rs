//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Scheduled maintenance job configuration.
///
/// Cron expressions use the six-field format (seconds first) understood by
/// `tokio-cron-scheduler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether scheduled jobs run in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Schedule for the expired-reservation sweep.
    #[serde(default = "default_expiry_sweep_cron")]
    pub expiry_sweep_cron: String,
    /// Schedule for purging settled reservations past retention.
    #[serde(default = "default_retention_purge_cron")]
    pub retention_purge_cron: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            expiry_sweep_cron: default_expiry_sweep_cron(),
            retention_purge_cron: default_retention_purge_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_expiry_sweep_cron() -> String {
    "0 * * * * *".to_string()
}

fn default_retention_purge_cron() -> String {
    "0 30 3 * * *".to_string()
}
