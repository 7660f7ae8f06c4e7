//! CLI command definitions and dispatch.

pub mod accelerator;
pub mod migrate;
pub mod quota;
pub mod reservation;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use accelhub_core::config::AppConfig;
use accelhub_core::error::AppError;
use accelhub_database::repositories::AcceleratorRepository;
use accelhub_quota::{
    LimitOverrides, QuotaEngine, QuotaLimiter, QuotaStoreDispatch, UsageRefresher,
};

/// AccelHub: accelerator inventory with two-phase quota reservations
#[derive(Debug, Parser)]
#[command(name = "accelhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Quota usage and limit management
    Quota(quota::QuotaArgs),
    /// Reservation inspection and settlement
    Reservation(reservation::ReservationArgs),
    /// Accelerator records, admitted through the quota engine
    Accelerator(accelerator::AcceleratorArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &self.config).await,
            Commands::Quota(args) => quota::execute(args, &self.config, self.format).await,
            Commands::Reservation(args) => {
                reservation::execute(args, &self.config, self.format).await
            }
            Commands::Accelerator(args) => {
                accelerator::execute(args, &self.config, self.format).await
            }
        }
    }
}

/// Helper: load configuration from file
pub async fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}

/// Helper: create database pool from config
pub async fn create_db_pool(config: &AppConfig) -> Result<sqlx::PgPool, AppError> {
    let pool = accelhub_database::DatabasePool::connect(&config.database).await?;
    Ok(pool.pool().clone())
}

/// Helper: limit resolver over the configured override store
pub fn create_limiter(config: &AppConfig, pool: sqlx::PgPool) -> QuotaLimiter {
    QuotaLimiter::new(
        LimitOverrides::for_backend(config.quota.backend, pool),
        &config.quota,
    )
}

/// Helper: quota engine wired to the configured backend
pub fn create_engine(config: &AppConfig, pool: sqlx::PgPool) -> QuotaEngine {
    let source = Arc::new(AcceleratorRepository::new(pool.clone()));
    let store = QuotaStoreDispatch::new(&config.quota, pool.clone(), UsageRefresher::new(source));
    let limiter = create_limiter(config, pool);
    QuotaEngine::new(Arc::new(store), Arc::new(limiter), config.quota.clone())
}

/// Helper: shorten an ID for table output
pub fn short_id(id: impl std::fmt::Display) -> String {
    id.to_string().chars().take(8).collect()
}
