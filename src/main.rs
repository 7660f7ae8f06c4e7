//! AccelHub Conductor: quota reservation service process.
//!
//! Wires configuration, the database, the quota engine and the scheduled
//! maintenance jobs together, then runs until a shutdown signal arrives.

use std::sync::Arc;

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use accelhub_core::config::AppConfig;
use accelhub_core::error::AppError;
use accelhub_database::DatabasePool;
use accelhub_database::repositories::AcceleratorRepository;
use accelhub_quota::{LimitOverrides, QuotaEngine, QuotaLimiter, QuotaStoreDispatch, UsageRefresher};
use accelhub_worker::{
    CronScheduler, JobExecutor, ReservationExpiryJobHandler, ReservationPurgeJobHandler,
};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Conductor error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("ACCELHUB_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

    AppConfig::load(&config_path)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main conductor run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting AccelHub Conductor v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let database = DatabasePool::connect(&config.database).await?;
    database.health_check().await?;
    let db_pool = database.pool().clone();

    tracing::info!("Running database migrations...");
    accelhub_database::migration::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // ── Step 2: Quota engine ─────────────────────────────────────
    tracing::info!(
        "Initializing quota engine (backend: {})...",
        config.quota.backend
    );
    let usage_source = Arc::new(AcceleratorRepository::new(db_pool.clone()));
    let refresher = UsageRefresher::new(usage_source);
    let store = QuotaStoreDispatch::new(&config.quota, db_pool.clone(), refresher);
    let limiter = QuotaLimiter::new(
        LimitOverrides::for_backend(config.quota.backend, db_pool.clone()),
        &config.quota,
    );
    let engine = Arc::new(QuotaEngine::new(
        Arc::new(store),
        Arc::new(limiter),
        config.quota.clone(),
    ));
    tracing::info!(
        "Quota engine ready ({} registered resources)",
        config.quota.limits.len()
    );

    // ── Step 3: Scheduled maintenance ────────────────────────────
    let mut scheduler = if config.worker.enabled {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(ReservationExpiryJobHandler::new(Arc::clone(&engine))));
        executor.register(Arc::new(ReservationPurgeJobHandler::new(Arc::clone(&engine))));

        let scheduler = CronScheduler::new(Arc::new(executor)).await?;
        scheduler.register_default_tasks(&config.worker).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Scheduled maintenance disabled");
        None
    };

    tracing::info!("AccelHub Conductor running");

    // ── Step 4: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }
    database.close().await;

    tracing::info!("AccelHub Conductor shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
