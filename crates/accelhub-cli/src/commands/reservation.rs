//! Reservation inspection and settlement CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use accelhub_core::error::AppError;
use accelhub_core::types::ReservationId;
use accelhub_entity::quota::Reservation;

/// Arguments for reservation commands
#[derive(Debug, Args)]
pub struct ReservationArgs {
    /// Reservation subcommand
    #[command(subcommand)]
    pub command: ReservationCommand,
}

/// Reservation subcommands
#[derive(Debug, Subcommand)]
pub enum ReservationCommand {
    /// Show a reservation
    Show {
        /// Reservation ID
        id: ReservationId,
    },
    /// Commit pending reservations
    Commit {
        /// Reservation IDs
        #[arg(required = true)]
        ids: Vec<ReservationId>,
    },
    /// Roll back pending reservations
    Rollback {
        /// Reservation IDs
        #[arg(required = true)]
        ids: Vec<ReservationId>,
    },
    /// Roll back every expired pending reservation now
    Sweep,
    /// Delete settled reservations past the retention period
    Purge {
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

/// Reservation display row
#[derive(Debug, Serialize, Tabled)]
struct ReservationRow {
    /// Reservation ID
    id: String,
    /// Project
    project_id: String,
    /// Resource
    resource: String,
    /// Delta
    delta: i64,
    /// Status
    status: String,
    /// Expires
    expire_at: String,
    /// Updated
    updated_at: String,
}

impl From<&Reservation> for ReservationRow {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            project_id: r.project_id.clone(),
            resource: r.resource.clone(),
            delta: r.delta,
            status: r.status.to_string(),
            expire_at: r.expire_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: r.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Execute reservation commands
pub async fn execute(
    args: &ReservationArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let pool = super::create_db_pool(&config).await?;
    let engine = super::create_engine(&config, pool);

    match &args.command {
        ReservationCommand::Show { id } => {
            let reservation = engine
                .reservation(*id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Reservation {} not found", id)))?;

            output::print_item(&ReservationRow::from(&reservation), format);
        }
        ReservationCommand::Commit { ids } => {
            let settled = engine.commit(ids).await?;
            report_settled("committed", settled, ids.len());
        }
        ReservationCommand::Rollback { ids } => {
            let settled = engine.rollback(ids).await?;
            report_settled("rolled back", settled, ids.len());
        }
        ReservationCommand::Sweep => {
            let reclaimed = engine.sweep_expired().await?;
            output::print_success(&format!("Rolled back {} expired reservations", reclaimed));
        }
        ReservationCommand::Purge { force } => {
            let prompt = format!(
                "Delete settled reservations older than {} days?",
                config.quota.reservation_retention_days
            );
            if !output::confirm(&prompt, *force)? {
                return Ok(());
            }

            let purged = engine.purge_settled().await?;
            output::print_success(&format!("Purged {} settled reservations", purged));
        }
    }

    Ok(())
}

fn report_settled(action: &str, settled: usize, requested: usize) {
    output::print_success(&format!("{} of {} reservations {}", settled, requested, action));
    if settled < requested {
        output::print_warning("The rest were already settled");
    }
}
