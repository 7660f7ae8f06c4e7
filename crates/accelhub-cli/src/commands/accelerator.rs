//! Accelerator CLI commands. Creation and deletion run under a quota
//! reservation covering the accelerator count and its device type.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use accelhub_core::error::AppError;
use accelhub_core::types::AcceleratorId;
use accelhub_database::repositories::AcceleratorRepository;
use accelhub_database::repositories::accelerator::RESOURCE_ACCELERATORS;
use accelhub_entity::accelerator::{Accelerator, CreateAccelerator};
use accelhub_quota::ReserveRequest;

/// Arguments for accelerator commands
#[derive(Debug, Args)]
pub struct AcceleratorArgs {
    /// Accelerator subcommand
    #[command(subcommand)]
    pub command: AcceleratorCommand,
}

/// Accelerator subcommands
#[derive(Debug, Subcommand)]
pub enum AcceleratorCommand {
    /// List accelerators
    List {
        /// Filter by project
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Create an accelerator, reserving quota for it first
    Create {
        /// Owning project
        #[arg(long)]
        project: String,
        /// Accelerator name
        #[arg(long)]
        name: String,
        /// Device type (also the quota resource name)
        #[arg(long)]
        device_type: String,
        /// Description
        #[arg(long)]
        description: Option<String>,
        /// Vendor-specific accelerator type
        #[arg(long)]
        acc_type: Option<String>,
        /// PCI vendor id
        #[arg(long)]
        vendor_id: Option<String>,
        /// PCI product id
        #[arg(long)]
        product_id: Option<String>,
    },
    /// Delete an accelerator and release its quota
    Delete {
        /// Accelerator ID
        id: AcceleratorId,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

/// Accelerator display row
#[derive(Debug, Serialize, Tabled)]
struct AcceleratorRow {
    /// Accelerator ID
    id: String,
    /// Name
    name: String,
    /// Project
    project_id: String,
    /// Device type
    device_type: String,
    /// Created at
    created_at: String,
}

impl From<&Accelerator> for AcceleratorRow {
    fn from(a: &Accelerator) -> Self {
        Self {
            id: super::short_id(a.id),
            name: a.name.clone(),
            project_id: a.project_id.clone(),
            device_type: a.device_type.clone(),
            created_at: a.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Execute accelerator commands
pub async fn execute(
    args: &AcceleratorArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let pool = super::create_db_pool(&config).await?;
    let repo = AcceleratorRepository::new(pool.clone());

    match &args.command {
        AcceleratorCommand::List { project } => {
            let accelerators = repo.find_all(project.as_deref()).await?;
            let rows: Vec<AcceleratorRow> = accelerators.iter().map(AcceleratorRow::from).collect();
            output::print_list(&rows, format);
        }
        AcceleratorCommand::Create {
            project,
            name,
            device_type,
            description,
            acc_type,
            vendor_id,
            product_id,
        } => {
            let engine = super::create_engine(&config, pool);
            let data = CreateAccelerator {
                name: name.clone(),
                description: description.clone(),
                project_id: project.clone(),
                user_id: None,
                device_type: device_type.clone(),
                acc_type: acc_type.clone(),
                acc_capability: None,
                vendor_id: vendor_id.clone(),
                product_id: product_id.clone(),
                remotable: 0,
            };

            let request = ReserveRequest::new(project.as_str())
                .delta(RESOURCE_ACCELERATORS, 1)
                .delta(device_type.as_str(), 1);
            let accelerator = engine
                .run_reserved(request, || repo.create(&data))
                .await?;

            output::print_success(&format!("Accelerator '{}' created", accelerator.name));
            output::print_item(&AcceleratorRow::from(&accelerator), format);
        }
        AcceleratorCommand::Delete { id, force } => {
            let accelerator = repo
                .find_by_id(*id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Accelerator {} not found", id)))?;

            let prompt = format!("Delete accelerator '{}'?", accelerator.name);
            if !output::confirm(&prompt, *force)? {
                return Ok(());
            }

            let engine = super::create_engine(&config, pool);
            let request = ReserveRequest::new(accelerator.project_id.as_str())
                .delta(RESOURCE_ACCELERATORS, -1)
                .delta(accelerator.device_type.as_str(), -1);
            engine
                .run_reserved(request, || async {
                    if repo.delete(*id).await? {
                        Ok(())
                    } else {
                        Err(AppError::not_found(format!("Accelerator {} not found", id)))
                    }
                })
                .await?;

            output::print_success(&format!("Accelerator '{}' deleted", accelerator.name));
        }
    }

    Ok(())
}
