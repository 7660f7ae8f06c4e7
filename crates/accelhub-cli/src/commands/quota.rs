//! Quota usage and limit CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use accelhub_core::error::AppError;
use accelhub_core::traits::QuotaLimitProvider;
use accelhub_core::types::QuotaLimit;
use accelhub_entity::quota::ResourceUsage;

/// Arguments for quota commands
#[derive(Debug, Args)]
pub struct QuotaArgs {
    /// Quota subcommand
    #[command(subcommand)]
    pub command: QuotaCommand,
}

/// Quota subcommands
#[derive(Debug, Subcommand)]
pub enum QuotaCommand {
    /// Show usage rows and effective limits of a project
    Usage {
        /// Project ID
        project: String,
    },
    /// Recompute in-use of a resource from the inventory
    Refresh {
        /// Project ID
        project: String,
        /// Resource name
        resource: String,
    },
    /// Set a per-project hard limit (negative means unlimited)
    SetLimit {
        /// Project ID
        project: String,
        /// Resource name
        resource: String,
        /// Hard limit
        #[arg(allow_negative_numbers = true)]
        limit: i64,
    },
    /// Remove a per-project hard limit
    RemoveLimit {
        /// Project ID
        project: String,
        /// Resource name
        resource: String,
    },
}

/// Usage display row for table output
#[derive(Debug, Serialize, Tabled)]
struct UsageRow {
    /// Resource
    resource: String,
    /// In use
    in_use: i64,
    /// Reserved
    reserved: i64,
    /// Limit
    limit: String,
    /// Until refresh
    until_refresh: String,
    /// Refreshed at
    refreshed_at: String,
}

impl UsageRow {
    fn new(usage: &ResourceUsage, limit: Option<QuotaLimit>) -> Self {
        Self {
            resource: usage.resource.clone(),
            in_use: usage.in_use,
            reserved: usage.reserved,
            limit: limit.map_or_else(|| "-".to_string(), |l| l.to_string()),
            until_refresh: usage
                .until_refresh
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
            refreshed_at: usage.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Execute quota commands
pub async fn execute(
    args: &QuotaArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let pool = super::create_db_pool(&config).await?;
    let limiter = super::create_limiter(&config, pool.clone());

    match &args.command {
        QuotaCommand::Usage { project } => {
            let engine = super::create_engine(&config, pool);
            let usages = engine.project_usage(project).await?;

            let mut rows = Vec::with_capacity(usages.len());
            for usage in &usages {
                let limit = limiter.limit_for(project, &usage.resource).await?;
                rows.push(UsageRow::new(usage, limit));
            }

            output::print_list(&rows, format);
        }
        QuotaCommand::Refresh { project, resource } => {
            let engine = super::create_engine(&config, pool);
            let usage = engine.refresh_usage(project, resource).await?;

            output::print_success(&format!("Usage of '{}' refreshed", resource));
            output::print_kv("In use", &usage.in_use.to_string());
            output::print_kv("Reserved", &usage.reserved.to_string());
        }
        QuotaCommand::SetLimit {
            project,
            resource,
            limit,
        } => {
            if limiter.default_limit(resource).is_none() {
                output::print_warning(&format!(
                    "'{}' has no configured default; reservations will use this override only",
                    resource
                ));
            }

            limiter.set_project_limit(project, resource, *limit).await?;

            output::print_success(&format!(
                "Limit of '{}' for project '{}' set to {}",
                resource,
                project,
                QuotaLimit::from(*limit)
            ));
        }
        QuotaCommand::RemoveLimit { project, resource } => {
            if limiter.remove_project_limit(project, resource).await? {
                output::print_success(&format!(
                    "Limit override of '{}' for project '{}' removed",
                    resource, project
                ));
            } else {
                output::print_warning("No override was set");
            }
        }
    }

    Ok(())
}
