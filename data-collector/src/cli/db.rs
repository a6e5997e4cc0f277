//! Database management commands

use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use crate::config::Settings;
use crate::storage::MetricsRepository;

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Create or upgrade the metrics and run-ledger tables
    Migrate,
}

/// Execute database commands
pub async fn execute(cmd: DbCommands) -> Result<()> {
    match cmd {
        DbCommands::Migrate => execute_migrate().await,
    }
}

async fn execute_migrate() -> Result<()> {
    let settings = Settings::load()?;
    let repository = MetricsRepository::from_settings(&settings.database).await?;

    repository.migrate().await?;

    info!("Migrations completed");
    Ok(())
}
