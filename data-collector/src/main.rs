//! Data Collector CLI
//!
//! - `backfill run`: backfill one source
//! - `backfill run-all`: backfill every enabled source
//! - `db migrate`: create or upgrade the store schema

use anyhow::{anyhow, Result};
use clap::Parser;
use collector_common::logging::{init_logging, LogConfig};

use data_collector::cli::{backfill, db, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    init_logging(
        LogConfig::from_env()
            .with_app_name("data-collector")
            .with_verbosity(cli.verbose),
    )
    .map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let code = match cli.command {
        Commands::Backfill(cmd) => backfill::execute(cmd).await?,
        Commands::Db(cmd) => {
            db::execute(cmd).await?;
            0
        }
    };

    std::process::exit(code);
}
