//! Command-line interface
//!
//! Provides CLI commands for the data collector.

pub mod backfill;
pub mod db;

use clap::{Parser, Subcommand};

/// Data Collector CLI
#[derive(Parser)]
#[command(name = "data-collector")]
#[command(about = "Historical metrics backfill across external data providers")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Backfill metrics from one or all sources
    #[command(subcommand)]
    Backfill(backfill::BackfillCommands),
    /// Database operations
    #[command(subcommand)]
    Db(db::DbCommands),
}
