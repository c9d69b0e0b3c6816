use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "olx-database-api",
    version,
    about = "REST service storing OLX monitoring tasks and scraped items"
)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "OLX_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create missing tables and indexes, then exit
    Migrate,
    /// Delete items first seen more than DAYS days ago
    Cleanup {
        #[arg(long)]
        days: i64,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
