#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;

mod cli;
mod config;
mod db;
mod monitor;
mod utils;
mod web;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::monitor::MonitorService;
use crate::web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(
        Config::load(cli.config.as_deref()).context("failed to load configuration")?,
    );
    utils::logging::init_tracing(&config.logging);

    info!("Starting OLX Database API...");

    let db_manager = db::DatabaseManager::new(&config.database)
        .await
        .context("failed to connect to the database")?;
    db_manager
        .migrate()
        .await
        .context("failed to create database tables")?;
    info!("Database initialized");

    let monitor = Arc::new(MonitorService::new(&db_manager, config.monitor.clone()));

    match cli.command() {
        Command::Serve => {
            WebServer::new(config.clone(), monitor).start().await?;
        }
        Command::Migrate => {
            info!("migrations applied");
        }
        Command::Cleanup { days } => {
            let report = monitor
                .cleanup_items_older_than(days, Utc::now())
                .await
                .context("cleanup failed")?;
            info!(
                "deleted {} items older than {} days",
                report.deleted.len(),
                report.days
            );
        }
    }

    info!("Shutting down OLX Database API...");
    Ok(())
}
