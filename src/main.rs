//! Database backup tool
//!
//! Dumps a PostgreSQL database with pg_dump, exports a JSON snapshot of its tables,
//! zips both, optionally replicates the zip to cloud storage and prunes old archives.

// dbsnapshot/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use backup::{BackupSummary, ReplicationStatus};
use config::load_backup_config;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = utils::logger::init_logger() {
        eprintln!("⚠️ Logging disabled: {:#}", e);
    }

    match run_app().await {
        Ok(summary) => {
            if let ReplicationStatus::Uploaded(destination) = &summary.replication {
                println!("☁️ Backup {} uploaded to {}", summary.run.id(), destination);
            }
            let removed = summary.sweep.deleted().count();
            if removed > 0 {
                println!("🧹 Removed {} old backup(s)", removed);
            }
            println!(
                "✅ Backup completed successfully: {}",
                summary.archive_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<BackupSummary> {
    dotenv::dotenv().ok();

    // Optional path to config.json as the first argument
    let config_path = env::args().nth(1).map(PathBuf::from);
    let backup_config = load_backup_config(config_path.as_deref(), |key| env::var(key).ok())
        .context("Failed to load backup configuration")?;

    backup::run_backup_flow(&backup_config)
        .await
        .context("Backup process failed")
}
