mod logic;
pub(crate) mod archive;
pub(crate) mod cloud_upload;
pub(crate) mod db_dump;
pub(crate) mod json_export;
pub(crate) mod retention;
pub(crate) mod run;

use anyhow::{Context, Result};
use std::fs;

use crate::config::BackupConfig;

pub use logic::{BackupSummary, ReplicationStatus};

/// Public entry point for the backup process.
pub async fn run_backup_flow(config: &BackupConfig) -> Result<BackupSummary> {
    fs::create_dir_all(&config.backup_dir).with_context(|| {
        format!(
            "Failed to create backup directory: {}",
            config.backup_dir.display()
        )
    })?;

    Ok(logic::perform_backup_orchestration(config).await?)
}
