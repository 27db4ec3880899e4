// dbsnapshot/src/backup/db_dump.rs
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::errors::{BackupError, Result};
use crate::utils::find_executable;

/// Dumps the whole database with `pg_dump` into `destination`.
pub fn create_sql_backup(database_url: &str, destination: &Path) -> Result<PathBuf> {
    let pg_dump_path = find_executable("pg_dump").map_err(|e| BackupError::Export(format!("{:#}", e)))?;
    info!("Found pg_dump executable at: {}", pg_dump_path.display());
    run_dump(&pg_dump_path, database_url, destination)
}

/// Runs `program <database_url>` with stdout going to `destination` and stderr inherited,
/// then checks that something was written.
pub fn run_dump(program: &Path, database_url: &str, destination: &Path) -> Result<PathBuf> {
    info!("📊 Creating SQL backup: {}", destination.display());

    let output_file = File::create(destination).map_err(|e| {
        BackupError::Export(format!(
            "Failed to create SQL backup file {}: {}",
            destination.display(),
            e
        ))
    })?;

    let status = Command::new(program)
        .arg(database_url)
        .stdout(Stdio::from(output_file))
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| {
            BackupError::Export(format!("Failed to execute {}: {}", program.display(), e))
        })?;

    if !status.success() {
        return Err(BackupError::Export(format!(
            "{} exited with status: {}",
            program.display(),
            status
        )));
    }

    match fs::metadata(destination) {
        Ok(metadata) if metadata.len() > 0 => {
            info!(
                "✓ SQL backup written ({:.2} KB)",
                metadata.len() as f64 / 1024.0
            );
            Ok(destination.to_path_buf())
        }
        _ => Err(BackupError::EmptyBackup(destination.to_path_buf())),
    }
}
