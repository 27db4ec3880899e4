// dbsnapshot/src/backup/logic.rs
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::retention::{self, SweepReport};
use super::run::{archive_name_fragment, ArtifactKind, BackupRun};
use super::{archive, cloud_upload, db_dump, json_export};
use crate::config::BackupConfig;
use crate::errors::BackupError;
use crate::utils::databases::SNAPSHOT_TABLES;

/// Stages whose failure aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RelationalExport,
    StructuredSnapshot,
    Archive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RelationalExport => "SQL backup",
            Stage::StructuredSnapshot => "JSON backup",
            Stage::Archive => "Archive creation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: BackupError,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(BackupError) -> Self {
        move |source| StageFailure { stage, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationStatus {
    Skipped,
    Uploaded(String),
    Failed(String),
}

#[derive(Debug)]
pub struct BackupSummary {
    pub run: BackupRun,
    pub archive_path: PathBuf,
    pub replication: ReplicationStatus,
    pub sweep: SweepReport,
}

/// Runs export, snapshot and archive (each fatal), then replication (non-fatal) and the
/// retention sweep (always). Outputs of earlier stages are left in place on failure.
pub async fn perform_backup_orchestration(config: &BackupConfig) -> Result<BackupSummary, StageFailure> {
    let run = BackupRun::at(Utc::now());
    info!("🚀 Starting backup {} ({})", run.id(), run.started_at().to_rfc3339());

    let sql_path = export_stage(config, &run)?;
    let json_path = snapshot_stage(config, &run, SNAPSHOT_TABLES).await?;
    let archive_path = archive_stage(config, &run, &[sql_path, json_path])?;

    let replication = replicate_archive(config, &archive_path);
    let sweep = sweep_old_archives(config);

    Ok(BackupSummary {
        run,
        archive_path,
        replication,
        sweep,
    })
}

fn export_stage(config: &BackupConfig, run: &BackupRun) -> Result<PathBuf, StageFailure> {
    db_dump::create_sql_backup(
        &config.database_url,
        &run.artifact_path(&config.backup_dir, &config.artifact_prefix, ArtifactKind::Sql),
    )
    .map_err(StageFailure::at(Stage::RelationalExport))
}

async fn snapshot_stage(config: &BackupConfig, run: &BackupRun, tables: &[&str]) -> Result<PathBuf, StageFailure> {
    json_export::create_json_backup(
        &config.database_url,
        tables,
        &run.artifact_path(&config.backup_dir, &config.artifact_prefix, ArtifactKind::Json),
    )
    .await
    .map_err(StageFailure::at(Stage::StructuredSnapshot))
}

fn archive_stage(config: &BackupConfig, run: &BackupRun, inputs: &[PathBuf]) -> Result<PathBuf, StageFailure> {
    archive::create_zip_archive(
        &run.artifact_path(&config.backup_dir, &config.artifact_prefix, ArtifactKind::Archive),
        inputs,
    )
    .map_err(StageFailure::at(Stage::Archive))
}

/// Uploads the archive when both provider and bucket are configured. Failures are logged only.
pub fn replicate_archive(config: &BackupConfig, archive_path: &Path) -> ReplicationStatus {
    let Some(cloud) = &config.cloud_storage else {
        info!("Cloud storage not configured, skipping upload");
        return ReplicationStatus::Skipped;
    };

    match cloud_upload::upload_archive(cloud, &config.artifact_prefix, archive_path) {
        Ok(destination) => {
            info!("☁️ Backup uploaded to {}", destination);
            ReplicationStatus::Uploaded(destination)
        }
        Err(e) => {
            warn!("⚠️ Cloud upload failed: {}", e);
            ReplicationStatus::Failed(e.to_string())
        }
    }
}

pub fn sweep_old_archives(config: &BackupConfig) -> SweepReport {
    info!("🧹 Cleaning up backups older than {} days", config.retention_days);
    let cutoff = retention::retention_cutoff(Utc::now(), config.retention_days);
    let report = retention::sweep_expired_archives(
        &config.backup_dir,
        &archive_name_fragment(&config.artifact_prefix),
        cutoff,
    );
    info!("🧹 Removed {} old backup(s)", report.deleted().count());
    report
}
