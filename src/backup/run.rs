// dbsnapshot/src/backup/run.rs
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Kinds of files a backup run leaves in the backup directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Sql,
    Json,
    Archive,
}

impl ArtifactKind {
    fn fragment(self) -> &'static str {
        match self {
            ArtifactKind::Sql => "sql",
            ArtifactKind::Json => "json",
            ArtifactKind::Archive => "backup",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Sql => "sql",
            ArtifactKind::Json => "json",
            ArtifactKind::Archive => "zip",
        }
    }
}

/// One pipeline execution, identified by its UTC start time.
#[derive(Debug, Clone)]
pub struct BackupRun {
    started_at: DateTime<Utc>,
    id: String,
}

impl BackupRun {
    pub fn at(started_at: DateTime<Utc>) -> Self {
        // No ':' so the id is safe in file names on every platform
        let id = started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
        BackupRun { started_at, id }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn artifact_path(&self, backup_dir: &Path, prefix: &str, kind: ArtifactKind) -> PathBuf {
        backup_dir.join(format!(
            "{}-{}-{}.{}",
            prefix,
            kind.fragment(),
            self.id,
            kind.extension()
        ))
    }
}

/// Substring shared by every archive file name; the retention sweep matches on it.
pub fn archive_name_fragment(prefix: &str) -> String {
    format!("{}-{}-", prefix, ArtifactKind::Archive.fragment())
}
