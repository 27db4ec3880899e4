use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Database dump failed: {0}")]
    Export(String),

    #[error("Database dump {} is empty or was not created", .0.display())]
    EmptyBackup(PathBuf),

    #[error("Failed to export table {table}: {source}")]
    TableExport {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to decode record from table {table}: {reason}")]
    RecordDecode { table: String, reason: String },

    #[error("Failed to write snapshot {}: {source}", .path.display())]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Failed to archive {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("Unsupported cloud provider: {0}")]
    UnsupportedProvider(String),

    #[error("Upload failed: {0}")]
    Upload(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
