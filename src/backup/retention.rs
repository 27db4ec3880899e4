// dbsnapshot/src/backup/retention.rs
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// What happened to one directory entry the sweep cared about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Deleted(PathBuf),
    DeleteFailed { path: PathBuf, reason: String },
    /// The entry could not be read or stat'ed and was skipped.
    Unreadable { path: Option<PathBuf>, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub outcomes: Vec<SweepOutcome>,
}

impl SweepReport {
    pub fn deleted(&self) -> impl Iterator<Item = &PathBuf> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            SweepOutcome::Deleted(path) => Some(path),
            _ => None,
        })
    }
}

/// Now minus `retention_days`. Saturates at the earliest representable instant.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(retention_days))
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Deletes every regular file under `backup_dir` whose name contains `name_fragment` and
/// whose modification time is strictly before `cutoff`.
///
/// Nothing is propagated: entry and deletion errors end up in the report.
pub fn sweep_expired_archives(backup_dir: &Path, name_fragment: &str, cutoff: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    for entry in WalkDir::new(backup_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.outcomes.push(SweepOutcome::Unreadable {
                    path: e.path().map(Path::to_path_buf),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() || !entry.file_name().to_string_lossy().contains(name_fragment) {
            continue;
        }

        let modified = entry
            .metadata()
            .map_err(|e| e.to_string())
            .and_then(|metadata| metadata.modified().map_err(|e| e.to_string()));
        let modified = match modified {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(reason) => {
                report.outcomes.push(SweepOutcome::Unreadable {
                    path: Some(entry.path().to_path_buf()),
                    reason,
                });
                continue;
            }
        };

        if modified >= cutoff {
            continue;
        }

        let path = entry.into_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("🗑️ Deleting old backup: {}", path.display());
                report.outcomes.push(SweepOutcome::Deleted(path));
            }
            Err(e) => report.outcomes.push(SweepOutcome::DeleteFailed {
                path,
                reason: e.to_string(),
            }),
        }
    }

    for outcome in &report.outcomes {
        match outcome {
            SweepOutcome::Deleted(_) => {}
            SweepOutcome::DeleteFailed { path, reason } => {
                warn!("⚠️ Could not delete {}: {}", path.display(), reason)
            }
            SweepOutcome::Unreadable { path, reason } => match path {
                Some(path) => warn!("⚠️ Skipping unreadable entry {}: {}", path.display(), reason),
                None => warn!("⚠️ Skipping unreadable entry: {}", reason),
            },
        }
    }

    report
}
