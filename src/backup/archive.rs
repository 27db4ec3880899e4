// dbsnapshot/src/backup/archive.rs
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::errors::{BackupError, Result};

/// Writes `files` into a deflate-compressed zip at `archive_dest_path`, in order, each
/// entry named after the file's base name.
///
/// On failure the partially written archive is removed and the error names the file
/// that could not be added.
pub fn create_zip_archive(archive_dest_path: &Path, files: &[PathBuf]) -> Result<PathBuf> {
    info!("📦 Creating archive: {}", archive_dest_path.display());

    match write_zip(archive_dest_path, files) {
        Ok(()) => {
            if let Ok(metadata) = fs::metadata(archive_dest_path) {
                info!(
                    "✓ Archive created ({:.2} KB)",
                    metadata.len() as f64 / 1024.0
                );
            }
            Ok(archive_dest_path.to_path_buf())
        }
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(archive_dest_path) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    warn!(
                        "⚠️ Could not remove partial archive {}: {}",
                        archive_dest_path.display(),
                        remove_err
                    );
                }
            }
            Err(e)
        }
    }
}

fn write_zip(archive_dest_path: &Path, files: &[PathBuf]) -> Result<()> {
    let archive_file = File::create(archive_dest_path).map_err(|e| BackupError::Archive {
        path: archive_dest_path.to_path_buf(),
        reason: format!("failed to create archive file: {}", e),
    })?;
    let mut zip = ZipWriter::new(archive_file);

    for file_path in files {
        add_file(&mut zip, file_path)?;
    }

    zip.finish().map_err(|e| BackupError::Archive {
        path: archive_dest_path.to_path_buf(),
        reason: format!("failed to finish archive: {}", e),
    })?;
    Ok(())
}

fn add_file(zip: &mut ZipWriter<File>, file_path: &Path) -> Result<()> {
    let archive_error = |reason: String| BackupError::Archive {
        path: file_path.to_path_buf(),
        reason,
    };

    let mut file = File::open(file_path).map_err(|e| archive_error(format!("failed to open: {}", e)))?;
    let metadata = file
        .metadata()
        .map_err(|e| archive_error(format!("failed to read metadata: {}", e)))?;
    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| archive_error("path has no file name".to_string()))?;

    zip.start_file(name, entry_options(&metadata))
        .map_err(|e| archive_error(format!("failed to write entry header: {}", e)))?;
    io::copy(&mut file, zip).map_err(|e| archive_error(format!("failed to copy contents: {}", e)))?;
    Ok(())
}

/// Entry header settings derived from the source file's metadata.
fn entry_options(metadata: &Metadata) -> SimpleFileOptions {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(metadata.len() >= u64::from(u32::MAX));

    let options = match metadata.modified() {
        Ok(modified) => options.last_modified_time(zip_timestamp(DateTime::<Local>::from(modified))),
        Err(_) => options,
    };

    #[cfg(unix)]
    let options = {
        use std::os::unix::fs::PermissionsExt;
        options.unix_permissions(metadata.permissions().mode())
    };

    options
}

/// DOS timestamps cover 1980..=2107; anything outside falls back to the format's epoch.
fn zip_timestamp(time: DateTime<Local>) -> zip::DateTime {
    let year = u16::try_from(time.year()).unwrap_or(0);
    zip::DateTime::from_date_and_time(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .unwrap_or_default()
}
