// dbsnapshot/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_BACKUP_DIR: &str = "./backups";
const DEFAULT_RETENTION_DAYS: u32 = 30 * 365;
const DEFAULT_ARTIFACT_PREFIX: &str = "cardeals";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonCloudStorageConfig {
    pub provider: Option<String>,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database_url: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub retention_days: Option<u32>,
    pub artifact_prefix: Option<String>,
    pub cloud_storage: Option<JsonCloudStorageConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudStorageConfig {
    /// Raw provider name; unknown names are rejected when the upload is dispatched.
    pub provider: String,
    pub bucket_name: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub database_url: String,
    pub backup_dir: PathBuf,
    pub retention_days: u32,
    pub artifact_prefix: String,
    /// `None` when either the provider or the bucket is unset, which skips replication.
    pub cloud_storage: Option<CloudStorageConfig>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    /// Fills every field the JSON file left unset from `lookup`, keyed by environment variable name.
    pub fn overlay_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.database_url.is_none() {
            self.database_url = lookup("DATABASE_URL");
        }
        if self.backup_dir.is_none() {
            self.backup_dir = lookup("BACKUP_DIR").map(PathBuf::from);
        }
        if self.retention_days.is_none() {
            if let Some(days) = lookup("RETENTION_DAYS") {
                let days = days
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("RETENTION_DAYS must be a whole number of days, got '{}'", days))?;
                self.retention_days = Some(days);
            }
        }
        if self.artifact_prefix.is_none() {
            self.artifact_prefix = lookup("BACKUP_PREFIX");
        }

        let cloud = self.cloud_storage.get_or_insert_with(JsonCloudStorageConfig::default);
        if cloud.provider.is_none() {
            cloud.provider = lookup("CLOUD_PROVIDER");
        }
        if cloud.bucket_name.is_none() {
            cloud.bucket_name = lookup("BACKUP_BUCKET");
        }
        if cloud.region.is_none() {
            cloud.region = lookup("CLOUD_REGION");
        }
        Ok(self)
    }
}

/// Loads the backup configuration.
///
/// An explicitly named config file must exist. When no path is given, `config.json` in the
/// working directory is used if present; otherwise everything comes from `lookup`.
pub fn load_backup_config<F>(config_path: Option<&Path>, lookup: F) -> Result<BackupConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match config_path {
        Some(path) => RawJsonConfig::load_from_json(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                RawJsonConfig::load_from_json(default_path)?
            } else {
                RawJsonConfig::default()
            }
        }
    };
    backup_config_from_raw(raw.overlay_env(lookup)?)
}

pub fn backup_config_from_raw(raw: RawJsonConfig) -> Result<BackupConfig> {
    let database_url = raw
        .database_url
        .filter(|url| !url.trim().is_empty())
        .context("database_url must be set in config.json or DATABASE_URL")?;

    let backup_dir = raw
        .backup_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
    if backup_dir.as_os_str().is_empty() {
        return Err(anyhow::anyhow!("backup_dir cannot be empty."));
    }

    let artifact_prefix = raw
        .artifact_prefix
        .unwrap_or_else(|| DEFAULT_ARTIFACT_PREFIX.to_string());
    if artifact_prefix.is_empty()
        || artifact_prefix.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
    {
        return Err(anyhow::anyhow!(
            "Invalid artifact_prefix '{}': only ASCII letters, digits, '-' and '_' are allowed",
            artifact_prefix
        ));
    }

    let cloud_storage = raw.cloud_storage.and_then(|cloud| {
        let provider = cloud.provider.unwrap_or_default().trim().to_string();
        let bucket_name = cloud.bucket_name.unwrap_or_default().trim().to_string();
        if provider.is_empty() || bucket_name.is_empty() {
            return None;
        }
        Some(CloudStorageConfig {
            provider,
            bucket_name,
            region: cloud.region.unwrap_or_default().trim().to_string(),
        })
    });

    Ok(BackupConfig {
        database_url,
        backup_dir,
        retention_days: raw.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
        artifact_prefix,
        cloud_storage,
    })
}
