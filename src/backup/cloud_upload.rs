// dbsnapshot/src/backup/cloud_upload.rs
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::config::CloudStorageConfig;
use crate::errors::{BackupError, Result};
use crate::utils::find_executable;

/// Where an archive gets replicated. Each variant uploads through its provider's CLI,
/// which brings its own credentials from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationTarget {
    S3 { bucket: String, region: String },
    Gcs { bucket: String },
    AzureBlob { container: String },
}

/// A single external upload invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCommand {
    pub program: &'static str,
    pub args: Vec<OsString>,
    /// Human readable remote location, for logging.
    pub destination: String,
}

impl ReplicationTarget {
    pub fn from_config(cloud: &CloudStorageConfig) -> Result<Self> {
        match cloud.provider.as_str() {
            "aws" => Ok(ReplicationTarget::S3 {
                bucket: cloud.bucket_name.clone(),
                region: cloud.region.clone(),
            }),
            "gcp" => Ok(ReplicationTarget::Gcs {
                bucket: cloud.bucket_name.clone(),
            }),
            "azure" => Ok(ReplicationTarget::AzureBlob {
                container: cloud.bucket_name.clone(),
            }),
            other => Err(BackupError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn upload_command(&self, archive: &Path, remote_prefix: &str) -> Result<UploadCommand> {
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BackupError::Upload(format!("{} has no file name", archive.display()))
            })?;
        let object_name = format!("{}/{}", remote_prefix, file_name);

        let command = match self {
            ReplicationTarget::S3 { bucket, region } => {
                let destination = format!("s3://{}/{}", bucket, object_name);
                let mut args: Vec<OsString> = vec![
                    "s3".into(),
                    "cp".into(),
                    archive.into(),
                    destination.clone().into(),
                ];
                if !region.is_empty() {
                    args.push("--region".into());
                    args.push(region.into());
                }
                UploadCommand { program: "aws", args, destination }
            }
            ReplicationTarget::Gcs { bucket } => {
                let destination = format!("gs://{}/{}", bucket, object_name);
                UploadCommand {
                    program: "gsutil",
                    args: vec!["cp".into(), archive.into(), destination.clone().into()],
                    destination,
                }
            }
            ReplicationTarget::AzureBlob { container } => UploadCommand {
                program: "az",
                args: vec![
                    "storage".into(),
                    "blob".into(),
                    "upload".into(),
                    "--file".into(),
                    archive.into(),
                    "--name".into(),
                    object_name.clone().into(),
                    "--container-name".into(),
                    container.into(),
                ],
                destination: format!("azure://{}/{}", container, object_name),
            },
        };
        Ok(command)
    }

    /// Uploads `archive` under `remote_prefix`. Returns the remote location.
    pub fn upload(&self, archive: &Path, remote_prefix: &str) -> Result<String> {
        let command = self.upload_command(archive, remote_prefix)?;
        command.run()?;
        Ok(command.destination)
    }
}

impl UploadCommand {
    pub fn run(&self) -> Result<()> {
        let program_path = find_executable(self.program)
            .map_err(|e| BackupError::Upload(format!("{:#}", e)))?;

        info!("☁️ Uploading to {} with {}", self.destination, self.program);
        let output = Command::new(&program_path)
            .args(&self.args)
            .output()
            .map_err(|e| BackupError::Upload(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(BackupError::Upload(format!(
                "{} exited with status: {}\nStderr: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Remote folder every archive is uploaded into.
pub fn remote_prefix(artifact_prefix: &str) -> String {
    format!("{}-backups", artifact_prefix)
}

/// Replicates `archive` to the configured provider.
pub fn upload_archive(cloud: &CloudStorageConfig, artifact_prefix: &str, archive: &Path) -> Result<String> {
    let target = ReplicationTarget::from_config(cloud)?;
    target.upload(archive, &remote_prefix(artifact_prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(provider: &str, bucket: &str, region: &str) -> CloudStorageConfig {
        CloudStorageConfig {
            provider: provider.to_string(),
            bucket_name: bucket.to_string(),
            region: region.to_string(),
        }
    }

    fn args_of(command: &UploadCommand) -> Vec<String> {
        command
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    const ARCHIVE: &str = "/backups/cardeals-backup-2024-01-01T00-00-00Z.zip";

    #[test]
    fn test_aws_command_shape() -> anyhow::Result<()> {
        let target = ReplicationTarget::from_config(&cloud("aws", "my-bucket", "us-east-1"))?;
        let command = target.upload_command(Path::new(ARCHIVE), "cardeals-backups")?;

        assert_eq!(command.program, "aws");
        assert_eq!(
            args_of(&command),
            vec![
                "s3",
                "cp",
                ARCHIVE,
                "s3://my-bucket/cardeals-backups/cardeals-backup-2024-01-01T00-00-00Z.zip",
                "--region",
                "us-east-1",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_aws_without_region_omits_flag() -> anyhow::Result<()> {
        let target = ReplicationTarget::from_config(&cloud("aws", "my-bucket", ""))?;
        let command = target.upload_command(Path::new(ARCHIVE), "cardeals-backups")?;

        assert!(!args_of(&command).contains(&"--region".to_string()));
        Ok(())
    }

    #[test]
    fn test_gcp_command_shape() -> anyhow::Result<()> {
        let target = ReplicationTarget::from_config(&cloud("gcp", "gcs-bucket", "ignored"))?;
        let command = target.upload_command(Path::new(ARCHIVE), "cardeals-backups")?;

        assert_eq!(command.program, "gsutil");
        assert_eq!(
            args_of(&command),
            vec![
                "cp",
                ARCHIVE,
                "gs://gcs-bucket/cardeals-backups/cardeals-backup-2024-01-01T00-00-00Z.zip",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_azure_command_shape() -> anyhow::Result<()> {
        let target = ReplicationTarget::from_config(&cloud("azure", "container", ""))?;
        let command = target.upload_command(Path::new(ARCHIVE), "shop-backups")?;

        assert_eq!(command.program, "az");
        assert_eq!(
            args_of(&command),
            vec![
                "storage",
                "blob",
                "upload",
                "--file",
                ARCHIVE,
                "--name",
                "shop-backups/cardeals-backup-2024-01-01T00-00-00Z.zip",
                "--container-name",
                "container",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = upload_archive(&cloud("dropbox", "bucket", ""), "cardeals", Path::new(ARCHIVE));
        assert!(matches!(result, Err(BackupError::UnsupportedProvider(p)) if p == "dropbox"));
    }

    #[test]
    fn test_remote_prefix() {
        assert_eq!(remote_prefix("cardeals"), "cardeals-backups");
    }

    #[cfg(unix)]
    #[test]
    fn test_upload_success_is_exit_status_zero() {
        let ok = UploadCommand {
            program: "true",
            args: Vec::new(),
            destination: "test://ok".to_string(),
        };
        assert!(ok.run().is_ok());

        let failing = UploadCommand {
            program: "false",
            args: Vec::new(),
            destination: "test://fail".to_string(),
        };
        assert!(matches!(failing.run(), Err(BackupError::Upload(_))));
    }
}
