// dbsnapshot/src/backup/json_export.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::{Connection, PgConnection, Row};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{BackupError, Result};

/// Reserved top-level key holding the snapshot metadata.
pub const METADATA_KEY: &str = "_metadata";
/// Version of the snapshot document layout.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0";
const BACKUP_TYPE: &str = "JSON";

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableExport {
    pub records: Vec<Record>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotMetadata {
    pub timestamp: DateTime<Utc>,
    pub database_name: String,
    pub backup_type: String,
    /// Only tables that exported successfully appear here.
    pub record_counts: BTreeMap<String, usize>,
    pub schema_version: String,
    /// Hex SHA-256 of the compact JSON encoding of every key except `_metadata`.
    pub checksum: String,
}

/// Something that can hand back every row of a table as JSON text.
pub trait TableSource {
    async fn table_rows(&mut self, table: &str) -> Result<Vec<String>>;
}

pub struct PgTableSource {
    conn: PgConnection,
}

impl PgTableSource {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let conn = PgConnection::connect(database_url)
            .await
            .map_err(BackupError::Connection)?;
        Ok(PgTableSource { conn })
    }

    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            warn!("⚠️ Failed to close database connection cleanly: {}", e);
        }
    }
}

impl TableSource for PgTableSource {
    async fn table_rows(&mut self, table: &str) -> Result<Vec<String>> {
        let query = format!("SELECT to_jsonb(t)::text FROM {} t", quote_identifier(table));
        let rows = sqlx::query(&query)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|source| BackupError::TableExport {
                table: table.to_string(),
                source,
            })?;

        Ok(rows
            .iter()
            .filter_map(|row| match row.try_get::<String, _>(0) {
                Ok(text) => Some(text),
                Err(e) => {
                    let skipped = BackupError::RecordDecode {
                        table: table.to_string(),
                        reason: e.to_string(),
                    };
                    debug!("Skipping row: {}", skipped);
                    None
                }
            })
            .collect())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Decodes each raw row into a record. Rows that are not JSON objects are skipped and not counted.
pub fn decode_rows(table: &str, rows: Vec<String>) -> TableExport {
    let records: Vec<Record> = rows
        .into_iter()
        .filter_map(|raw| match serde_json::from_str::<Record>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                let skipped = BackupError::RecordDecode {
                    table: table.to_string(),
                    reason: e.to_string(),
                };
                debug!("Skipping row: {}", skipped);
                None
            }
        })
        .collect();
    let count = records.len();
    TableExport { records, count }
}

/// Exports `tables` one at a time. A table whose query fails is logged and left out.
pub async fn export_tables<S: TableSource>(
    source: &mut S,
    tables: &[&str],
) -> BTreeMap<String, TableExport> {
    let mut exports = BTreeMap::new();

    for &table in tables {
        match source.table_rows(table).await {
            Ok(rows) => {
                let export = decode_rows(table, rows);
                info!("  ✓ {}: {} records", table, export.count);
                exports.insert(table.to_string(), export);
            }
            Err(e) => warn!("⚠️ {}", e),
        }
    }

    exports
}

pub fn data_checksum(data: &Map<String, Value>) -> Result<String> {
    let encoded = serde_json::to_vec(data)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// Builds the snapshot document: one array per exported table plus the metadata entry.
pub fn assemble_snapshot(
    exports: BTreeMap<String, TableExport>,
    database_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<Value> {
    let mut record_counts = BTreeMap::new();
    let mut document = Map::new();

    for (table, export) in exports {
        record_counts.insert(table.clone(), export.count);
        document.insert(
            table,
            Value::Array(export.records.into_iter().map(Value::Object).collect()),
        );
    }

    let metadata = SnapshotMetadata {
        timestamp,
        database_name: database_name.to_string(),
        backup_type: BACKUP_TYPE.to_string(),
        record_counts,
        schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
        checksum: data_checksum(&document)?,
    };
    document.insert(METADATA_KEY.to_string(), serde_json::to_value(&metadata)?);

    Ok(Value::Object(document))
}

/// Writes the snapshot as two-space indented JSON followed by a newline.
pub fn write_snapshot(snapshot: &Value, destination: &Path) -> Result<()> {
    let write_error = |source: std::io::Error| BackupError::SnapshotWrite {
        path: destination.to_path_buf(),
        source,
    };

    let file = File::create(destination).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, snapshot).map_err(|e| {
        if e.is_io() {
            write_error(std::io::Error::from(e))
        } else {
            BackupError::SerdeJson(e)
        }
    })?;
    writer.write_all(b"\n").map_err(write_error)?;
    writer.flush().map_err(write_error)?;
    Ok(())
}

/// Database name from the path of a `postgres://` URL, empty if there is none.
pub fn database_name_from_url(database_url: &str) -> String {
    Url::parse(database_url)
        .map(|url| url.path().trim_start_matches('/').to_string())
        .unwrap_or_default()
}

/// Exports `tables` from the database into a JSON snapshot at `destination`.
///
/// Only a failed connection is fatal; per-table failures leave the table out.
pub async fn create_json_backup(
    database_url: &str,
    tables: &[&str],
    destination: &Path,
) -> Result<PathBuf> {
    info!("📄 Creating JSON backup: {}", destination.display());
    let timestamp = Utc::now();

    let mut source = PgTableSource::connect(database_url).await?;
    let exports = export_tables(&mut source, tables).await;
    source.close().await;

    let snapshot = assemble_snapshot(exports, &database_name_from_url(database_url), timestamp)?;
    write_snapshot(&snapshot, destination)?;

    info!("✓ JSON backup written to {}", destination.display());
    Ok(destination.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[derive(Default)]
    struct FakeSource {
        tables: HashMap<String, Option<Vec<String>>>,
        queried: Vec<String>,
    }

    impl FakeSource {
        fn with_rows(mut self, table: &str, rows: &[&str]) -> Self {
            let rows = rows.iter().map(|r| r.to_string()).collect();
            self.tables.insert(table.to_string(), Some(rows));
            self
        }

        fn failing(mut self, table: &str) -> Self {
            self.tables.insert(table.to_string(), None);
            self
        }
    }

    impl TableSource for FakeSource {
        async fn table_rows(&mut self, table: &str) -> Result<Vec<String>> {
            self.queried.push(table.to_string());
            match self.tables.get(table) {
                Some(Some(rows)) => Ok(rows.clone()),
                _ => Err(BackupError::TableExport {
                    table: table.to_string(),
                    source: sqlx::Error::Protocol(format!("relation \"{}\" does not exist", table)),
                }),
            }
        }
    }

    fn snapshot_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_failed_table_is_omitted_from_snapshot() -> anyhow::Result<()> {
        let mut source = FakeSource::default()
            .with_rows("A", &[r#"{"id": 1}"#, r#"{"id": 2}"#])
            .failing("B")
            .with_rows("C", &[r#"{"id": "c1", "name": "only"}"#]);

        let exports = export_tables(&mut source, &["A", "B", "C"]).await;
        let snapshot = assemble_snapshot(exports, "cardeals", snapshot_time())?;
        let document = snapshot.as_object().unwrap();

        let mut keys: Vec<&str> = document.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["A", "C", METADATA_KEY]);

        let counts = &document[METADATA_KEY]["record_counts"];
        assert_eq!(counts, &serde_json::json!({ "A": 2, "C": 1 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_table_failure_does_not_stop_later_tables() {
        let mut source = FakeSource::default()
            .failing("User")
            .with_rows("CarMake", &[r#"{"name": "Toyota"}"#])
            .with_rows("Session", &[]);

        let exports = export_tables(&mut source, &["User", "CarMake", "Session"]).await;

        assert_eq!(source.queried, vec!["User", "CarMake", "Session"]);
        assert_eq!(exports.len(), 2);
        assert_eq!(exports["CarMake"].count, 1);
        assert_eq!(exports["Session"], TableExport::default());
    }

    #[test]
    fn test_undecodable_rows_are_skipped() {
        let rows = vec![
            r#"{"id": 1}"#.to_string(),
            "not json".to_string(),
            "[1, 2]".to_string(),
            r#"{"id": 2, "tags": ["a"]}"#.to_string(),
        ];

        let export = decode_rows("CarDeal", rows);

        assert_eq!(export.count, 2);
        assert_eq!(export.records.len(), 2);
        assert_eq!(export.records[0]["id"], 1);
        assert_eq!(export.records[1]["tags"][0], "a");
    }

    #[test]
    fn test_metadata_fields_are_populated() -> anyhow::Result<()> {
        let mut exports = BTreeMap::new();
        exports.insert("CarMake".to_string(), decode_rows("CarMake", vec![r#"{"id": 7}"#.to_string()]));

        let snapshot = assemble_snapshot(exports, "cardeals", snapshot_time())?;
        let metadata = &snapshot[METADATA_KEY];

        assert_eq!(metadata["backup_type"], "JSON");
        assert_eq!(metadata["database_name"], "cardeals");
        assert_eq!(metadata["schema_version"], SNAPSHOT_SCHEMA_VERSION);
        assert_eq!(metadata["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(metadata["checksum"].as_str().map(str::len), Some(64));
        Ok(())
    }

    #[test]
    fn test_checksum_matches_written_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("snapshot.json");

        let mut exports = BTreeMap::new();
        exports.insert(
            "CarModel".to_string(),
            decode_rows("CarModel", vec![r#"{"id": "m1", "name": "Camry", "year": 2020}"#.to_string()]),
        );
        exports.insert("User".to_string(), decode_rows("User", vec![r#"{"email": "a@b.c"}"#.to_string()]));

        let snapshot = assemble_snapshot(exports, "cardeals", snapshot_time())?;
        write_snapshot(&snapshot, &destination)?;

        let written = fs::read_to_string(&destination)?;
        assert!(written.starts_with("{\n  \""));
        assert!(written.ends_with("}\n"));

        let mut parsed: Map<String, Value> = serde_json::from_str(&written)?;
        let metadata = parsed.remove(METADATA_KEY).unwrap();
        assert_eq!(metadata["checksum"].as_str().unwrap(), data_checksum(&parsed)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connection_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("snapshot.json");

        let result = create_json_backup("postgres://nobody@127.0.0.1:1/db", &["CarMake"], &destination).await;

        assert!(matches!(result, Err(BackupError::Connection(_))));
        assert!(!destination.exists());
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_keeps_snapshot_path() -> anyhow::Result<()> {
        let destination = Path::new("/dev/full");
        if !destination.exists() {
            return Ok(());
        }

        // Larger than the write buffer so the failure happens mid-serialization
        let rows: Vec<String> = (0..2000)
            .map(|i| format!(r#"{{"id": {}, "name": "Model number {}"}}"#, i, i))
            .collect();
        let mut exports = BTreeMap::new();
        exports.insert("CarModel".to_string(), decode_rows("CarModel", rows));
        let snapshot = assemble_snapshot(exports, "cardeals", snapshot_time())?;

        let result = write_snapshot(&snapshot, destination);

        match result {
            Err(BackupError::SnapshotWrite { path, .. }) => assert_eq!(path, destination),
            other => panic!("expected snapshot write failure, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_database_name_from_url() {
        assert_eq!(database_name_from_url("postgres://user:pw@localhost:5432/cardeals"), "cardeals");
        assert_eq!(database_name_from_url("postgresql://localhost/shop?sslmode=require"), "shop");
        assert_eq!(database_name_from_url("postgres://localhost"), "");
        assert_eq!(database_name_from_url("host=localhost dbname=cardeals"), "");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("CarMake"), "\"CarMake\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
