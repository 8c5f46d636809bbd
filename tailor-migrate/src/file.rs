//! Migration file management.
//!
//! Each migration lives in a directory named by its zero-padded number:
//!
//! ```text
//! migrations/
//! ├── 0000/schema.json
//! ├── 0001/diff.json
//! ├── 0001/migrate.ts
//! └── 0001/db.ts
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::diff::MigrationDiff;
use crate::error::{MigrateResult, MigrationError};
use crate::snapshot::{INITIAL_MIGRATION_NUMBER, SchemaSnapshot};

pub const SCHEMA_FILE_NAME: &str = "schema.json";
pub const DIFF_FILE_NAME: &str = "diff.json";
pub const MIGRATE_FILE_NAME: &str = "migrate.ts";
pub const DB_TYPES_FILE_NAME: &str = "db.ts";

/// The artifacts a migration directory can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MigrationFileKind {
    Schema,
    Diff,
    Migrate,
    Db,
}

impl MigrationFileKind {
    /// Fixed file name of this artifact.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Schema => SCHEMA_FILE_NAME,
            Self::Diff => DIFF_FILE_NAME,
            Self::Migrate => MIGRATE_FILE_NAME,
            Self::Db => DB_TYPES_FILE_NAME,
        }
    }
}

impl fmt::Display for MigrationFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "schema",
            Self::Diff => "diff",
            Self::Migrate => "migrate",
            Self::Db => "db",
        };
        f.write_str(name)
    }
}

/// A schema or diff artifact found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFileEntry {
    pub number: u32,
    /// Either `Schema` or `Diff`.
    pub kind: MigrationFileKind,
    pub path: PathBuf,
}

/// Zero-pad a migration number to at least 4 digits.
pub fn format_migration_number(number: u32) -> String {
    format!("{:04}", number)
}

/// Parse a strict 4-digit migration directory name.
pub fn parse_migration_dir_name(name: &str) -> Option<u32> {
    if name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

pub fn get_migration_dir_path(base: &Path, number: u32) -> PathBuf {
    base.join(format_migration_number(number))
}

pub fn get_migration_file_path(base: &Path, number: u32, kind: MigrationFileKind) -> PathBuf {
    get_migration_dir_path(base, number).join(kind.file_name())
}

/// Migration file reader/writer for one namespace.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    /// Directory where migrations are stored.
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    pub fn dir_path(&self, number: u32) -> PathBuf {
        get_migration_dir_path(&self.migrations_dir, number)
    }

    pub fn file_path(&self, number: u32, kind: MigrationFileKind) -> PathBuf {
        get_migration_file_path(&self.migrations_dir, number, kind)
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.migrations_dir).await?;
        Ok(())
    }

    /// Whether an artifact exists.
    pub async fn exists(&self, number: u32, kind: MigrationFileKind) -> bool {
        tokio::fs::try_exists(self.file_path(number, kind))
            .await
            .unwrap_or(false)
    }

    /// List schema and diff artifacts, ordered by number with schema first.
    pub async fn get_migration_files(&self) -> MigrateResult<Vec<MigrationFileEntry>> {
        let mut files = Vec::new();

        if !tokio::fs::try_exists(&self.migrations_dir).await? {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.migrations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(number) = entry.file_name().to_str().and_then(parse_migration_dir_name)
            else {
                continue;
            };

            for kind in [MigrationFileKind::Schema, MigrationFileKind::Diff] {
                let path = entry.path().join(kind.file_name());
                if tokio::fs::try_exists(&path).await? {
                    files.push(MigrationFileEntry { number, kind, path });
                }
            }
        }

        files.sort_by(|a, b| a.number.cmp(&b.number).then(a.kind.cmp(&b.kind)));
        Ok(files)
    }

    /// Highest migration number present, or 0 if none.
    pub async fn get_latest_migration_number(&self) -> MigrateResult<u32> {
        let files = self.get_migration_files().await?;
        Ok(files.iter().map(|f| f.number).max().unwrap_or(0))
    }

    /// Number the next generated migration should use.
    pub async fn get_next_migration_number(&self) -> MigrateResult<u32> {
        let files = self.get_migration_files().await?;
        Ok(match files.iter().map(|f| f.number).max() {
            Some(latest) => latest + 1,
            None => INITIAL_MIGRATION_NUMBER,
        })
    }

    pub async fn read_snapshot(&self, number: u32) -> MigrateResult<SchemaSnapshot> {
        read_json(&self.file_path(number, MigrationFileKind::Schema)).await
    }

    pub async fn read_diff(&self, number: u32) -> MigrateResult<MigrationDiff> {
        read_json(&self.file_path(number, MigrationFileKind::Diff)).await
    }

    /// Write a snapshot. Overwrites; callers check [`Self::assert_absent`] first.
    pub async fn write_snapshot(
        &self,
        number: u32,
        snapshot: &SchemaSnapshot,
    ) -> MigrateResult<PathBuf> {
        let path = self.file_path(number, MigrationFileKind::Schema);
        self.write(number, &path, &to_json(&path, snapshot)?).await?;
        Ok(path)
    }

    /// Write a diff. Overwrites; callers check [`Self::assert_absent`] first.
    pub async fn write_diff(&self, number: u32, diff: &MigrationDiff) -> MigrateResult<PathBuf> {
        let path = self.file_path(number, MigrationFileKind::Diff);
        self.write(number, &path, &to_json(&path, diff)?).await?;
        Ok(path)
    }

    /// Write a text artifact (script or type aid) if it does not exist yet.
    pub async fn write_text(
        &self,
        number: u32,
        kind: MigrationFileKind,
        content: &str,
    ) -> MigrateResult<PathBuf> {
        self.assert_absent(number, kind).await?;
        let path = self.file_path(number, kind);
        self.write(number, &path, content).await?;
        Ok(path)
    }

    /// Fail if the artifact already exists.
    pub async fn assert_absent(&self, number: u32, kind: MigrationFileKind) -> MigrateResult<()> {
        let path = self.file_path(number, kind);
        if tokio::fs::try_exists(&path).await? {
            return Err(MigrationError::FileExists(path));
        }
        Ok(())
    }

    async fn write(&self, number: u32, path: &Path, content: &str) -> MigrateResult<()> {
        tokio::fs::create_dir_all(self.dir_path(number)).await?;
        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), "Wrote migration file");
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> MigrateResult<T> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(|e| MigrationError::json(path, e))
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> MigrateResult<String> {
    let mut json = serde_json::to_string_pretty(value).map_err(|e| MigrationError::json(path, e))?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_migration_number() {
        assert_eq!(format_migration_number(0), "0000");
        assert_eq!(format_migration_number(1), "0001");
        assert_eq!(format_migration_number(42), "0042");
        assert_eq!(format_migration_number(10000), "10000");
    }

    #[test]
    fn test_parse_migration_dir_name() {
        assert_eq!(parse_migration_dir_name("0007"), Some(7));
        assert_eq!(parse_migration_dir_name("007"), None);
        assert_eq!(parse_migration_dir_name("00007"), None);
        assert_eq!(parse_migration_dir_name("00a1"), None);
        assert_eq!(parse_migration_dir_name("+001"), None);
    }

    #[test]
    fn test_file_paths() {
        let base = Path::new("migrations");
        assert_eq!(get_migration_dir_path(base, 3), PathBuf::from("migrations/0003"));
        assert_eq!(
            get_migration_file_path(base, 3, MigrationFileKind::Migrate),
            PathBuf::from("migrations/0003/migrate.ts")
        );
        assert_eq!(
            get_migration_file_path(base, 0, MigrationFileKind::Schema),
            PathBuf::from("migrations/0000/schema.json")
        );
    }

    #[tokio::test]
    async fn test_empty_dir_numbers() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(temp_dir.path().join("missing"));

        assert!(manager.get_migration_files().await.unwrap().is_empty());
        assert_eq!(manager.get_latest_migration_number().await.unwrap(), 0);
        assert_eq!(manager.get_next_migration_number().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_ignores_foreign_entries() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(temp_dir.path());

        manager
            .write_snapshot(0, &SchemaSnapshot::new("main", 0))
            .await
            .unwrap();
        std::fs::create_dir_all(temp_dir.path().join("notes")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("0002")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("123")).unwrap();
        std::fs::write(temp_dir.path().join("123/diff.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("0001"), "not a dir").unwrap();

        let files = manager.get_migration_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, MigrationFileKind::Schema);
        assert_eq!(manager.get_next_migration_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_files_sorted_schema_before_diff() {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["0002", "0000", "0001"] {
            std::fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        std::fs::write(temp_dir.path().join("0000/diff.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("0000/schema.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("0001/diff.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("0002/diff.json"), "{}").unwrap();

        let manager = MigrationFileManager::new(temp_dir.path());
        let files: Vec<_> = manager
            .get_migration_files()
            .await
            .unwrap()
            .into_iter()
            .map(|f| (f.number, f.kind))
            .collect();

        assert_eq!(
            files,
            vec![
                (0, MigrationFileKind::Schema),
                (0, MigrationFileKind::Diff),
                (1, MigrationFileKind::Diff),
                (2, MigrationFileKind::Diff),
            ]
        );
        assert_eq!(manager.get_latest_migration_number().await.unwrap(), 2);
        assert_eq!(manager.get_next_migration_number().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_write_and_read_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(temp_dir.path());
        let snapshot = SchemaSnapshot::new("main", 0);

        let path = manager.write_snapshot(0, &snapshot).await.unwrap();
        assert!(path.ends_with("0000/schema.json"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  \"namespace\": \"main\""));
        assert_eq!(manager.read_snapshot(0).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_assert_absent() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(temp_dir.path());

        assert!(manager.assert_absent(0, MigrationFileKind::Schema).await.is_ok());
        manager
            .write_snapshot(0, &SchemaSnapshot::new("main", 0))
            .await
            .unwrap();

        let err = manager
            .assert_absent(0, MigrationFileKind::Schema)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::FileExists(_)));
    }

    #[tokio::test]
    async fn test_write_text_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(temp_dir.path());

        manager
            .write_text(1, MigrationFileKind::Migrate, "export {}")
            .await
            .unwrap();
        assert!(manager.exists(1, MigrationFileKind::Migrate).await);
        assert!(
            manager
                .write_text(1, MigrationFileKind::Migrate, "again")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_read_invalid_json_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("0001")).unwrap();
        std::fs::write(temp_dir.path().join("0001/diff.json"), "{ nope").unwrap();

        let manager = MigrationFileManager::new(temp_dir.path());
        let err = manager.read_diff(1).await.unwrap_err();
        assert!(err.to_string().contains("0001/diff.json"));
    }
}
