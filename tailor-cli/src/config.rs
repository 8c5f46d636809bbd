//! Project configuration handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tailor_migrate::NamespaceMigrations;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "tailor.toml";

/// Default platform API URL
pub const DEFAULT_PLATFORM_URL: &str = "https://api.tailor.tech";

/// Default migrations root (relative to project root)
pub const MIGRATIONS_DIR: &str = "migrations";

/// Tailor project configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace that migrations are applied to
    pub workspace_id: Option<String>,

    /// Platform API configuration
    pub platform: PlatformConfig,

    /// Database namespaces
    pub db: Vec<DbConfig>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "{} not found. Create it in the project root.",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> CliResult<()> {
        let mut seen = std::collections::HashSet::new();
        for db in &self.db {
            if db.namespace.is_empty() {
                return Err(CliError::Config("[[db]] entry without a namespace".to_string()));
            }
            if !seen.insert(db.namespace.as_str()) {
                return Err(CliError::Config(format!(
                    "Namespace '{}' is configured more than once",
                    db.namespace
                )));
            }
        }
        Ok(())
    }

    /// Find a namespace's configuration
    pub fn db(&self, namespace: &str) -> Option<&DbConfig> {
        self.db.iter().find(|db| db.namespace == namespace)
    }

    /// Migration directories of every namespace, resolved against `root`
    pub fn namespaces(&self, root: &Path) -> Vec<NamespaceMigrations> {
        self.db
            .iter()
            .map(|db| NamespaceMigrations::new(&db.namespace, db.migrations_dir(root)))
            .collect()
    }

    /// The configured workspace ID
    pub fn require_workspace_id(&self) -> CliResult<&str> {
        self.workspace_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CliError::Config("workspace_id is not set".to_string()))
    }
}

/// Platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the platform API
    pub url: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PLATFORM_URL.to_string(),
        }
    }
}

/// One database namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Namespace name
    pub namespace: String,

    /// Migrations directory (defaults to `migrations/<namespace>`)
    pub migrations: Option<PathBuf>,

    /// JSON file with the namespace's local type definitions
    pub types: Option<PathBuf>,
}

impl DbConfig {
    /// Migrations directory resolved against `root`
    pub fn migrations_dir(&self, root: &Path) -> PathBuf {
        match &self.migrations {
            Some(dir) => root.join(dir),
            None => root.join(MIGRATIONS_DIR).join(&self.namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            workspace_id = "ws-1"

            [platform]
            url = "http://localhost:8080"

            [[db]]
            namespace = "main"
            types = "types/main.json"

            [[db]]
            namespace = "audit"
            migrations = "db/audit"
            "#,
        )
        .unwrap();

        assert_eq!(config.require_workspace_id().unwrap(), "ws-1");
        assert_eq!(config.platform.url, "http://localhost:8080");

        let root = Path::new("/project");
        let namespaces = config.namespaces(root);
        assert_eq!(namespaces[0].migrations_dir, root.join("migrations/main"));
        assert_eq!(namespaces[1].migrations_dir, root.join("db/audit"));
        assert!(config.db("audit").unwrap().types.is_none());
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.platform.url, DEFAULT_PLATFORM_URL);
        assert!(config.db.is_empty());
        assert!(config.require_workspace_id().is_err());
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[[db]]\nnamespace = \"main\"\n\n[[db]]\nnamespace = \"main\"\n",
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = Config::load(&temp_dir.path().join(CONFIG_FILE_NAME)).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
