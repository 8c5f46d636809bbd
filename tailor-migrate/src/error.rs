//! Error types for the migration engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::validate::MigrationValidationError;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration artifact could not be parsed or serialized.
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The local type model cannot be turned into a snapshot.
    #[error("Schema error: {0}")]
    InvalidSchema(String),

    /// The migrations directory is not a well-formed chain.
    #[error("Invalid migration files for namespace '{namespace}':\n{}", ErrorList(.errors))]
    InvalidMigrationFiles {
        /// Namespace whose directory failed validation.
        namespace: String,
        /// Every structural problem found.
        errors: Vec<MigrationValidationError>,
    },

    /// A diff could not be applied to the running snapshot.
    #[error("Corrupt migration chain at {number:04}: {message}")]
    CorruptChain {
        /// Migration number of the offending diff.
        number: u32,
        /// What went wrong.
        message: String,
    },

    /// Refused to overwrite an existing migration artifact.
    #[error("Migration file already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// A detected change cannot be migrated automatically.
    #[error(
        "Unsupported change on {type_name}.{field_name}: {reason}\n\
         Automatic migration is not supported for this change. Perform it manually:\n  \
         1. Add a temporary field with the new definition\n  \
         2. Migrate the data from '{field_name}' into the temporary field\n  \
         3. Remove '{field_name}', then re-add it with the new definition and copy the data back"
    )]
    UnsupportedChange {
        /// Type owning the field.
        type_name: String,
        /// Field whose change is unsupported.
        field_name: String,
        /// Human-readable reason from the differ.
        reason: String,
    },

    /// Invalid `TAILOR_APPLY_MIGRATION_VERSION` value.
    #[error("Invalid TAILOR_APPLY_MIGRATION_VERSION: '{0}' is not a migration number")]
    InvalidVersion(String),

    /// A label value violates the metadata label grammar.
    #[error("Invalid label value '{0}'")]
    InvalidLabel(String),

    /// Remote service call failed.
    #[error("Remote error: {0}")]
    Remote(String),

    /// A migration script failed to execute remotely.
    #[error("Migration {number:04} of namespace '{namespace}' failed: {message}")]
    ScriptFailed {
        /// Namespace of the failed migration.
        namespace: String,
        /// Migration number.
        number: u32,
        /// Failure reported by the executor.
        message: String,
    },

    /// Several namespaces have migrations and none was selected.
    #[error("Multiple namespaces have migrations ({}); specify one", .0.join(", "))]
    AmbiguousNamespace(Vec<String>),

    /// The selected namespace is not configured.
    #[error("Namespace '{0}' not found")]
    UnknownNamespace(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

struct ErrorList<'a>(&'a [MigrationValidationError]);

impl fmt::Display for ErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", err)?;
        }
        Ok(())
    }
}

impl MigrationError {
    /// Create a JSON error for the given path.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    /// Create a remote error.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a corrupt chain error.
    pub fn corrupt_chain(number: u32, msg: impl Into<String>) -> Self {
        Self::CorruptChain {
            number,
            message: msg.into(),
        }
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the error was detected locally, before any remote call.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Remote(_) | Self::ScriptFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationErrorKind;

    #[test]
    fn test_file_exists_display() {
        let err = MigrationError::FileExists(PathBuf::from("migrations/0001/diff.json"));
        assert!(err.to_string().contains("Migration file already exists"));
        assert!(err.to_string().contains("0001/diff.json"));
    }

    #[test]
    fn test_invalid_files_lists_every_error() {
        let err = MigrationError::InvalidMigrationFiles {
            namespace: "main".to_string(),
            errors: vec![
                MigrationValidationError::new(ValidationErrorKind::Gap, 1),
                MigrationValidationError::new(ValidationErrorKind::Gap, 3),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("'main'"));
        assert_eq!(msg.lines().count(), 3);
    }

    #[test]
    fn test_unsupported_change_mentions_field() {
        let err = MigrationError::UnsupportedChange {
            type_name: "User".to_string(),
            field_name: "phone".to_string(),
            reason: "Field type changed from string to integer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("User.phone"));
        assert!(msg.contains("temporary field"));
    }

    #[test]
    fn test_is_local() {
        assert!(MigrationError::InvalidVersion("abc".into()).is_local());
        assert!(!MigrationError::remote("timeout").is_local());
    }
}
