//! Structural validation of a migrations directory.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::{MigrateResult, MigrationError};
use crate::file::{
    MigrationFileEntry, MigrationFileKind, MigrationFileManager, format_migration_number,
};
use crate::snapshot::INITIAL_MIGRATION_NUMBER;

/// Kind of structural problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// No initial schema, but other migrations exist.
    MissingSchema,
    /// A schema artifact at a number other than the initial one.
    InvalidSchemaNumber,
    /// A number in the sequence has no artifact.
    Gap,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSchema => "missing_schema",
            Self::InvalidSchemaNumber => "invalid_schema_number",
            Self::Gap => "gap",
        }
    }
}

/// A structural problem at one migration number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationValidationError {
    pub kind: ValidationErrorKind,
    pub migration_number: u32,
    pub message: String,
}

impl MigrationValidationError {
    pub fn new(kind: ValidationErrorKind, migration_number: u32) -> Self {
        let number = format_migration_number(migration_number);
        let message = match kind {
            ValidationErrorKind::MissingSchema => format!(
                "Initial schema snapshot {}/schema.json is missing",
                number
            ),
            ValidationErrorKind::InvalidSchemaNumber => format!(
                "Schema snapshot found in {}; only {} may contain schema.json",
                number,
                format_migration_number(INITIAL_MIGRATION_NUMBER)
            ),
            ValidationErrorKind::Gap => {
                format!("Migration {} is missing from the sequence", number)
            }
        };
        Self {
            kind,
            migration_number,
            message,
        }
    }
}

impl fmt::Display for MigrationValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

/// Check a list of discovered artifacts.
pub fn validate_entries(files: &[MigrationFileEntry]) -> Vec<MigrationValidationError> {
    let mut errors = Vec::new();

    let Some(max) = files.iter().map(|f| f.number).max() else {
        return errors;
    };

    let has_initial_schema = files
        .iter()
        .any(|f| f.kind == MigrationFileKind::Schema && f.number == INITIAL_MIGRATION_NUMBER);
    if !has_initial_schema {
        errors.push(MigrationValidationError::new(
            ValidationErrorKind::MissingSchema,
            INITIAL_MIGRATION_NUMBER,
        ));
    }

    for file in files {
        if file.kind == MigrationFileKind::Schema && file.number != INITIAL_MIGRATION_NUMBER {
            errors.push(MigrationValidationError::new(
                ValidationErrorKind::InvalidSchemaNumber,
                file.number,
            ));
        }
    }

    let present: BTreeSet<u32> = files.iter().map(|f| f.number).collect();
    // A missing initial number is already reported as `missing_schema`.
    for number in INITIAL_MIGRATION_NUMBER + 1..=max {
        if !present.contains(&number) {
            errors.push(MigrationValidationError::new(ValidationErrorKind::Gap, number));
        }
    }

    errors.sort_by_key(|e| e.migration_number);
    errors
}

/// Validate a migrations directory. An empty result means the chain is well formed.
pub async fn validate_migration_files(
    dir: impl AsRef<Path>,
) -> MigrateResult<Vec<MigrationValidationError>> {
    let manager = MigrationFileManager::new(dir.as_ref());
    let files = manager.get_migration_files().await?;
    Ok(validate_entries(&files))
}

/// Validate a migrations directory and fail with every error found.
pub async fn assert_valid_migration_files(
    dir: impl AsRef<Path>,
    namespace: &str,
) -> MigrateResult<()> {
    let errors = validate_migration_files(dir).await?;
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MigrationError::InvalidMigrationFiles {
            namespace: namespace.to_string(),
            errors,
        })
    }
}
