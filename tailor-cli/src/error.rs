//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(tailor::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(code(tailor::config))]
    Config(String),

    /// Local type definitions could not be read
    #[error("Schema error: {0}")]
    #[diagnostic(code(tailor::schema))]
    Schema(String),

    /// Migration directory validation failed
    #[error("Validation error: {0}")]
    #[diagnostic(code(tailor::validation))]
    Validation(String),

    /// Migration engine error
    #[error(transparent)]
    #[diagnostic(code(tailor::migration))]
    Migration(#[from] tailor_migrate::MigrationError),

    /// Platform API error
    #[error("Platform error: {0}")]
    #[diagnostic(code(tailor::platform))]
    Platform(String),
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        CliError::Platform(err.to_string())
    }
}
