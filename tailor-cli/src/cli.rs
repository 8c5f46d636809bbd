//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_FILE_NAME;

/// Tailor CLI - Schema migrations for Tailor Platform
#[derive(Parser, Debug)]
#[command(name = "tailor")]
#[command(version)]
#[command(about = "Tailor CLI - Schema migrations for Tailor Platform", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the project configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Database migration commands
    Migrate(MigrateArgs),

    /// Display version information
    Version,
}

// =============================================================================
// Migrate Command
// =============================================================================

/// Arguments for the `migrate` command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateSubcommand,
}

/// Migrate subcommands
#[derive(Subcommand, Debug)]
pub enum MigrateSubcommand {
    /// Generate the next migration from local type definitions
    Generate(MigrateGenerateArgs),

    /// Show local and remote migration status
    Status(MigrateStatusArgs),

    /// Check migration directories for structural problems
    Validate(NamespaceArgs),

    /// Apply pending migrations to the workspace
    Apply(MigrateApplyArgs),
}

/// Namespace selection shared by several subcommands
#[derive(Args, Debug, Default)]
pub struct NamespaceArgs {
    /// Database namespace (required when several are configured)
    #[arg(short, long)]
    pub namespace: Option<String>,
}

/// Platform access shared by subcommands that talk to the workspace
#[derive(Args, Debug, Default)]
pub struct PlatformArgs {
    /// Platform access token
    #[arg(long, env = "TAILOR_PLATFORM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Arguments for `migrate generate`
#[derive(Args, Debug)]
pub struct MigrateGenerateArgs {
    #[command(flatten)]
    pub namespace: NamespaceArgs,

    /// Description stored in the generated diff
    #[arg(short, long)]
    pub description: Option<String>,
}

/// Arguments for `migrate status`
#[derive(Args, Debug)]
pub struct MigrateStatusArgs {
    #[command(flatten)]
    pub namespace: NamespaceArgs,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

/// Arguments for `migrate apply`
#[derive(Args, Debug)]
pub struct MigrateApplyArgs {
    /// Show pending migrations without applying them
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}
