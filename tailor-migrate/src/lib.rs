//! # tailor-migrate
//!
//! Schema migrations for Tailor Platform database namespaces.
//!
//! This crate provides functionality for:
//! - Building schema snapshots from the local type model
//! - Diffing snapshots and classifying breaking changes
//! - Migration file management on the filesystem
//! - Rebuilding the latest schema state by folding diffs onto the initial snapshot
//! - Structural validation of a migrations directory
//! - Detecting and applying migrations against a remote checkpoint
//!
//! ## Architecture
//!
//! Each namespace owns a directory of numbered migrations. Number `0000` holds
//! the full initial snapshot; every later number holds a diff against the state
//! before it, plus an optional data-migration script.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Local Types  │────▶│ Snapshot Differ│────▶│ diff.json   │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                              ▲                     │
//!                              │                     ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Reconstructor  │◀────│ Migrations  │
//!                      └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//!                                            ┌─────────────┐
//!                                            │ Remote Label│
//!                                            └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tailor_migrate::{MigrationConfig, MigrationEngine, NamespaceMigrations};
//!
//! async fn run(remote: impl tailor_migrate::RemoteService) -> tailor_migrate::MigrateResult<()> {
//!     let config = MigrationConfig::from_env()?
//!         .workspace_id("ws-1")
//!         .namespace(NamespaceMigrations::new("main", "./migrations/main"));
//!     let engine = MigrationEngine::new(config, remote);
//!
//!     let plan = engine.plan().await?;
//!     println!("Plan: {}", plan.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! migrations/main/
//! ├── 0000/
//! │   └── schema.json
//! ├── 0001/
//! │   └── diff.json
//! └── 0002/
//!     ├── diff.json
//!     ├── migrate.ts     # data migration, when the diff is breaking
//!     └── db.ts          # types the script sees
//! ```

pub mod diff;
pub mod engine;
pub mod error;
pub mod file;
pub mod generate;
pub mod label;
pub mod reconstruct;
pub mod remote;
pub mod snapshot;
pub mod validate;

// Re-exports
pub use diff::{
    BreakingChangeInfo, BreakingChangeKind, DiffChange, MigrationDiff,
    compare_local_types_with_snapshot, compare_snapshots,
};
pub use engine::{MigrationConfig, MigrationEngine, MigrationPlan, MigrationResult, MigrationStatus};
pub use error::{MigrateResult, MigrationError};
pub use file::{MigrationFileEntry, MigrationFileKind, MigrationFileManager};
pub use generate::{GenerateOutcome, MigrationGenerator};
pub use label::{
    MIGRATION_LABEL_KEY, format_migration_label, namespace_trn, parse_migration_label,
    workspace_trn,
};
pub use reconstruct::{MigrationChain, reconstruct_snapshot_from_migrations};
pub use remote::{
    APPLY_MIGRATION_VERSION_ENV, ApplyReport, BundledScript, Metadata, NamespaceMigrations,
    PendingMigration, RemoteService, ScriptBundler, ScriptExecutor, ScriptOutcome,
    detect_pending_migrations, execute_pending_migrations, update_migration_label,
};
pub use snapshot::{
    INITIAL_MIGRATION_NUMBER, LocalFieldConfig, LocalType, ScalarKind, SchemaSnapshot,
    SnapshotFieldConfig, SnapshotType,
};
pub use validate::{
    MigrationValidationError, ValidationErrorKind, assert_valid_migration_files,
    validate_migration_files,
};
