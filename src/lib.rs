//! # Tailor SDK
//!
//! Rust tooling for Tailor Platform.
//!
//! The SDK currently provides schema migrations for TailorDB namespaces:
//! - Snapshots of the local type model and diffs between them
//! - A numbered, per-namespace migration chain on disk
//! - Breaking-change detection with data-migration script scaffolds
//! - Applying pending migrations against a remote checkpoint
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tailor_sdk::migrate::{MigrationGenerator, LocalType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tailor_sdk::migrate::MigrationError> {
//!     let types: Vec<LocalType> = serde_json::from_str(include_str!("types/main.json")).unwrap();
//!     let generator = MigrationGenerator::new("main", "migrations/main");
//!     let outcome = generator.generate(&types, None).await?;
//!     println!("{:?}", outcome.number());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schema migrations.
pub mod migrate {
    pub use tailor_migrate::*;
}

// Re-export key types at the crate root
pub use tailor_migrate::{MigrateResult, MigrationConfig, MigrationEngine, MigrationError};
