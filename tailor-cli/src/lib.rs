//! Tailor CLI - Command-line interface for the Tailor Platform SDK.
//!
//! This crate provides the CLI tool for managing TailorDB schema migrations:
//! generating migrations from local types, validating migration directories,
//! and applying pending migrations to a workspace.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod remote;
