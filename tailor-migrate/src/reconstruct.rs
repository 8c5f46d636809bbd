//! Snapshot reconstruction from a migration chain.

use std::collections::BTreeMap;
use std::path::Path;

use crate::diff::{DiffChange, MigrationDiff};
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFileKind, MigrationFileManager};
use crate::snapshot::{INITIAL_MIGRATION_NUMBER, SchemaSnapshot, SnapshotType};

/// One loaded entry of a migration chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEntry {
    Snapshot(SchemaSnapshot),
    Diff(MigrationDiff),
}

/// A namespace's migrations held in memory, keyed by number.
#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    entries: BTreeMap<u32, ChainEntry>,
}

impl MigrationChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the initial snapshot and every diff in one directory scan.
    pub async fn load(manager: &MigrationFileManager) -> MigrateResult<Self> {
        let mut chain = Self::new();

        for file in manager.get_migration_files().await? {
            match file.kind {
                MigrationFileKind::Schema if file.number == INITIAL_MIGRATION_NUMBER => {
                    let snapshot = manager.read_snapshot(file.number).await?;
                    chain.insert(file.number, ChainEntry::Snapshot(snapshot));
                }
                MigrationFileKind::Diff if file.number != INITIAL_MIGRATION_NUMBER => {
                    let diff = manager.read_diff(file.number).await?;
                    chain.insert(file.number, ChainEntry::Diff(diff));
                }
                // Misplaced artifacts are reported by the validator.
                _ => {}
            }
        }

        Ok(chain)
    }

    pub fn insert(&mut self, number: u32, entry: ChainEntry) {
        self.entries.insert(number, entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest_number(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    /// Diffs in ascending order, skipping the initial snapshot.
    pub fn diffs(&self) -> impl Iterator<Item = (u32, &MigrationDiff)> {
        self.entries.iter().filter_map(|(number, entry)| match entry {
            ChainEntry::Diff(diff) => Some((*number, diff)),
            ChainEntry::Snapshot(_) => None,
        })
    }

    pub fn diff(&self, number: u32) -> Option<&MigrationDiff> {
        match self.entries.get(&number) {
            Some(ChainEntry::Diff(diff)) => Some(diff),
            _ => None,
        }
    }

    /// Fold every diff onto the initial snapshot.
    pub fn reconstruct(&self) -> MigrateResult<Option<SchemaSnapshot>> {
        self.reconstruct_up_to(u32::MAX)
    }

    /// Fold diffs numbered up to and including `limit`.
    pub fn reconstruct_up_to(&self, limit: u32) -> MigrateResult<Option<SchemaSnapshot>> {
        let Some(ChainEntry::Snapshot(base)) = self.entries.get(&INITIAL_MIGRATION_NUMBER) else {
            return Ok(None);
        };

        let mut snapshot = base.clone();
        for (number, diff) in self.diffs().take_while(|(number, _)| *number <= limit) {
            apply_diff(&mut snapshot, number, diff)?;
        }
        Ok(Some(snapshot))
    }
}

/// Apply one diff's changes, in stored order, to a snapshot.
pub fn apply_diff(
    snapshot: &mut SchemaSnapshot,
    number: u32,
    diff: &MigrationDiff,
) -> MigrateResult<()> {
    for change in &diff.changes {
        match change {
            DiffChange::TypeAdded { type_name, after } => {
                snapshot.types.insert(type_name.clone(), after.clone());
            }
            DiffChange::TypeRemoved { type_name, .. } => {
                snapshot.types.shift_remove(type_name);
            }
            DiffChange::FieldAdded {
                type_name,
                field_name,
                after,
            }
            | DiffChange::FieldModified {
                type_name,
                field_name,
                after,
                ..
            } => {
                existing_type(snapshot, number, change, type_name, field_name)?
                    .fields
                    .insert(field_name.clone(), after.clone());
            }
            DiffChange::FieldRemoved {
                type_name,
                field_name,
                ..
            } => {
                existing_type(snapshot, number, change, type_name, field_name)?
                    .fields
                    .shift_remove(field_name);
            }
        }
    }

    snapshot.version = diff.version;
    snapshot.created_at = diff.created_at;
    Ok(())
}

/// Field-level changes must target a type the chain has already created.
fn existing_type<'a>(
    snapshot: &'a mut SchemaSnapshot,
    number: u32,
    change: &DiffChange,
    type_name: &str,
    field_name: &str,
) -> MigrateResult<&'a mut SnapshotType> {
    snapshot.types.get_mut(type_name).ok_or_else(|| {
        MigrationError::corrupt_chain(
            number,
            format!(
                "{} on {}.{}: type does not exist",
                change.kind(),
                type_name,
                field_name
            ),
        )
    })
}

/// Reconstruct the current snapshot of a migrations directory.
///
/// Returns `None` when no initial snapshot exists yet.
pub async fn reconstruct_snapshot_from_migrations(
    dir: impl AsRef<Path>,
) -> MigrateResult<Option<SchemaSnapshot>> {
    let manager = MigrationFileManager::new(dir.as_ref());
    MigrationChain::load(&manager).await?.reconstruct()
}
