//! Snapshot diffing and breaking-change classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;
use crate::snapshot::{LocalType, ScalarKind, SchemaSnapshot, SnapshotFieldConfig, SnapshotType};

/// A single structural change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DiffChange {
    TypeAdded {
        type_name: String,
        after: SnapshotType,
    },
    TypeRemoved {
        type_name: String,
        before: SnapshotType,
    },
    FieldAdded {
        type_name: String,
        field_name: String,
        after: SnapshotFieldConfig,
    },
    FieldRemoved {
        type_name: String,
        field_name: String,
        before: SnapshotFieldConfig,
    },
    FieldModified {
        type_name: String,
        field_name: String,
        before: SnapshotFieldConfig,
        after: SnapshotFieldConfig,
    },
}

impl DiffChange {
    pub fn type_name(&self) -> &str {
        match self {
            Self::TypeAdded { type_name, .. }
            | Self::TypeRemoved { type_name, .. }
            | Self::FieldAdded { type_name, .. }
            | Self::FieldRemoved { type_name, .. }
            | Self::FieldModified { type_name, .. } => type_name,
        }
    }

    /// Field name for field-level changes.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::TypeAdded { .. } | Self::TypeRemoved { .. } => None,
            Self::FieldAdded { field_name, .. }
            | Self::FieldRemoved { field_name, .. }
            | Self::FieldModified { field_name, .. } => Some(field_name),
        }
    }

    /// Kind tag as written in diff files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TypeAdded { .. } => "type_added",
            Self::TypeRemoved { .. } => "type_removed",
            Self::FieldAdded { .. } => "field_added",
            Self::FieldRemoved { .. } => "field_removed",
            Self::FieldModified { .. } => "field_modified",
        }
    }
}

/// Classification of a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingChangeKind {
    RequiredFieldAdded,
    FieldTypeChanged,
    ArrayToSingleValue,
    OptionalToRequired,
    UniqueConstraintAdded,
    EnumValuesRemoved,
}

impl BreakingChangeKind {
    /// Whether automatic migration generation must refuse this change.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::FieldTypeChanged | Self::ArrayToSingleValue)
    }
}

/// A breaking change with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakingChangeInfo {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    pub kind: BreakingChangeKind,
    pub reason: String,
}

/// The delta between two consecutive snapshots of a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDiff {
    /// Migration number this diff produces.
    pub version: u32,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub changes: Vec<DiffChange>,
    pub has_breaking_changes: bool,
    pub breaking_changes: Vec<BreakingChangeInfo>,
    pub requires_migration_script: bool,
}

impl MigrationDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Breaking changes that automatic generation cannot handle.
    pub fn unsupported_changes(&self) -> impl Iterator<Item = &BreakingChangeInfo> {
        self.breaking_changes
            .iter()
            .filter(|b| b.kind.is_unsupported())
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let count = |kind: &str| self.changes.iter().filter(|c| c.kind() == kind).count();
        let mut parts = Vec::new();

        for (kind, noun, verb) in [
            ("type_added", "type", "added"),
            ("type_removed", "type", "removed"),
            ("field_added", "field", "added"),
            ("field_removed", "field", "removed"),
            ("field_modified", "field", "modified"),
        ] {
            match count(kind) {
                0 => {}
                1 => parts.push(format!("1 {} {}", noun, verb)),
                n => parts.push(format!("{} {}s {}", n, noun, verb)),
            }
        }

        if parts.is_empty() {
            return "No changes".to_string();
        }
        if self.has_breaking_changes {
            parts.push(format!("{} breaking", self.breaking_changes.len()));
        }
        parts.join(", ")
    }
}

/// Compare two snapshots. `before` is always `previous`, `after` always `current`.
pub fn compare_snapshots(previous: &SchemaSnapshot, current: &SchemaSnapshot) -> MigrationDiff {
    let mut changes = Vec::new();
    let mut breaking = Vec::new();

    for (name, ty) in &current.types {
        if !previous.types.contains_key(name) {
            changes.push(DiffChange::TypeAdded {
                type_name: name.clone(),
                after: ty.clone(),
            });
        }
    }

    for (name, ty) in &previous.types {
        if !current.types.contains_key(name) {
            changes.push(DiffChange::TypeRemoved {
                type_name: name.clone(),
                before: ty.clone(),
            });
        }
    }

    for (name, current_type) in &current.types {
        if let Some(previous_type) = previous.types.get(name) {
            diff_fields(previous_type, current_type, &mut changes, &mut breaking);
        }
    }

    MigrationDiff {
        version: current.version,
        namespace: current.namespace.clone(),
        created_at: current.created_at,
        description: None,
        changes,
        has_breaking_changes: !breaking.is_empty(),
        requires_migration_script: !breaking.is_empty(),
        breaking_changes: breaking,
    }
}

/// Build a transient snapshot from local types and compare it with `previous`.
pub fn compare_local_types_with_snapshot(
    previous: &SchemaSnapshot,
    local_types: &[LocalType],
    namespace: &str,
) -> MigrateResult<MigrationDiff> {
    let current = SchemaSnapshot::from_local_types(namespace, previous.version + 1, local_types)?;
    Ok(compare_snapshots(previous, &current))
}

fn diff_fields(
    previous: &SnapshotType,
    current: &SnapshotType,
    changes: &mut Vec<DiffChange>,
    breaking: &mut Vec<BreakingChangeInfo>,
) {
    let type_name = &current.name;

    for (field_name, after) in &current.fields {
        match previous.fields.get(field_name) {
            None => {
                if after.required {
                    breaking.push(BreakingChangeInfo {
                        type_name: type_name.clone(),
                        field_name: Some(field_name.clone()),
                        kind: BreakingChangeKind::RequiredFieldAdded,
                        reason: "Required field added".to_string(),
                    });
                }
                changes.push(DiffChange::FieldAdded {
                    type_name: type_name.clone(),
                    field_name: field_name.clone(),
                    after: after.clone(),
                });
            }
            Some(before) if !before.same_as(after) => {
                if let Some((kind, reason)) = classify_modification(before, after) {
                    breaking.push(BreakingChangeInfo {
                        type_name: type_name.clone(),
                        field_name: Some(field_name.clone()),
                        kind,
                        reason,
                    });
                }
                changes.push(DiffChange::FieldModified {
                    type_name: type_name.clone(),
                    field_name: field_name.clone(),
                    before: before.clone(),
                    after: after.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (field_name, before) in &previous.fields {
        if !current.fields.contains_key(field_name) {
            changes.push(DiffChange::FieldRemoved {
                type_name: type_name.clone(),
                field_name: field_name.clone(),
                before: before.clone(),
            });
        }
    }
}

/// First matching rule wins. Only array-to-single is special-cased for
/// the array flag; single-to-array falls through to the remaining rules.
fn classify_modification(
    before: &SnapshotFieldConfig,
    after: &SnapshotFieldConfig,
) -> Option<(BreakingChangeKind, String)> {
    if before.kind != after.kind {
        return Some((
            BreakingChangeKind::FieldTypeChanged,
            format!("Field type changed from {} to {}", before.kind, after.kind),
        ));
    }

    if before.is_array() && !after.is_array() {
        return Some((
            BreakingChangeKind::ArrayToSingleValue,
            "Field changed from array to single value".to_string(),
        ));
    }

    if !before.required && after.required {
        return Some((
            BreakingChangeKind::OptionalToRequired,
            "Field changed from optional to required".to_string(),
        ));
    }

    if !before.is_unique() && after.is_unique() {
        return Some((
            BreakingChangeKind::UniqueConstraintAdded,
            "Unique constraint added".to_string(),
        ));
    }

    if before.kind == ScalarKind::Enum && after.kind == ScalarKind::Enum {
        let removed: Vec<&str> = before
            .allowed()
            .iter()
            .filter(|v| !after.allowed().contains(*v))
            .map(String::as_str)
            .collect();
        if !removed.is_empty() {
            return Some((
                BreakingChangeKind::EnumValuesRemoved,
                format!("Enum values removed: {}", removed.join(", ")),
            ));
        }
    }

    None
}
