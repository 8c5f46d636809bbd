//! Migration generation from the local type model.

use std::fmt::Write as _;
use std::path::PathBuf;

use tracing::info;

use crate::diff::{BreakingChangeKind, MigrationDiff, compare_snapshots};
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFileKind, MigrationFileManager};
use crate::reconstruct::MigrationChain;
use crate::snapshot::{
    INITIAL_MIGRATION_NUMBER, LocalType, ScalarKind, SchemaSnapshot, SnapshotFieldConfig,
};
use crate::validate::validate_entries;

/// What a generation run produced.
#[derive(Debug)]
pub enum GenerateOutcome {
    /// The first migration: a full snapshot.
    Initial { number: u32, path: PathBuf },
    /// A diff against the reconstructed previous state.
    Diff {
        number: u32,
        path: PathBuf,
        diff: MigrationDiff,
        /// `migrate.ts` and `db.ts`, when the diff needs a data migration.
        script_paths: Option<(PathBuf, PathBuf)>,
    },
    /// Local types match the latest migration.
    NoChanges,
}

impl GenerateOutcome {
    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Initial { number, .. } | Self::Diff { number, .. } => Some(*number),
            Self::NoChanges => None,
        }
    }
}

/// Generates migrations for one namespace.
#[derive(Debug, Clone)]
pub struct MigrationGenerator {
    namespace: String,
    files: MigrationFileManager,
}

impl MigrationGenerator {
    pub fn new(namespace: impl Into<String>, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            files: MigrationFileManager::new(migrations_dir),
        }
    }

    pub fn files(&self) -> &MigrationFileManager {
        &self.files
    }

    /// Compare local types with the migration chain and write the next migration.
    ///
    /// Nothing is written when the chain is malformed, when nothing changed, or
    /// when a change cannot be migrated automatically.
    pub async fn generate(
        &self,
        local_types: &[LocalType],
        description: Option<String>,
    ) -> MigrateResult<GenerateOutcome> {
        let entries = self.files.get_migration_files().await?;
        let errors = validate_entries(&entries);
        if !errors.is_empty() {
            return Err(MigrationError::InvalidMigrationFiles {
                namespace: self.namespace.clone(),
                errors,
            });
        }

        let chain = MigrationChain::load(&self.files).await?;
        let Some(previous) = chain.reconstruct()? else {
            return self.write_initial(local_types).await;
        };

        let number = self.files.get_next_migration_number().await?;
        let current = SchemaSnapshot::from_local_types(&self.namespace, number, local_types)?;
        let diff = compare_snapshots(&previous, &current).with_description(description);

        if diff.is_empty() {
            return Ok(GenerateOutcome::NoChanges);
        }

        if let Some(unsupported) = diff.unsupported_changes().next() {
            return Err(MigrationError::UnsupportedChange {
                type_name: unsupported.type_name.clone(),
                field_name: unsupported.field_name.clone().unwrap_or_default(),
                reason: unsupported.reason.clone(),
            });
        }

        self.files.assert_absent(number, MigrationFileKind::Diff).await?;
        if diff.requires_migration_script {
            self.files.assert_absent(number, MigrationFileKind::Migrate).await?;
            self.files.assert_absent(number, MigrationFileKind::Db).await?;
        }
        let path = self.files.write_diff(number, &diff).await?;

        let script_paths = if diff.requires_migration_script {
            let script = self
                .files
                .write_text(number, MigrationFileKind::Migrate, &render_migration_script(&diff))
                .await?;
            let db = self
                .files
                .write_text(number, MigrationFileKind::Db, &render_db_types(&previous, &diff))
                .await?;
            Some((script, db))
        } else {
            None
        };

        info!(
            namespace = %self.namespace,
            migration = number,
            summary = %diff.summary(),
            "Generated migration"
        );

        Ok(GenerateOutcome::Diff {
            number,
            path,
            diff,
            script_paths,
        })
    }

    async fn write_initial(&self, local_types: &[LocalType]) -> MigrateResult<GenerateOutcome> {
        let number = INITIAL_MIGRATION_NUMBER;
        let snapshot = SchemaSnapshot::from_local_types(&self.namespace, number, local_types)?;

        self.files.assert_absent(number, MigrationFileKind::Schema).await?;
        let path = self.files.write_snapshot(number, &snapshot).await?;

        info!(
            namespace = %self.namespace,
            types = snapshot.types.len(),
            "Generated initial schema snapshot"
        );
        Ok(GenerateOutcome::Initial { number, path })
    }
}

/// Scaffold for a data-migration script, one commented placeholder per
/// breaking change.
///
/// The body throws until it is edited, so an unedited scaffold never commits.
pub fn render_migration_script(diff: &MigrationDiff) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "import type {{ Transaction }} from \"./db\";");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "// Data migration {:04} for namespace \"{}\".",
        diff.version, diff.namespace
    );
    if let Some(description) = &diff.description {
        let _ = writeln!(out, "// {}", description);
    }
    let _ = writeln!(
        out,
        "// Every statement runs in one transaction; throwing rolls all of them back."
    );
    let _ = writeln!(out, "export async function main(trx: Transaction): Promise<void> {{");

    for change in &diff.breaking_changes {
        let field = change.field_name.as_deref().unwrap_or_default();
        let _ = writeln!(out, "  // {}.{}: {}", change.type_name, field, change.reason);
        let _ = writeln!(out, "  // TODO: {}", script_hint(change.kind, field));
        if let Some(example) = script_example(change.kind, &change.type_name, field) {
            let _ = writeln!(out, "  // {}", example);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(
        out,
        "  throw new Error(\"Data migration {:04} is not implemented\");",
        diff.version
    );
    let _ = writeln!(out, "}}");
    out
}

fn script_hint(kind: BreakingChangeKind, field: &str) -> String {
    match kind {
        BreakingChangeKind::RequiredFieldAdded | BreakingChangeKind::OptionalToRequired => {
            format!("set a value for \"{}\" on rows where it is null", field)
        }
        BreakingChangeKind::UniqueConstraintAdded => {
            format!("deduplicate existing values of \"{}\"", field)
        }
        BreakingChangeKind::EnumValuesRemoved => {
            format!("move rows off the removed values of \"{}\"", field)
        }
        BreakingChangeKind::FieldTypeChanged | BreakingChangeKind::ArrayToSingleValue => {
            format!("convert existing values of \"{}\"", field)
        }
    }
}

/// Example statement, only for changes a single back-fill can resolve.
fn script_example(kind: BreakingChangeKind, type_name: &str, field: &str) -> Option<String> {
    match kind {
        BreakingChangeKind::RequiredFieldAdded | BreakingChangeKind::OptionalToRequired => {
            Some(format!(
                "await trx.updateTable(\"{type_name}\").set({{ {field}: /* value */ }})\
                 .where(\"{field}\", \"is\", null).execute();"
            ))
        }
        _ => None,
    }
}

/// TypeScript types the script sees: the previous state plus added fields as optional.
pub fn render_db_types(previous: &SchemaSnapshot, diff: &MigrationDiff) -> String {
    let mut state = previous.clone();
    for change in &diff.changes {
        if let crate::diff::DiffChange::FieldAdded {
            type_name,
            field_name,
            after,
        } = change
        {
            if let Some(ty) = state.types.get_mut(type_name) {
                let mut optional = after.clone();
                optional.required = false;
                ty.fields.insert(field_name.clone(), optional);
            }
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "// Generated for migration {:04}. Do not edit.", diff.version);
    let _ = writeln!(out);
    for ty in state.types.values() {
        let _ = writeln!(out, "export interface {} {{", ty.name);
        let _ = writeln!(out, "  id: string;");
        for (name, field) in &ty.fields {
            let optional = if field.required { "" } else { "?" };
            let _ = writeln!(out, "  {}{}: {};", name, optional, ts_type(field));
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "export interface DB {{");
    for name in state.types.keys() {
        let _ = writeln!(out, "  {}: {};", name, name);
    }
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "export type {{ Transaction }} from \"@tailor-platform/sdk\";");
    out
}

fn ts_type(field: &SnapshotFieldConfig) -> String {
    let base = match field.kind {
        ScalarKind::String
        | ScalarKind::Uuid
        | ScalarKind::Date
        | ScalarKind::Datetime
        | ScalarKind::Time => "string".to_string(),
        ScalarKind::Integer | ScalarKind::Float => "number".to_string(),
        ScalarKind::Boolean => "boolean".to_string(),
        ScalarKind::Enum => field
            .allowed()
            .iter()
            .map(|v| format!("\"{}\"", v))
            .collect::<Vec<_>>()
            .join(" | "),
        ScalarKind::Nested => "Record<string, unknown>".to_string(),
    };

    match (field.is_array(), field.kind) {
        (true, ScalarKind::Enum) => format!("({})[]", base),
        (true, _) => format!("{}[]", base),
        (false, _) => base,
    }
}
