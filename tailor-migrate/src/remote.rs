//! Remote reconciliation: pending-migration detection and execution.
//!
//! The remote keeps one checkpoint label per namespace recording the highest
//! migration number applied. Pending migrations are the local diffs above that
//! checkpoint; they are executed one at a time, and the checkpoint is advanced
//! after each success.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diff::MigrationDiff;
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFileKind, MigrationFileManager};
use crate::label::{
    MIGRATION_LABEL_KEY, format_migration_label, namespace_trn, parse_migration_label,
};

/// Environment variable capping which migrations are applied in one run.
pub const APPLY_MIGRATION_VERSION_ENV: &str = "TAILOR_APPLY_MIGRATION_VERSION";

/// Metadata attached to a remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Remote metadata operations.
#[async_trait::async_trait]
pub trait RemoteService: Send + Sync {
    /// Read a resource's metadata. `None` when the resource has none.
    async fn get_metadata(&self, trn: &str) -> MigrateResult<Option<Metadata>>;

    /// Replace a resource's labels.
    async fn set_metadata(&self, trn: &str, labels: BTreeMap<String, String>) -> MigrateResult<()>;
}

/// A migration script packaged for remote execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledScript {
    pub namespace: String,
    pub migration_number: u32,
    pub bundled_code: String,
}

/// Packages a migration script into executable code.
#[async_trait::async_trait]
pub trait ScriptBundler: Send + Sync {
    async fn bundle(
        &self,
        source: &Path,
        namespace: &str,
        migration_number: u32,
    ) -> MigrateResult<BundledScript>;
}

/// Outcome of a remote script execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Every statement committed.
    Committed,
    /// The transaction rolled back.
    Failed(String),
}

/// Runs bundled scripts remotely inside a single transaction.
#[async_trait::async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script: &BundledScript) -> MigrateResult<ScriptOutcome>;
}

/// A namespace that has a local migrations directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMigrations {
    pub namespace: String,
    pub migrations_dir: PathBuf,
}

impl NamespaceMigrations {
    pub fn new(namespace: impl Into<String>, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn file_manager(&self) -> MigrationFileManager {
        MigrationFileManager::new(&self.migrations_dir)
    }
}

/// A local migration not yet applied remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMigration {
    pub namespace: String,
    pub number: u32,
    pub diff: MigrationDiff,
    /// Script to run before advancing the checkpoint, if any.
    pub script_path: Option<PathBuf>,
}

/// Result of executing pending migrations.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// `(namespace, number)` of every applied migration, in order.
    pub applied: Vec<(String, u32)>,
    /// How many of them ran a script.
    pub scripts_executed: usize,
}

impl ApplyReport {
    pub fn summary(&self) -> String {
        if self.applied.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!(
                "{} applied ({} with scripts)",
                self.applied.len(),
                self.scripts_executed
            )
        }
    }
}

/// Parse a version ceiling value.
pub fn parse_version_ceiling(raw: Option<&str>) -> MigrateResult<Option<u32>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| MigrationError::InvalidVersion(value.to_string())),
    }
}

/// Read the version ceiling from `TAILOR_APPLY_MIGRATION_VERSION`.
pub fn version_ceiling_from_env() -> MigrateResult<Option<u32>> {
    parse_version_ceiling(std::env::var(APPLY_MIGRATION_VERSION_ENV).ok().as_deref())
}

/// Read the applied-migration checkpoint of a namespace. Missing means 0.
pub async fn read_migration_checkpoint<R: RemoteService + ?Sized>(
    remote: &R,
    workspace_id: &str,
    namespace: &str,
) -> MigrateResult<u32> {
    let trn = namespace_trn(workspace_id, namespace);
    let metadata = remote.get_metadata(&trn).await?;
    let checkpoint = metadata
        .as_ref()
        .and_then(|m| m.labels.get(MIGRATION_LABEL_KEY))
        .and_then(|value| parse_migration_label(value))
        .unwrap_or(0);
    debug!(trn = %trn, checkpoint, "Read migration checkpoint");
    Ok(checkpoint)
}

/// Find migrations above each namespace's remote checkpoint.
///
/// Ordered by namespace name, then migration number. A migration that requires
/// a script but has none is skipped with a warning.
pub async fn detect_pending_migrations<R: RemoteService + ?Sized>(
    remote: &R,
    workspace_id: &str,
    namespaces: &[NamespaceMigrations],
    ceiling: Option<u32>,
) -> MigrateResult<Vec<PendingMigration>> {
    let mut pending = Vec::new();

    for ns in namespaces {
        let checkpoint = read_migration_checkpoint(remote, workspace_id, &ns.namespace).await?;
        let manager = ns.file_manager();

        for file in manager.get_migration_files().await? {
            if file.kind != MigrationFileKind::Diff || file.number <= checkpoint {
                continue;
            }
            if ceiling.is_some_and(|max| file.number > max) {
                continue;
            }

            let diff = manager.read_diff(file.number).await?;
            let script = manager.file_path(file.number, MigrationFileKind::Migrate);
            let has_script = tokio::fs::try_exists(&script).await?;

            if diff.requires_migration_script && !has_script {
                warn!(
                    namespace = %ns.namespace,
                    migration = file.number,
                    path = %script.display(),
                    "Migration requires a script but none was found, skipping"
                );
                continue;
            }

            pending.push(PendingMigration {
                namespace: ns.namespace.clone(),
                number: file.number,
                diff,
                script_path: has_script.then_some(script),
            });
        }
    }

    pending.sort_by(|a, b| a.namespace.cmp(&b.namespace).then(a.number.cmp(&b.number)));
    Ok(pending)
}

/// Set a namespace's checkpoint label, keeping every other label.
pub async fn update_migration_label<R: RemoteService + ?Sized>(
    remote: &R,
    workspace_id: &str,
    namespace: &str,
    number: u32,
) -> MigrateResult<()> {
    let value = format_migration_label(number)?;
    let trn = namespace_trn(workspace_id, namespace);

    let mut labels = remote
        .get_metadata(&trn)
        .await?
        .map(|m| m.labels)
        .unwrap_or_default();
    labels.insert(MIGRATION_LABEL_KEY.to_string(), value);

    remote.set_metadata(&trn, labels).await?;
    debug!(trn = %trn, number, "Updated migration checkpoint");
    Ok(())
}

/// Execute pending migrations in order, advancing the checkpoint after each.
///
/// Stops at the first failure; the checkpoint then stays at the last
/// successful migration.
pub async fn execute_pending_migrations<R, B, E>(
    remote: &R,
    bundler: &B,
    executor: &E,
    workspace_id: &str,
    pending: &[PendingMigration],
) -> MigrateResult<ApplyReport>
where
    R: RemoteService + ?Sized,
    B: ScriptBundler + ?Sized,
    E: ScriptExecutor + ?Sized,
{
    let mut report = ApplyReport::default();

    for migration in pending {
        if let Some(script_path) = &migration.script_path {
            let bundled = bundler
                .bundle(script_path, &migration.namespace, migration.number)
                .await?;

            match executor.execute(&bundled).await? {
                ScriptOutcome::Committed => {
                    report.scripts_executed += 1;
                }
                ScriptOutcome::Failed(message) => {
                    return Err(MigrationError::ScriptFailed {
                        namespace: migration.namespace.clone(),
                        number: migration.number,
                        message,
                    });
                }
            }
        }

        update_migration_label(remote, workspace_id, &migration.namespace, migration.number)
            .await?;
        info!(
            namespace = %migration.namespace,
            migration = migration.number,
            "Applied migration"
        );
        report
            .applied
            .push((migration.namespace.clone(), migration.number));
    }

    Ok(report)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes for the remote traits.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeRemote {
        pub metadata: Mutex<BTreeMap<String, Metadata>>,
        pub writes: Mutex<Vec<(String, BTreeMap<String, String>)>>,
        /// Checkpoint value whose write is refused.
        pub reject_label: Option<String>,
    }

    impl FakeRemote {
        pub fn rejecting(mut self, value: &str) -> Self {
            self.reject_label = Some(value.to_string());
            self
        }

        pub fn with_label(self, trn: &str, key: &str, value: &str) -> Self {
            self.metadata
                .lock()
                .unwrap()
                .entry(trn.to_string())
                .or_default()
                .labels
                .insert(key.to_string(), value.to_string());
            self
        }

        pub fn label(&self, trn: &str, key: &str) -> Option<String> {
            self.metadata
                .lock()
                .unwrap()
                .get(trn)
                .and_then(|m| m.labels.get(key).cloned())
        }
    }

    #[async_trait::async_trait]
    impl RemoteService for FakeRemote {
        async fn get_metadata(&self, trn: &str) -> MigrateResult<Option<Metadata>> {
            Ok(self.metadata.lock().unwrap().get(trn).cloned())
        }

        async fn set_metadata(
            &self,
            trn: &str,
            labels: BTreeMap<String, String>,
        ) -> MigrateResult<()> {
            if self.reject_label.is_some()
                && labels.get(MIGRATION_LABEL_KEY) == self.reject_label.as_ref()
            {
                return Err(MigrationError::remote("SetMetadata: service unavailable"));
            }
            self.writes
                .lock()
                .unwrap()
                .push((trn.to_string(), labels.clone()));
            self.metadata
                .lock()
                .unwrap()
                .insert(trn.to_string(), Metadata { labels });
            Ok(())
        }
    }

    pub struct PassthroughBundler;

    #[async_trait::async_trait]
    impl ScriptBundler for PassthroughBundler {
        async fn bundle(
            &self,
            source: &Path,
            namespace: &str,
            migration_number: u32,
        ) -> MigrateResult<BundledScript> {
            Ok(BundledScript {
                namespace: namespace.to_string(),
                migration_number,
                bundled_code: tokio::fs::read_to_string(source).await?,
            })
        }
    }

    /// Fails scripts whose code contains `FAIL`; errors on `UNREACHABLE`.
    #[derive(Default)]
    pub struct RecordingExecutor {
        pub executed: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait::async_trait]
    impl ScriptExecutor for RecordingExecutor {
        async fn execute(&self, script: &BundledScript) -> MigrateResult<ScriptOutcome> {
            self.executed
                .lock()
                .unwrap()
                .push((script.namespace.clone(), script.migration_number));
            if script.bundled_code.contains("UNREACHABLE") {
                Err(MigrationError::remote("ExecuteScript: connection reset"))
            } else if script.bundled_code.contains("FAIL") {
                Ok(ScriptOutcome::Failed("script threw".to_string()))
            } else {
                Ok(ScriptOutcome::Committed)
            }
        }
    }
}
