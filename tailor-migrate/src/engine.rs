//! Migration engine facade.

use std::time::Instant;

use tracing::info;

use crate::error::{MigrateResult, MigrationError};
use crate::generate::{GenerateOutcome, MigrationGenerator};
use crate::reconstruct::MigrationChain;
use crate::remote::{
    ApplyReport, NamespaceMigrations, PendingMigration, RemoteService, ScriptBundler,
    ScriptExecutor, detect_pending_migrations, execute_pending_migrations,
    read_migration_checkpoint, version_ceiling_from_env,
};
use crate::snapshot::LocalType;
use crate::validate::{
    MigrationValidationError, assert_valid_migration_files, validate_migration_files,
};

/// Configuration for the migration engine.
#[derive(Debug, Clone, Default)]
pub struct MigrationConfig {
    /// Workspace whose namespaces are migrated.
    pub workspace_id: String,
    /// Namespaces with a local migrations directory.
    pub namespaces: Vec<NamespaceMigrations>,
    /// Highest migration number to apply in one run.
    pub apply_version: Option<u32>,
    /// Report pending migrations without applying them.
    pub dry_run: bool,
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with the version ceiling read from the environment.
    pub fn from_env() -> MigrateResult<Self> {
        Ok(Self {
            apply_version: version_ceiling_from_env()?,
            ..Self::default()
        })
    }

    /// Set the workspace ID.
    pub fn workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    /// Add a namespace and its migrations directory.
    pub fn namespace(mut self, namespace: NamespaceMigrations) -> Self {
        self.namespaces.push(namespace);
        self
    }

    /// Cap the applied migrations at `version`.
    pub fn apply_version(mut self, version: Option<u32>) -> Self {
        self.apply_version = version;
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Local and remote state of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub namespace: String,
    /// Highest local migration number, if any migration exists.
    pub latest_number: Option<u32>,
    /// Number of schema and diff artifacts.
    pub file_count: usize,
    /// Types in the reconstructed latest snapshot.
    pub type_count: usize,
    /// Types as of the remote checkpoint.
    pub applied_type_count: usize,
    /// Highest migration number applied remotely.
    pub remote_checkpoint: u32,
    /// Local migrations above the checkpoint, in order.
    pub pending: Vec<u32>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Migrations an apply run would execute.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    pub pending: Vec<PendingMigration>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn scripts(&self) -> usize {
        self.pending.iter().filter(|m| m.script_path.is_some()).count()
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        if self.pending.is_empty() {
            return "No pending migrations".to_string();
        }
        let mut namespaces: Vec<_> = self.pending.iter().map(|m| m.namespace.as_str()).collect();
        namespaces.dedup();
        format!(
            "{} pending migrations in {} namespaces ({} with scripts)",
            self.pending.len(),
            namespaces.len(),
            self.scripts()
        )
    }
}

/// Result of an apply run.
#[derive(Debug)]
pub struct MigrationResult {
    pub plan: MigrationPlan,
    /// Empty in dry-run mode.
    pub report: ApplyReport,
    pub dry_run: bool,
    pub duration_ms: i64,
}

impl MigrationResult {
    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        if self.dry_run {
            format!("Dry run: {}", self.plan.summary())
        } else {
            format!("{} in {}ms", self.report.summary(), self.duration_ms)
        }
    }
}

/// The main migration engine.
pub struct MigrationEngine<R: RemoteService> {
    config: MigrationConfig,
    remote: R,
}

impl<R: RemoteService> MigrationEngine<R> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, remote: R) -> Self {
        Self { config, remote }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Pick a namespace. With a single configured namespace, `None` selects it.
    pub fn resolve_namespace(&self, name: Option<&str>) -> MigrateResult<&NamespaceMigrations> {
        let namespaces = &self.config.namespaces;
        match name {
            Some(name) => namespaces
                .iter()
                .find(|ns| ns.namespace == name)
                .ok_or_else(|| MigrationError::UnknownNamespace(name.to_string())),
            None => match namespaces.as_slice() {
                [] => Err(MigrationError::other("No namespaces are configured")),
                [only] => Ok(only),
                many => Err(MigrationError::AmbiguousNamespace(
                    many.iter().map(|ns| ns.namespace.clone()).collect(),
                )),
            },
        }
    }

    /// Generate the next migration of a namespace.
    pub async fn generate(
        &self,
        namespace: Option<&str>,
        local_types: &[LocalType],
        description: Option<String>,
    ) -> MigrateResult<GenerateOutcome> {
        let ns = self.resolve_namespace(namespace)?;
        MigrationGenerator::new(&ns.namespace, &ns.migrations_dir)
            .generate(local_types, description)
            .await
    }

    /// Validate one namespace, or all of them when `namespace` is `None`.
    pub async fn validate(
        &self,
        namespace: Option<&str>,
    ) -> MigrateResult<Vec<(String, Vec<MigrationValidationError>)>> {
        let selected: Vec<&NamespaceMigrations> = match namespace {
            Some(_) => vec![self.resolve_namespace(namespace)?],
            None => self.config.namespaces.iter().collect(),
        };

        let mut results = Vec::with_capacity(selected.len());
        for ns in selected {
            let errors = validate_migration_files(&ns.migrations_dir).await?;
            results.push((ns.namespace.clone(), errors));
        }
        Ok(results)
    }

    /// Report local and remote state of a namespace.
    pub async fn status(&self, namespace: Option<&str>) -> MigrateResult<MigrationStatus> {
        let ns = self.resolve_namespace(namespace)?;
        assert_valid_migration_files(&ns.migrations_dir, &ns.namespace).await?;

        let manager = ns.file_manager();
        let files = manager.get_migration_files().await?;
        let chain = MigrationChain::load(&manager).await?;
        let checkpoint =
            read_migration_checkpoint(&self.remote, &self.config.workspace_id, &ns.namespace)
                .await?;

        let type_count = chain.reconstruct()?.map_or(0, |s| s.types.len());
        let applied_type_count = chain.reconstruct_up_to(checkpoint)?.map_or(0, |s| s.types.len());

        let pending = detect_pending_migrations(
            &self.remote,
            &self.config.workspace_id,
            std::slice::from_ref(ns),
            self.config.apply_version,
        )
        .await?
        .into_iter()
        .map(|m| m.number)
        .collect();

        Ok(MigrationStatus {
            namespace: ns.namespace.clone(),
            latest_number: chain.latest_number(),
            file_count: files.len(),
            type_count,
            applied_type_count,
            remote_checkpoint: checkpoint,
            pending,
        })
    }

    /// Validate every namespace, then collect pending migrations.
    pub async fn plan(&self) -> MigrateResult<MigrationPlan> {
        for ns in &self.config.namespaces {
            assert_valid_migration_files(&ns.migrations_dir, &ns.namespace).await?;
        }

        let pending = detect_pending_migrations(
            &self.remote,
            &self.config.workspace_id,
            &self.config.namespaces,
            self.config.apply_version,
        )
        .await?;
        Ok(MigrationPlan { pending })
    }

    /// Plan and execute pending migrations.
    pub async fn apply<B, E>(&self, bundler: &B, executor: &E) -> MigrateResult<MigrationResult>
    where
        B: ScriptBundler + ?Sized,
        E: ScriptExecutor + ?Sized,
    {
        let start = Instant::now();
        let plan = self.plan().await?;

        let report = if self.config.dry_run || plan.is_empty() {
            ApplyReport::default()
        } else {
            execute_pending_migrations(
                &self.remote,
                bundler,
                executor,
                &self.config.workspace_id,
                &plan.pending,
            )
            .await?
        };

        let result = MigrationResult {
            plan,
            report,
            dry_run: self.config.dry_run,
            duration_ms: start.elapsed().as_millis() as i64,
        };
        info!(summary = %result.summary(), "Migration run finished");
        Ok(result)
    }
}
