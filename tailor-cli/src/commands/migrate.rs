//! `tailor migrate` commands - Schema migration management.

use std::path::{Path, PathBuf};

use tailor_migrate::{
    GenerateOutcome, LocalType, MigrationConfig, MigrationEngine, MigrationError,
};

use crate::cli::{
    MigrateApplyArgs, MigrateArgs, MigrateGenerateArgs, MigrateStatusArgs, MigrateSubcommand,
    NamespaceArgs, PlatformArgs,
};
use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output::{self, success, warn};
use crate::remote::{LocalOnly, PlatformClient, SourceBundler};

/// Run the migrate command
pub async fn run(config_path: &Path, args: MigrateArgs) -> CliResult<()> {
    let project = Project::load(config_path)?;

    match args.command {
        MigrateSubcommand::Generate(args) => run_generate(&project, args).await,
        MigrateSubcommand::Status(args) => run_status(&project, args).await,
        MigrateSubcommand::Validate(args) => run_validate(&project, args).await,
        MigrateSubcommand::Apply(args) => run_apply(&project, args).await,
    }
}

/// Loaded configuration plus the directory paths are resolved against.
struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    fn load(config_path: &Path) -> CliResult<Self> {
        let config_path = if config_path.is_absolute() {
            config_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(config_path)
        };
        let config = Config::load(&config_path)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self { root, config })
    }

    fn with_namespaces(&self, mut config: MigrationConfig) -> MigrationConfig {
        for namespace in self.config.namespaces(&self.root) {
            config = config.namespace(namespace);
        }
        config
    }

    /// Engine for commands that only read and write migration files.
    fn local_engine(&self) -> MigrationEngine<LocalOnly> {
        MigrationEngine::new(self.with_namespaces(MigrationConfig::new()), LocalOnly)
    }

    /// Engine backed by the platform API. Needs a token and a workspace.
    fn remote_engine(
        &self,
        platform: &PlatformArgs,
        dry_run: bool,
    ) -> CliResult<MigrationEngine<PlatformClient>> {
        let client =
            PlatformClient::new(&self.config.platform.url)?.with_token(platform.token.clone());
        if !client.has_token() {
            return Err(CliError::Config("TAILOR_PLATFORM_TOKEN is not set".to_string()));
        }

        let config = MigrationConfig::from_env()?
            .dry_run(dry_run)
            .workspace_id(self.config.require_workspace_id()?);
        Ok(MigrationEngine::new(self.with_namespaces(config), client))
    }

    fn local_types(&self, namespace: &str) -> CliResult<Vec<LocalType>> {
        let path = self
            .config
            .db(namespace)
            .and_then(|db| db.types.as_ref())
            .map(|types| self.root.join(types))
            .ok_or_else(|| {
                CliError::Config(format!("No types file configured for namespace '{}'", namespace))
            })?;

        let content = std::fs::read_to_string(&path).map_err(|e| {
            CliError::Schema(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| CliError::Schema(format!("Invalid types in {}: {}", path.display(), e)))
    }
}

/// Run `tailor migrate generate`
async fn run_generate(project: &Project, args: MigrateGenerateArgs) -> CliResult<()> {
    output::header("Migrate Generate");

    let engine = project.local_engine();
    let namespace = engine
        .resolve_namespace(args.namespace.namespace.as_deref())?
        .clone();

    output::kv("Namespace", &namespace.namespace);
    output::kv("Migrations", &namespace.migrations_dir.display().to_string());
    output::newline();

    output::step(1, 2, "Reading local types...");
    let types = project.local_types(&namespace.namespace)?;

    output::step(2, 2, "Comparing with migration history...");
    let outcome = match engine
        .generate(Some(&namespace.namespace), &types, args.description)
        .await
    {
        Err(err @ MigrationError::UnsupportedChange { .. }) => {
            output::newline();
            warn("No migration was generated.");
            return Err(err.into());
        }
        other => other?,
    };

    output::newline();
    match outcome {
        GenerateOutcome::Initial { path, .. } => {
            success(&format!("Initial schema snapshot written to {}", path.display()));
        }
        GenerateOutcome::NoChanges => {
            success("No changes detected. Migrations are up to date.");
        }
        GenerateOutcome::Diff {
            number,
            path,
            diff,
            script_paths,
        } => {
            success(&format!("Migration {:04} created: {}", number, diff.summary()));
            output::kv("Diff", &path.display().to_string());

            for change in &diff.breaking_changes {
                warn(&format!(
                    "Breaking: {}.{} - {}",
                    change.type_name,
                    change.field_name.as_deref().unwrap_or("*"),
                    change.reason
                ));
            }

            if let Some((script, db_types)) = script_paths {
                output::newline();
                output::section("Next steps");
                output::list_item(&format!("Edit the data migration in {}", script.display()));
                output::list_item(&format!("Script types are in {}", db_types.display()));
                output::list_item("Run `tailor migrate apply` to deploy");
            }
        }
    }

    Ok(())
}

/// Run `tailor migrate status`
async fn run_status(project: &Project, args: MigrateStatusArgs) -> CliResult<()> {
    output::header("Migration Status");

    let engine = project.remote_engine(&args.platform, false)?;
    let status = engine.status(args.namespace.namespace.as_deref()).await?;

    output::kv("Namespace", &status.namespace);
    output::kv(
        "Latest local",
        &status
            .latest_number
            .map_or_else(|| "none".to_string(), |n| format!("{:04}", n)),
    );
    output::kv("Files", &status.file_count.to_string());
    output::kv("Types", &status.type_count.to_string());
    output::kv("Remote checkpoint", &format!("{:04}", status.remote_checkpoint));
    output::kv("Types at checkpoint", &status.applied_type_count.to_string());
    output::newline();

    if status.is_up_to_date() {
        success("Remote is up to date.");
    } else {
        output::list(&format!("{} pending migrations:", status.pending.len()));
        for number in &status.pending {
            output::list_item(&output::style_pending(&format!("{:04}", number)));
        }
    }

    Ok(())
}

/// Run `tailor migrate validate`
async fn run_validate(project: &Project, args: NamespaceArgs) -> CliResult<()> {
    output::header("Validate Migrations");

    let engine = project.local_engine();
    let results = engine.validate(args.namespace.as_deref()).await?;

    let mut total = 0;
    for (namespace, errors) in &results {
        if errors.is_empty() {
            output::list_item(&format!("{} {}", namespace, output::style_success("ok")));
            continue;
        }
        total += errors.len();
        output::list(&format!("{}:", namespace));
        for error in errors {
            output::list_item(&error.to_string());
        }
    }

    output::newline();
    if total > 0 {
        return Err(CliError::Validation(format!(
            "{} problems found in migration files",
            total
        )));
    }
    success(&format!("{} namespaces validated", results.len()));
    Ok(())
}

/// Run `tailor migrate apply`
async fn run_apply(project: &Project, args: MigrateApplyArgs) -> CliResult<()> {
    output::header(if args.dry_run {
        "Migrate Apply (dry run)"
    } else {
        "Migrate Apply"
    });

    let engine = project.remote_engine(&args.platform, args.dry_run)?;
    if let Some(version) = engine.config().apply_version {
        output::kv("Version ceiling", &format!("{:04}", version));
    }

    output::step(1, 1, "Applying pending migrations...");
    let result = engine.apply(&SourceBundler, engine.remote()).await?;

    output::newline();
    for migration in &result.plan.pending {
        let marker = if migration.script_path.is_some() {
            " (script)"
        } else {
            ""
        };
        output::list_item(&format!(
            "{} {:04}{}",
            migration.namespace, migration.number, marker
        ));
    }

    output::newline();
    if result.plan.is_empty() {
        success("No pending migrations to apply.");
    } else {
        success(&result.summary());
    }
    Ok(())
}
