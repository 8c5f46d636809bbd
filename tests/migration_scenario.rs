//! End-to-end migration scenarios across generation, reconstruction and apply.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use pretty_assertions::assert_eq;
use serde_json::json;
use tailor_sdk::migrate::{
    BundledScript, DiffChange, GenerateOutcome, LocalType, MIGRATION_LABEL_KEY, Metadata,
    MigrateResult, MigrationConfig, MigrationDiff, MigrationEngine, MigrationError,
    MigrationFileManager, MigrationGenerator, NamespaceMigrations, RemoteService, ScalarKind,
    ScriptBundler, ScriptExecutor, ScriptOutcome, namespace_trn,
    reconstruct_snapshot_from_migrations,
};
use tempfile::TempDir;

fn types(value: serde_json::Value) -> Vec<LocalType> {
    serde_json::from_value(value).unwrap()
}

fn user(extra: serde_json::Value) -> serde_json::Value {
    let mut fields = json!({
        "name": {"type": "string", "required": true},
        "email": {"type": "string", "required": true},
    });
    for (name, config) in extra.as_object().unwrap() {
        fields[name] = config.clone();
    }
    json!({"name": "User", "fields": fields})
}

fn post() -> serde_json::Value {
    json!({"name": "Post", "fields": {"title": {"type": "string", "required": true}}})
}

async fn diff_of(generator: &MigrationGenerator, local: Vec<LocalType>) -> MigrationDiff {
    match generator.generate(&local, None).await.unwrap() {
        GenerateOutcome::Diff { diff, .. } => diff,
        other => panic!("expected a diff, got {other:?}"),
    }
}

async fn file_count(dir: &Path) -> usize {
    MigrationFileManager::new(dir)
        .get_migration_files()
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_schema_evolution_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let generator = MigrationGenerator::new("main", dir);

    let optional_phone = json!({"phone": {"type": "string"}});
    let required_phone = json!({"phone": {"type": "string", "required": true}});
    let with_required_field = json!({
        "phone": {"type": "string"},
        "requiredField": {"type": "string", "required": true},
    });

    let outcome = generator
        .generate(&types(json!([user(json!({}))])), None)
        .await
        .unwrap();
    assert!(matches!(outcome, GenerateOutcome::Initial { number: 0, .. }));

    // Optional field.
    let diff = diff_of(&generator, types(json!([user(optional_phone.clone())]))).await;
    assert_eq!(diff.version, 1);
    assert_eq!(diff.changes.len(), 1);
    assert!(!diff.has_breaking_changes);

    // Required field.
    let diff = diff_of(&generator, types(json!([user(with_required_field.clone())]))).await;
    assert!(diff.has_breaking_changes);
    assert!(diff.requires_migration_script);
    assert_eq!(diff.breaking_changes[0].reason, "Required field added");
    assert!(dir.join("0002/migrate.ts").exists());
    assert!(dir.join("0002/db.ts").exists());

    // No source change.
    let outcome = generator
        .generate(&types(json!([user(with_required_field.clone())])), None)
        .await
        .unwrap();
    assert!(matches!(outcome, GenerateOutcome::NoChanges));
    assert_eq!(file_count(dir).await, 3);

    // New type.
    let diff = diff_of(
        &generator,
        types(json!([user(with_required_field.clone()), post()])),
    )
    .await;
    assert!(matches!(
        &diff.changes[..],
        [DiffChange::TypeAdded { type_name, .. }] if type_name == "Post"
    ));
    assert!(!diff.has_breaking_changes);

    // Removed field.
    let diff = diff_of(&generator, types(json!([user(optional_phone.clone()), post()]))).await;
    assert!(matches!(
        &diff.changes[..],
        [DiffChange::FieldRemoved { field_name, .. }] if field_name == "requiredField"
    ));
    assert!(!diff.requires_migration_script);

    // Type change is refused and writes nothing.
    let err = generator
        .generate(
            &types(json!([user(json!({"phone": {"type": "integer"}})), post()])),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnsupportedChange { .. }));
    assert!(!dir.join("0005").exists());

    // Optional to required.
    let diff = diff_of(&generator, types(json!([user(required_phone.clone()), post()]))).await;
    assert_eq!(diff.version, 5);
    assert!(diff.has_breaking_changes);
    assert!(diff.breaking_changes[0].reason.contains("optional to required"));

    // Removed type.
    let diff = diff_of(&generator, types(json!([user(required_phone)]))).await;
    assert!(matches!(
        &diff.changes[..],
        [DiffChange::TypeRemoved { type_name, .. }] if type_name == "Post"
    ));
    assert!(!diff.has_breaking_changes);

    let snapshot = reconstruct_snapshot_from_migrations(dir).await.unwrap().unwrap();
    let user = &snapshot.types["User"];
    assert!(user.fields["phone"].required);
    assert_eq!(user.fields["phone"].kind, ScalarKind::String);
    assert!(!user.fields.contains_key("requiredField"));
    assert!(!snapshot.types.contains_key("Post"));
    assert_eq!(snapshot.version, 6);
    assert_eq!(file_count(dir).await, 7);
}

#[derive(Default)]
struct InMemoryRemote {
    metadata: Mutex<BTreeMap<String, Metadata>>,
}

#[async_trait::async_trait]
impl RemoteService for InMemoryRemote {
    async fn get_metadata(&self, trn: &str) -> MigrateResult<Option<Metadata>> {
        Ok(self.metadata.lock().unwrap().get(trn).cloned())
    }

    async fn set_metadata(&self, trn: &str, labels: BTreeMap<String, String>) -> MigrateResult<()> {
        self.metadata
            .lock()
            .unwrap()
            .insert(trn.to_string(), Metadata { labels });
        Ok(())
    }
}

struct SourceBundler;

#[async_trait::async_trait]
impl ScriptBundler for SourceBundler {
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

#[derive(Default)]
struct CountingExecutor {
    runs: Mutex<Vec<u32>>,
}

#[async_trait::async_trait]
impl ScriptExecutor for CountingExecutor {
    async fn execute(&self, script: &BundledScript) -> MigrateResult<ScriptOutcome> {
        self.runs.lock().unwrap().push(script.migration_number);
        Ok(ScriptOutcome::Committed)
    }
}

#[tokio::test]
async fn test_apply_respects_version_ceiling() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("main");
    let generator = MigrationGenerator::new("main", &dir);

    let age = json!({"age": {"type": "integer", "required": true}});
    generator
        .generate(&types(json!([user(json!({}))])), None)
        .await
        .unwrap();
    generator
        .generate(&types(json!([user(age.clone())])), None)
        .await
        .unwrap();
    generator
        .generate(&types(json!([user(age), post()])), None)
        .await
        .unwrap();

    let config = |ceiling| {
        MigrationConfig::new()
            .workspace_id("ws-1")
            .namespace(NamespaceMigrations::new("main", &dir))
            .apply_version(ceiling)
    };
    let trn = namespace_trn("ws-1", "main");
    let executor = CountingExecutor::default();

    let engine = MigrationEngine::new(config(Some(1)), InMemoryRemote::default());
    let result = engine.apply(&SourceBundler, &executor).await.unwrap();
    assert_eq!(result.report.applied, vec![("main".to_string(), 1)]);
    assert_eq!(*executor.runs.lock().unwrap(), vec![1]);

    let labels = engine.remote().metadata.lock().unwrap()[&trn].labels.clone();
    let remote = InMemoryRemote::default();
    remote.set_metadata(&trn, labels).await.unwrap();
    let engine = MigrationEngine::new(config(None), remote);
    let result = engine.apply(&SourceBundler, &executor).await.unwrap();
    assert_eq!(result.report.applied, vec![("main".to_string(), 2)]);
    assert_eq!(result.report.scripts_executed, 0);

    let metadata = engine.remote().metadata.lock().unwrap();
    assert_eq!(metadata[&trn].labels[MIGRATION_LABEL_KEY], "m0002");
}
