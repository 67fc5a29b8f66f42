//! SchemaGenie Core Integration Tests
//!
//! Imports the fixture packages through the public API into a SQLite graph
//! and reads them back the way the CLI and chat assistant do.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemagenie_core::chat::ContextBuilder;
use schemagenie_core::config::{ChatConfig, Config};
use schemagenie_core::graph::{BackendKind, GraphStore, open_store};
use schemagenie_core::importer::{FileResult, Importer};
use tempfile::TempDir;

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn copy_fixtures(dest: &Path) {
    for name in ["soil_sample.json", "water_quality.json"] {
        std::fs::copy(fixtures_dir().join(name), dest.join(name)).unwrap();
    }
}

async fn sqlite_store(dir: &TempDir) -> Arc<dyn GraphStore> {
    let mut config = Config::default();
    config.graph.sqlite_path = Some(dir.path().join("graph.db"));
    open_store(&config, Some(BackendKind::Sqlite)).await.unwrap()
}

#[tokio::test]
async fn test_import_fixture_folder() {
    let data = TempDir::new().unwrap();
    let schemas = TempDir::new().unwrap();
    copy_fixtures(schemas.path());

    let store = sqlite_store(&data).await;
    let report = Importer::new(store.clone())
        .import_folder(schemas.path())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.imported(), 2);
    let names: Vec<_> = report.files.iter().map(|f| f.schema_name.as_str()).collect();
    assert_eq!(names, vec!["soil_sample", "water_quality"]);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.schemas, 2);
    // ph is shared between the two packages
    assert_eq!(stats.attributes, 6);
    assert_eq!(stats.metas, 2);

    let run = store.last_import_run().await.unwrap().unwrap();
    assert_eq!(run.id, report.run_id);
    assert_eq!(run.files_imported, 2);
}

#[tokio::test]
async fn test_schema_detail_round_trip() {
    let data = TempDir::new().unwrap();
    let schemas = TempDir::new().unwrap();
    copy_fixtures(schemas.path());

    let store = sqlite_store(&data).await;
    Importer::new(store.clone())
        .import_folder(schemas.path())
        .await
        .unwrap();

    let soil = store.get_schema("soil_sample").await.unwrap().unwrap();
    assert_eq!(soil.id, "EJ3rNNjT_soilSchema");
    assert_eq!(soil.capture_base_id.as_deref(), Some("EC_soilCaptureBase"));
    let order: Vec<_> = soil.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(order, vec!["sample_id", "depth", "ph", "texture"]);

    let depth = &soil.attributes[1];
    assert_eq!(depth.unit.as_deref(), Some("cm"));
    assert_eq!(depth.description_for("fra"), Some("Profondeur d'échantillonnage"));
    assert_eq!(depth.description_for("deu"), Some("Sampling depth"));

    let texture = &soil.attributes[3];
    assert_eq!(texture.entries_for("eng").len(), 3);

    // Water quality was imported last, so its ph overlays win
    let ph = soil.attributes.iter().find(|a| a.name == "ph").unwrap();
    assert_eq!(ph.unit, None);
    assert_eq!(ph.description_for("eng"), Some("Water pH at the sampling station"));
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let data = TempDir::new().unwrap();
    let schemas = TempDir::new().unwrap();
    copy_fixtures(schemas.path());

    let store = sqlite_store(&data).await;
    let importer = Importer::new(store.clone());
    importer.import_folder(schemas.path()).await.unwrap();
    let before = store.stats().await.unwrap();

    let report = importer.import_folder(schemas.path()).await.unwrap();
    for file in &report.files {
        match &file.result {
            FileResult::Imported(outcome) => assert!(!outcome.created),
            other => panic!("unexpected result: {:?}", other),
        }
    }
    assert_eq!(store.stats().await.unwrap(), before);
}

#[tokio::test]
async fn test_invalid_file_does_not_stop_import() {
    let data = TempDir::new().unwrap();
    let schemas = TempDir::new().unwrap();
    copy_fixtures(schemas.path());
    std::fs::write(schemas.path().join("broken.json"), "{ not json").unwrap();

    let store = sqlite_store(&data).await;
    let report = Importer::new(store.clone())
        .import_folder(schemas.path())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.imported(), 2);
    assert_eq!(report.failed(), 1);
    match &report.files[0].result {
        FileResult::Failed { code, .. } => assert_eq!(code, "E002"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(store.list_schemas().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let data = TempDir::new().unwrap();
    let schemas = TempDir::new().unwrap();
    copy_fixtures(schemas.path());

    let store = sqlite_store(&data).await;
    let report = Importer::new(store.clone())
        .dry_run(true)
        .import_folder(schemas.path())
        .await
        .unwrap();

    assert_eq!(report.planned(), 2);
    assert!(store.list_schemas().await.unwrap().is_empty());
    assert!(store.last_import_run().await.unwrap().is_none());
}

#[tokio::test]
async fn test_chat_context_from_imported_graph() {
    let data = TempDir::new().unwrap();
    let schemas = TempDir::new().unwrap();
    copy_fixtures(schemas.path());

    let store = sqlite_store(&data).await;
    Importer::new(store.clone())
        .import_folder(schemas.path())
        .await
        .unwrap();

    let context = ContextBuilder::new(store.as_ref(), &ChatConfig::default())
        .build("Which datasets record turbidity?")
        .await
        .unwrap();

    assert_eq!(context.schemas.len(), 1);
    assert_eq!(context.schemas[0].name, "water_quality");
    let text = context.render("eng");
    assert!(text.contains("turbidity [Numeric] unit=NTU"));
    assert!(text.contains("used by: water_quality"));
}
