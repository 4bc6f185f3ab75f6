//! Stage manifest and artifact persistence tests
//!
//! Exercises the on-disk contract between manifests, the loader registry
//! and the artifact files they describe.

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tabflow::config::{ProjectLayout, Stage};
use tabflow::cv::FoldCache;
use tabflow::frame::Frame;
use tabflow::manifest::{CvManifest, DatasetManifest, ModelManifest, PlainManifest};
use tabflow::model::{LinearEstimator, MeanEstimator};
use tabflow::registry::LoaderRegistry;
use tabflow::trainer::ModelMaker;
use tabflow::Error;

// ============================================================================
// Helpers
// ============================================================================

fn keys(path: &Path) -> Vec<String> {
    let value: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    keys
}

fn training_frame() -> Frame {
    let frame = Frame::from_columns(vec![
        ("id", Arc::new(Int64Array::from((0..20).collect::<Vec<i64>>())) as ArrayRef),
        (
            "x",
            Arc::new(Float64Array::from((0..20).map(f64::from).collect::<Vec<_>>())) as ArrayRef,
        ),
        (
            "y",
            Arc::new(Float64Array::from((0..20).map(|i| 3.0 + 2.0 * f64::from(i)).collect::<Vec<_>>()))
                as ArrayRef,
        ),
    ])
    .unwrap();
    Frame::with_index(frame.batch().clone(), "id").unwrap()
}

// ============================================================================
// Stage shapes
// ============================================================================

#[test]
fn test_persisted_stage_key_sets() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    layout.prepare().unwrap();

    DatasetManifest::open(layout.manifest_path(Stage::Preprocessed))
        .unwrap()
        .persist()
        .unwrap();
    CvManifest::open(layout.manifest_path(Stage::CrossValidation))
        .unwrap()
        .persist()
        .unwrap();
    ModelManifest::open(layout.manifest_path(Stage::Models))
        .unwrap()
        .persist()
        .unwrap();
    PlainManifest::open(layout.manifest_path(Stage::Submissions))
        .unwrap()
        .persist()
        .unwrap();

    assert_eq!(
        keys(&layout.manifest_path(Stage::Preprocessed)),
        vec!["created_at", "datasets", "updated_at", "version"]
    );
    assert_eq!(
        keys(&layout.manifest_path(Stage::CrossValidation)),
        vec!["created_at", "folds_filename", "n_folds", "n_runs", "updated_at", "version"]
    );
    assert_eq!(
        keys(&layout.manifest_path(Stage::Models)),
        vec!["created_at", "models", "updated_at", "version"]
    );
    assert_eq!(
        keys(&layout.manifest_path(Stage::Submissions)),
        vec!["created_at", "updated_at", "version"]
    );
}

#[test]
fn test_model_manifest_rejected_as_dataset_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.json");
    ModelManifest::open(&path).unwrap().persist().unwrap();

    let err = DatasetManifest::open(&path).unwrap_err();
    assert!(matches!(err, Error::ManifestCorrupt { .. } | Error::ManifestSchema { .. }));
}

#[test]
fn test_truncated_manifest_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.json");
    fs::write(&path, r#"{"created_at": "2024-01-01T00:00:00Z", "updat"#).unwrap();

    assert!(matches!(
        DatasetManifest::open(&path),
        Err(Error::ManifestCorrupt { .. })
    ));
}

#[test]
fn test_offsetless_timestamps_open_as_utc() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.json");
    fs::write(
        &path,
        r#"{"created_at": "2016-04-10T12:30:00.123456", "updated_at": "2016-04-11T08:00:00",
            "version": 1, "datasets": {"clean": {"created_at": "2016-04-10T12:31:05.5",
            "type": "tabflow.storage.CsvDataset", "filename": "clean.csv", "params": {}}}}"#,
    )
    .unwrap();

    let mut manifest = DatasetManifest::open(&path).unwrap();
    let created = Utc.with_ymd_and_hms(2016, 4, 10, 12, 30, 0).unwrap()
        + chrono::Duration::microseconds(123_456);
    assert_eq!(manifest.created_at(), created);
    assert_eq!(
        manifest.updated_at(),
        Utc.with_ymd_and_hms(2016, 4, 11, 8, 0, 0).unwrap()
    );
    assert_eq!(
        manifest.lookup("clean").unwrap().created_at(),
        Utc.with_ymd_and_hms(2016, 4, 10, 12, 31, 5).unwrap() + chrono::Duration::milliseconds(500)
    );

    // Rewritten with an explicit offset, and still readable
    manifest.persist().unwrap();
    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let written = raw["created_at"].as_str().unwrap();
    assert_eq!(
        DateTime::parse_from_rfc3339(written).unwrap().with_timezone(&Utc),
        created
    );
    assert_eq!(DatasetManifest::open(&path).unwrap().created_at(), created);
}

#[test]
fn test_unparseable_timestamp_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.json");
    fs::write(
        &path,
        r#"{"created_at": "last tuesday", "updated_at": "2016-04-11T08:00:00",
            "version": 1, "datasets": {}}"#,
    )
    .unwrap();

    let err = DatasetManifest::open(&path).unwrap_err();
    assert!(matches!(err, Error::ManifestCorrupt { reason, .. } if reason.contains("last tuesday")));
}

// ============================================================================
// Models
// ============================================================================

#[test]
fn test_trained_model_reloads_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let stage = dir.path();
    let mut manifest = ModelManifest::open(stage.join("meta.json")).unwrap();
    let frame = training_frame();

    let maker = ModelMaker::new("ridge", Box::new(LinearEstimator::new(0.0)), "train", "y");
    let descriptor = maker.run(&frame, stage, &mut manifest).unwrap();
    assert_eq!(descriptor.filename(), "ridge.json");
    assert_eq!(descriptor.params()["estimator"], "LinearEstimator");
    assert_eq!(descriptor.params()["target"], "y");

    let reopened = ModelManifest::open(stage.join("meta.json")).unwrap();
    let loaders = LoaderRegistry::new();
    loaders.validate_models(reopened.descriptors()).unwrap();
    let model = loaders
        .load_model(stage, reopened.lookup("ridge").unwrap())
        .unwrap();

    let predictions = model.predict(&frame).unwrap();
    assert!((predictions[10] - 23.0).abs() < 1e-6);
}

#[test]
fn test_model_file_disagreeing_with_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let stage = dir.path();
    let mut manifest = ModelManifest::open(stage.join("meta.json")).unwrap();
    let frame = training_frame();

    ModelMaker::new("m", Box::new(MeanEstimator), "train", "y")
        .run(&frame, stage, &mut manifest)
        .unwrap();
    let mean_descriptor = manifest.lookup("m").unwrap().clone();

    // Overwrite the file with a linear model under the same id
    let mut other = ModelManifest::open(dir.path().join("other.json")).unwrap();
    ModelMaker::new("m", Box::new(LinearEstimator::default()), "train", "y")
        .run(&frame, stage, &mut other)
        .unwrap();

    let err = LoaderRegistry::new().load_model(stage, &mean_descriptor).unwrap_err();
    assert!(matches!(err, Error::StorageError(msg) if msg.contains("tabflow.model.LinearModel")));
}

#[test]
fn test_deleted_model_file_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let stage = dir.path();
    let mut manifest = ModelManifest::open(stage.join("meta.json")).unwrap();
    ModelMaker::new("m", Box::new(MeanEstimator), "train", "y")
        .run(&training_frame(), stage, &mut manifest)
        .unwrap();
    fs::remove_file(stage.join("m.json")).unwrap();

    let err = LoaderRegistry::new()
        .load_model(stage, manifest.lookup("m").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::MissingArtifact(_)));
}

// ============================================================================
// Fold files
// ============================================================================

#[test]
fn test_fold_file_reused_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folds.json");
    let frame = training_frame();

    let first = FoldCache::new(&path).with_seed(Some(5)).folds_for(&frame, 2, 4).unwrap();
    let bytes = fs::read(&path).unwrap();

    // Different counts and seed: the stored folds still win
    let second = FoldCache::new(&path).with_seed(Some(99)).folds_for(&frame, 3, 5).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.n_evaluations(), 8);
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_fold_file_wire_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folds.json");
    FoldCache::new(&path)
        .with_seed(Some(1))
        .folds_for(&training_frame(), 1, 4)
        .unwrap();

    let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let runs = value.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    let folds = runs[0].as_array().unwrap();
    assert_eq!(folds.len(), 4);
    let pair = folds[0].as_array().unwrap();
    assert_eq!(pair.len(), 2);
    assert_eq!(pair[0].as_array().unwrap().len(), 15);
    assert_eq!(pair[1].as_array().unwrap().len(), 5);
    assert!(pair[1].as_array().unwrap().iter().all(Value::is_i64));
}
