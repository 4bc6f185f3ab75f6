//! End-to-end orchestrator tests
//!
//! Each test builds an isolated project root (data/ + assets/) in a temp
//! directory and drives full pipelines through `Orchestrator::run`.

use serde_json::{json, Value};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tabflow::config::{ProjectLayout, Stage};
use tabflow::cv::CrossValidator;
use tabflow::error::AritySide;
use tabflow::frame::Frame;
use tabflow::manifest::{DatasetManifest, FoldSettings, ModelManifest};
use tabflow::model::{LinearEstimator, Metric};
use tabflow::pipeline::{Action, Orchestrator, Pipeline, PipelineSpec, Source, StepOutcome};
use tabflow::registry::LoaderRegistry;
use tabflow::step::{DataStep, FillNulls, JoinFeatures, Transform};
use tabflow::storage::DatasetFormat;
use tabflow::submission::SubmissionMaker;
use tabflow::{Error, Result};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

// =============================================================================
// Fixtures
// =============================================================================

/// 100 reviews with integer ids 1000..1100; every 7th text is empty.
fn write_reviews(data: &Path) {
    let mut csv = String::from("id,text,rating\n");
    for i in 0..100 {
        let text = if i % 7 == 0 { String::new() } else { format!("review number {i}") };
        let rating = f64::from(i % 5) + 0.5;
        writeln!(csv, "{},{text},{rating}", 1000 + i).unwrap();
    }
    fs::write(data.join("reviews.csv"), csv).unwrap();
}

/// Text lengths for every other review id.
fn write_stats(data: &Path) {
    let mut csv = String::from("id,length\n");
    for i in (0..100).step_by(2) {
        writeln!(csv, "{},{}", 1000 + i, 10 + i * 3).unwrap();
    }
    fs::write(data.join("stats.csv"), csv).unwrap();
}

fn project() -> (TempDir, ProjectLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    fs::create_dir_all(layout.data_dir()).unwrap();
    write_reviews(layout.data_dir());
    write_stats(layout.data_dir());
    (dir, layout)
}

fn fill_text(inputs: &[&str], outputs: &[&str]) -> DataStep {
    DataStep::new(
        FillNulls::new(vec!["text".into()], json!(" ")),
        inputs.iter().copied(),
        outputs.iter().copied(),
    )
}

fn scenario() -> Pipeline {
    Pipeline::new()
        .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
        .with_source("stats", Source::csv("stats.csv").with_index("id"))
        .with_fold_settings(FoldSettings {
            folds_filename: "folds.json".into(),
            n_runs: 2,
            n_folds: 4,
        })
        .then(Action::Preprocess(fill_text(&["reviews"], &["clean"])))
        .then(Action::ExtractFeatures(DataStep::new(
            JoinFeatures,
            ["clean", "stats"],
            ["joined"],
        )))
        .then(Action::CrossValidate(CrossValidator::new(
            "joined",
            "rating",
            Box::new(LinearEstimator::default()),
            Metric::Rmse,
        )))
}

fn open(layout: &ProjectLayout) -> Orchestrator {
    Orchestrator::open(layout.clone(), LoaderRegistry::new()).unwrap()
}

/// Emits its single input twice.
#[derive(Debug)]
struct Duplicate;

impl Transform for Duplicate {
    fn name(&self) -> &'static str {
        "Duplicate"
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        Ok(vec![inputs[0].clone(), inputs[0].clone()])
    }
}

/// Formatted log output collected in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// =============================================================================
// Scenario: preprocess -> join -> cross-validate, then rerun
// =============================================================================

#[test]
fn test_scenario_first_run_executes_everything() {
    let (_dir, layout) = project();
    let report = open(&layout).run(&scenario()).unwrap();

    assert_eq!(report.executed(), 2);
    assert_eq!(report.cache_hits(), 0);

    let cv: Vec<_> = report.evaluations().collect();
    assert_eq!(cv.len(), 1);
    assert_eq!(cv[0].scores.len(), 8);
    assert!(cv[0].mean.is_finite());
    assert!(cv[0].std >= 0.0);

    assert!(layout.stage_dir(Stage::Preprocessed).join("clean.csv").exists());
    assert!(layout.stage_dir(Stage::Features).join("joined.csv").exists());
    assert!(layout.stage_dir(Stage::CrossValidation).join("folds.json").exists());
}

#[test]
fn test_scenario_rerun_is_pure_cache_hits() {
    let (_dir, layout) = project();
    let first = open(&layout).run(&scenario()).unwrap();

    let folds_path = layout.stage_dir(Stage::CrossValidation).join("folds.json");
    let folds_before = fs::read(&folds_path).unwrap();
    let clean_path = layout.stage_dir(Stage::Preprocessed).join("clean.csv");
    let clean_before = fs::read(&clean_path).unwrap();

    let second = open(&layout).run(&scenario()).unwrap();
    assert_eq!(second.executed(), 0);
    assert_eq!(second.cache_hits(), 2);
    assert!(matches!(second.steps[0].outcome, StepOutcome::CacheHit));
    assert!(matches!(second.steps[1].outcome, StepOutcome::CacheHit));

    assert_eq!(fs::read(&folds_path).unwrap(), folds_before);
    assert_eq!(fs::read(&clean_path).unwrap(), clean_before);

    // Same folds over the reloaded features give the same scores
    let a = &first.evaluations().next().unwrap().scores;
    let b = &second.evaluations().next().unwrap().scores;
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < 1e-9);
    }
}

#[test]
fn test_scenario_rerun_logs_cache_hits() {
    let (_dir, layout) = project();
    open(&layout).run(&scenario()).unwrap();

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || open(&layout).run(&scenario()).unwrap());

    let text = logs.text();
    assert_eq!(text.matches("Using cache").count(), 2, "{text}");
    assert_eq!(text.matches("Reusing cached folds").count(), 1, "{text}");
    assert!(!text.contains("Generated folds"), "{text}");
}

#[test]
fn test_cv_manifest_untouched_without_changes() {
    let (_dir, layout) = project();
    let cv_meta = layout.manifest_path(Stage::CrossValidation);

    let preprocess_only = || {
        Pipeline::new()
            .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
            .then(Action::Preprocess(fill_text(&["reviews"], &["clean"])))
    };
    open(&layout).run(&preprocess_only()).unwrap();
    assert!(!cv_meta.exists());

    open(&layout).run(&scenario()).unwrap();
    let before = fs::read(&cv_meta).unwrap();

    // Same settings, and a pipeline with other settings but no cross-validation
    open(&layout).run(&scenario()).unwrap();
    open(&layout)
        .run(&preprocess_only().with_fold_settings(FoldSettings {
            folds_filename: "other.json".into(),
            n_runs: 5,
            n_folds: 5,
        }))
        .unwrap();
    assert_eq!(fs::read(&cv_meta).unwrap(), before);
}

#[test]
fn test_scenario_manifests_describe_outputs() {
    let (_dir, layout) = project();
    open(&layout).run(&scenario()).unwrap();

    let manifest = DatasetManifest::open(layout.manifest_path(Stage::Preprocessed)).unwrap();
    let clean = manifest.lookup("clean").unwrap();
    assert_eq!(clean.type_tag(), "tabflow.storage.CsvDataset");
    assert_eq!(clean.filename(), "clean.csv");
    assert_eq!(
        clean.params(),
        &json!({"read_params": {"index_col": "id"}, "write_params": {}})
    );

    let cv: Value = serde_json::from_str(
        &fs::read_to_string(layout.manifest_path(Stage::CrossValidation)).unwrap(),
    )
    .unwrap();
    assert_eq!(cv["n_runs"], 2);
    assert_eq!(cv["n_folds"], 4);
    assert_eq!(cv["folds_filename"], "folds.json");
}

#[test]
fn test_filled_text_survives_reload() {
    let (_dir, layout) = project();
    open(&layout).run(&scenario()).unwrap();

    let text = fs::read_to_string(layout.stage_dir(Stage::Preprocessed).join("clean.csv")).unwrap();
    assert!(text.lines().any(|line| line.starts_with("1000, ,")));
}

// =============================================================================
// Cache semantics
// =============================================================================

#[test]
fn test_partial_hit_reexecutes_step() {
    let (_dir, layout) = project();
    let first = Pipeline::new()
        .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
        .then(Action::Preprocess(fill_text(&["reviews"], &["clean"])));
    open(&layout).run(&first).unwrap();

    let widened = || {
        Pipeline::new()
            .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
            .then(Action::Preprocess(DataStep::new(
                Duplicate,
                ["reviews"],
                ["clean", "copy"],
            )))
    };
    let report = open(&layout).run(&widened()).unwrap();
    assert_eq!(report.executed(), 1);

    let manifest = DatasetManifest::open(layout.manifest_path(Stage::Preprocessed)).unwrap();
    assert!(manifest.contains("clean"));
    assert!(manifest.contains("copy"));

    let report = open(&layout).run(&widened()).unwrap();
    assert_eq!(report.cache_hits(), 1);
}

#[test]
fn test_arity_violation_records_nothing() {
    let (_dir, layout) = project();
    let pipeline = Pipeline::new()
        .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
        .then(Action::Preprocess(DataStep::new(
            Duplicate,
            ["reviews"],
            ["a", "b", "c"],
        )));
    let err = open(&layout).run(&pipeline).unwrap_err();
    assert!(matches!(
        err,
        Error::ArityMismatch { side: AritySide::Outputs, expected: 3, actual: 2, .. }
    ));

    let manifest = DatasetManifest::open(layout.manifest_path(Stage::Preprocessed)).unwrap();
    assert!(manifest.is_empty());
}

#[test]
fn test_failed_run_resumes_from_cache() {
    let (_dir, layout) = project();
    let broken = Pipeline::new()
        .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
        .then(Action::Preprocess(fill_text(&["reviews"], &["clean"])))
        .then(Action::ExtractFeatures(DataStep::new(
            JoinFeatures,
            ["clean", "not_declared"],
            ["joined"],
        )));
    let err = open(&layout).run(&broken).unwrap_err();
    assert!(matches!(err, Error::UnresolvedInput { name, .. } if name == "not_declared"));

    let report = open(&layout).run(&scenario()).unwrap();
    assert!(matches!(report.steps[0].outcome, StepOutcome::CacheHit));
    assert!(matches!(report.steps[1].outcome, StepOutcome::Executed));
}

#[test]
fn test_steps_run_in_declaration_order_only() {
    let (_dir, layout) = project();
    let pipeline = Pipeline::new()
        .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
        .then(Action::Preprocess(fill_text(&["clean"], &["cleaner"])))
        .then(Action::Preprocess(fill_text(&["reviews"], &["clean"])));
    let err = open(&layout).run(&pipeline).unwrap_err();
    assert!(matches!(err, Error::UnresolvedInput { name, .. } if name == "clean"));
}

// =============================================================================
// Descriptor validation and data errors
// =============================================================================

#[test]
fn test_unknown_recorded_type_fails_open() {
    let (_dir, layout) = project();
    layout.prepare().unwrap();
    fs::write(
        layout.manifest_path(Stage::Features),
        r#"{"created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z",
            "version": 1, "datasets": {"old": {"created_at": "2024-01-01T00:00:00Z",
            "type": "legacy.PickleDataset", "filename": "old.pkl", "params": {}}}}"#,
    )
    .unwrap();

    let err = Orchestrator::open(layout.clone(), LoaderRegistry::new()).unwrap_err();
    assert!(matches!(err, Error::UnknownArtifactType(tag) if tag == "legacy.PickleDataset"));

    let mut loaders = LoaderRegistry::new();
    loaders.register_dataset("legacy.PickleDataset", DatasetFormat::Csv);
    assert!(Orchestrator::open(layout, loaders).is_ok());
}

#[test]
fn test_text_index_cannot_be_folded() {
    let (_dir, layout) = project();
    fs::write(layout.data_dir().join("codes.csv"), "code,y\na,1.0\nb,2.0\nc,3.0\nd,4.0\n").unwrap();
    let pipeline = Pipeline::new()
        .with_source("codes", Source::csv("codes.csv").with_index("code"))
        .with_fold_settings(FoldSettings {
            folds_filename: "folds.json".into(),
            n_runs: 1,
            n_folds: 2,
        })
        .then(Action::CrossValidate(CrossValidator::new(
            "codes",
            "y",
            Box::new(LinearEstimator::default()),
            Metric::Rmse,
        )));
    let err = open(&layout).run(&pipeline).unwrap_err();
    assert!(matches!(err, Error::NonIntegerIndex { column, .. } if column == "code"));
    assert!(!layout.stage_dir(Stage::CrossValidation).join("folds.json").exists());
}

#[test]
fn test_submit_without_model() {
    let (_dir, layout) = project();
    let pipeline = Pipeline::new()
        .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
        .then(Action::Submit(SubmissionMaker::new("final", "never_trained", "reviews")));
    let err = open(&layout).run(&pipeline).unwrap_err();
    assert!(matches!(err, Error::MissingArtifact(what) if what.contains("never_trained")));
}

// =============================================================================
// JSON definitions: train and submit
// =============================================================================

#[test]
fn test_definition_trains_and_submits() {
    let (_dir, layout) = project();
    let definition = json!({
        "sources": {
            "reviews": {"filename": "reviews.csv", "index_col": "id"},
            "stats": {"filename": "stats.csv", "index_col": "id"}
        },
        "cv": {"n_runs": 1, "n_folds": 5, "seed": 3},
        "actions": [
            {"kind": "fill_nulls", "inputs": "reviews", "outputs": "clean",
             "columns": ["text"], "fill_value": " "},
            {"kind": "stem_text", "inputs": "clean", "outputs": "stemmed", "columns": ["text"]},
            {"kind": "join_features", "inputs": ["stemmed", "stats"], "outputs": "joined",
             "format": "parquet"},
            {"kind": "cross_validate", "dataset": "joined", "target": "rating",
             "model": {"kind": "mean"}, "metric": "mae"},
            {"kind": "train", "model_id": "ridge", "dataset": "joined", "target": "rating",
             "model": {"kind": "linear", "alpha": 0.5}},
            {"kind": "submit", "submission_id": "final", "model_id": "ridge",
             "dataset": "joined", "result_column": "relevance"}
        ]
    });
    let path = layout.root().join("pipeline.json");
    fs::write(&path, definition.to_string()).unwrap();

    let pipeline = PipelineSpec::from_path(&path).unwrap().into_pipeline().unwrap();
    let report = open(&layout).run(&pipeline).unwrap();
    assert_eq!(report.executed(), 3);
    assert_eq!(report.evaluations().next().unwrap().scores.len(), 5);
    assert!(layout.stage_dir(Stage::Features).join("joined.parquet").exists());

    let models = ModelManifest::open(layout.manifest_path(Stage::Models)).unwrap();
    assert_eq!(models.lookup("ridge").unwrap().type_tag(), "tabflow.model.LinearModel");

    let submission = fs::read_to_string(layout.stage_dir(Stage::Submissions).join("final.csv")).unwrap();
    assert_eq!(submission.lines().next(), Some("id,relevance"));
    assert_eq!(submission.lines().count(), 101);

    // Rerun: dataset steps are cached, the parquet features reload lazily
    let pipeline = PipelineSpec::from_path(&path).unwrap().into_pipeline().unwrap();
    let report = open(&layout).run(&pipeline).unwrap();
    assert_eq!(report.cache_hits(), 3);
    assert!(matches!(report.steps[5].outcome, StepOutcome::Submitted { .. }));
}
