//! JSON pipeline definitions
//!
//! ```json
//! {
//!   "sources": {"reviews": {"filename": "reviews.csv", "index_col": "id"}},
//!   "cv": {"folds_filename": "folds.json", "n_runs": 2, "n_folds": 4, "seed": 7},
//!   "actions": [
//!     {"kind": "fill_nulls", "inputs": "reviews", "outputs": "clean",
//!      "columns": ["text"], "fill_value": " "},
//!     {"kind": "cross_validate", "dataset": "clean", "target": "rating",
//!      "model": {"kind": "linear", "alpha": 0.5}, "metric": "rmse"}
//!   ]
//! }
//! ```
//!
//! `inputs` and `outputs` take a single name or a list.

use super::{Action, Pipeline, Source};
use crate::cv::CrossValidator;
use crate::manifest::FoldSettings;
use crate::model::{Metric, ModelSpec};
use crate::step::{
    DataStep, ExtractColumn, FillNulls, JoinFeatures, ReplacePatterns, StemText, Transform,
};
use crate::storage::DatasetFormat;
use crate::submission::{SubmissionMaker, DEFAULT_RESULT_COLUMN};
use crate::trainer::ModelMaker;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Step kinds a definition may use.
pub const KNOWN_KINDS: [&str; 8] = [
    "extract_column",
    "fill_nulls",
    "replace_patterns",
    "stem_text",
    "join_features",
    "cross_validate",
    "train",
    "submit",
];

/// Cross-validation section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CvSpec {
    /// Fold file name
    #[serde(default = "default_folds_filename")]
    pub folds_filename: String,
    /// Independent runs
    #[serde(default = "default_count")]
    pub n_runs: usize,
    /// Folds per run
    #[serde(default = "default_count")]
    pub n_folds: usize,
    /// Fold generation seed
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CvSpec {
    fn default() -> Self {
        let settings = FoldSettings::default();
        Self {
            folds_filename: settings.folds_filename,
            n_runs: settings.n_runs,
            n_folds: settings.n_folds,
            seed: None,
        }
    }
}

fn default_folds_filename() -> String {
    FoldSettings::default().folds_filename
}

fn default_count() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Names {
    One(String),
    Many(Vec<String>),
}

impl Names {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StepIo {
    inputs: Names,
    outputs: Names,
    #[serde(default)]
    format: DatasetFormat,
}

impl StepIo {
    fn bind(self, transform: Box<dyn Transform>) -> DataStep {
        DataStep::from_boxed(transform, self.inputs.into_vec(), self.outputs.into_vec())
            .with_format(self.format)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ActionSpec {
    ExtractColumn {
        #[serde(flatten)]
        io: StepIo,
        column: String,
    },
    FillNulls {
        #[serde(flatten)]
        io: StepIo,
        columns: Vec<String>,
        fill_value: Value,
    },
    ReplacePatterns {
        #[serde(flatten)]
        io: StepIo,
        columns: Vec<String>,
        substitutions: Vec<(String, String)>,
    },
    StemText {
        #[serde(flatten)]
        io: StepIo,
        columns: Vec<String>,
    },
    JoinFeatures {
        #[serde(flatten)]
        io: StepIo,
    },
    CrossValidate {
        dataset: String,
        target: String,
        model: ModelSpec,
        #[serde(default)]
        metric: Metric,
    },
    Train {
        model_id: String,
        dataset: String,
        target: String,
        model: ModelSpec,
    },
    Submit {
        submission_id: String,
        model_id: String,
        dataset: String,
        #[serde(default = "default_result_column")]
        result_column: String,
    },
}

fn default_result_column() -> String {
    DEFAULT_RESULT_COLUMN.to_string()
}

impl ActionSpec {
    fn build(self) -> Result<Action> {
        Ok(match self {
            Self::ExtractColumn { io, column } => {
                Action::Preprocess(io.bind(Box::new(ExtractColumn::new(column))))
            }
            Self::FillNulls {
                io,
                columns,
                fill_value,
            } => Action::Preprocess(io.bind(Box::new(FillNulls::new(columns, fill_value)))),
            Self::ReplacePatterns {
                io,
                columns,
                substitutions,
            } => Action::Preprocess(
                io.bind(Box::new(ReplacePatterns::new(columns, substitutions)?)),
            ),
            Self::StemText { io, columns } => {
                Action::Preprocess(io.bind(Box::new(StemText::new(columns)?)))
            }
            Self::JoinFeatures { io } => Action::ExtractFeatures(io.bind(Box::new(JoinFeatures))),
            Self::CrossValidate {
                dataset,
                target,
                model,
                metric,
            } => Action::CrossValidate(CrossValidator::new(dataset, target, model.build(), metric)),
            Self::Train {
                model_id,
                dataset,
                target,
                model,
            } => Action::Train(ModelMaker::new(model_id, model.build(), dataset, target)),
            Self::Submit {
                submission_id,
                model_id,
                dataset,
                result_column,
            } => Action::Submit(
                SubmissionMaker::new(submission_id, model_id, dataset)
                    .with_result_column(result_column),
            ),
        })
    }
}

/// A pipeline as written in a JSON definition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    /// Source datasets by logical name
    #[serde(default)]
    pub sources: BTreeMap<String, Source>,
    /// Cross-validation settings
    #[serde(default)]
    pub cv: CvSpec,
    /// Ordered actions, checked when the pipeline is built
    #[serde(default)]
    pub actions: Vec<Value>,
}

impl PipelineSpec {
    /// Parse a definition.
    ///
    /// # Errors
    /// Returns `Config` for malformed JSON
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid pipeline definition: {e}")))
    }

    /// Read and parse a definition file.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read, `Config` for malformed JSON
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Build the executable pipeline.
    ///
    /// # Errors
    /// Returns `UnknownStep` for an unrecognized `kind`, `Config` for an
    /// action with missing or mistyped fields, `Regex` for a bad pattern
    pub fn into_pipeline(self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new()
            .with_fold_settings(FoldSettings {
                folds_filename: self.cv.folds_filename,
                n_runs: self.cv.n_runs,
                n_folds: self.cv.n_folds,
            })
            .with_seed(self.cv.seed);
        for (name, source) in self.sources {
            pipeline = pipeline.with_source(name, source);
        }

        for (position, action) in self.actions.into_iter().enumerate() {
            let kind = action
                .get("kind")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Config(format!("action #{position} has no \"kind\"")))?;
            if !KNOWN_KINDS.contains(&kind) {
                return Err(Error::UnknownStep(kind.to_string()));
            }
            let spec: ActionSpec = serde_json::from_value(action.clone())
                .map_err(|e| Error::Config(format!("action #{position} ({kind}): {e}")))?;
            pipeline = pipeline.then(spec.build()?);
        }
        Ok(pipeline)
    }
}
