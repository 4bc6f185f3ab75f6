//! Pipeline definition and execution
//!
//! A [`Pipeline`] is an ordered list of [`Action`]s over named datasets.
//! The [`Orchestrator`] walks it in declaration order; nothing is reordered
//! and no dependencies are inferred.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tabflow::config::ProjectLayout;
//! use tabflow::manifest::FoldSettings;
//! use tabflow::model::{MeanEstimator, Metric};
//! use tabflow::pipeline::{Action, Orchestrator, Pipeline, Source};
//! use tabflow::registry::LoaderRegistry;
//! use tabflow::step::{DataStep, FillNulls};
//! use tabflow::cv::CrossValidator;
//!
//! let pipeline = Pipeline::new()
//!     .with_source("reviews", Source::csv("reviews.csv").with_index("id"))
//!     .with_fold_settings(FoldSettings { folds_filename: "folds.json".into(), n_runs: 2, n_folds: 4 })
//!     .then(Action::Preprocess(DataStep::new(
//!         FillNulls::new(vec!["text".into()], serde_json::json!(" ")),
//!         ["reviews"],
//!         ["clean"],
//!     )))
//!     .then(Action::CrossValidate(CrossValidator::new(
//!         "clean",
//!         "rating",
//!         Box::new(MeanEstimator),
//!         Metric::Rmse,
//!     )));
//!
//! let mut orchestrator = Orchestrator::open(ProjectLayout::new("."), LoaderRegistry::new())?;
//! let report = orchestrator.run(&pipeline)?;
//! println!("{} steps executed", report.executed());
//! # Ok::<(), tabflow::Error>(())
//! ```

mod datasets;
mod orchestrator;
mod spec;

pub use datasets::DatasetRegistry;
pub use orchestrator::{Orchestrator, RunReport, StepOutcome, StepReport};
pub use spec::PipelineSpec;

use crate::cv::CrossValidator;
use crate::manifest::FoldSettings;
use crate::step::DataStep;
use crate::storage::{DatasetFormat, DatasetParams};
use crate::submission::SubmissionMaker;
use crate::trainer::ModelMaker;
use serde::Deserialize;
use std::fmt;

/// A source dataset read from the project's data directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    /// File name relative to the data directory
    pub filename: String,
    /// Column holding integer row ids, if any
    #[serde(default)]
    pub index_col: Option<String>,
    /// File encoding
    #[serde(default)]
    pub format: DatasetFormat,
}

impl Source {
    /// A CSV source with a synthetic index.
    #[must_use]
    pub fn csv(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            index_col: None,
            format: DatasetFormat::Csv,
        }
    }

    /// A Parquet source with a synthetic index.
    #[must_use]
    pub fn parquet(filename: impl Into<String>) -> Self {
        Self {
            format: DatasetFormat::Parquet,
            ..Self::csv(filename)
        }
    }

    /// Use `column` as the natural index.
    #[must_use]
    pub fn with_index(mut self, column: impl Into<String>) -> Self {
        self.index_col = Some(column.into());
        self
    }

    pub(crate) fn params(&self) -> DatasetParams {
        self.index_col
            .as_ref()
            .map_or_else(DatasetParams::default, DatasetParams::natural_index)
    }
}

/// One unit of work in a pipeline.
#[derive(Debug)]
pub enum Action {
    /// Cached dataset step recorded in the preprocessing manifest
    Preprocess(DataStep),
    /// Cached dataset step recorded in the features manifest
    ExtractFeatures(DataStep),
    /// Score an estimator on cached folds
    CrossValidate(CrossValidator),
    /// Fit and record a model
    Train(ModelMaker),
    /// Predict with a recorded model and write a submission
    Submit(SubmissionMaker),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preprocess(step) | Self::ExtractFeatures(step) => fmt::Display::fmt(step, f),
            Self::CrossValidate(validator) => fmt::Display::fmt(validator, f),
            Self::Train(maker) => fmt::Display::fmt(maker, f),
            Self::Submit(maker) => fmt::Display::fmt(maker, f),
        }
    }
}

/// Sources, fold configuration and the ordered actions of one experiment.
#[derive(Debug, Default)]
pub struct Pipeline {
    sources: Vec<(String, Source)>,
    fold_settings: FoldSettings,
    seed: Option<u64>,
    actions: Vec<Action>,
}

impl Pipeline {
    /// Empty pipeline with default fold settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source dataset under `name`.
    #[must_use]
    pub fn with_source(mut self, name: impl Into<String>, source: Source) -> Self {
        self.sources.push((name.into(), source));
        self
    }

    /// Fold file name and counts used by cross-validation.
    #[must_use]
    pub fn with_fold_settings(mut self, settings: FoldSettings) -> Self {
        self.fold_settings = settings;
        self
    }

    /// Seed for fold generation (entropy when unset).
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Append an action.
    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Source datasets in registration order.
    #[must_use]
    pub fn sources(&self) -> &[(String, Source)] {
        &self.sources
    }

    /// Fold configuration.
    #[must_use]
    pub const fn fold_settings(&self) -> &FoldSettings {
        &self.fold_settings
    }

    /// Fold generation seed.
    #[must_use]
    pub const fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Actions in execution order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}
