//! Submission step: predictions written as a CSV file

use crate::frame::Frame;
use crate::model::Predictor;
use crate::storage::{ensure_extension, Dataset, DatasetFormat, DatasetParams};
use crate::Result;
use arrow::array::{ArrayRef, Float64Array, Int64Array};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Default name of the prediction column.
pub const DEFAULT_RESULT_COLUMN: &str = "prediction";

/// Predicts a dataset with a recorded model and writes the result.
#[derive(Debug, Clone)]
pub struct SubmissionMaker {
    submission_id: String,
    model_id: String,
    dataset: String,
    result_column: String,
}

impl SubmissionMaker {
    /// Predict `dataset` with model `model_id`, written as `submission_id`.
    #[must_use]
    pub fn new(
        submission_id: impl Into<String>,
        model_id: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            model_id: model_id.into(),
            dataset: dataset.into(),
            result_column: DEFAULT_RESULT_COLUMN.to_string(),
        }
    }

    /// Name the prediction column `column`.
    #[must_use]
    pub fn with_result_column(mut self, column: impl Into<String>) -> Self {
        self.result_column = column.into();
        self
    }

    /// Model to predict with.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Logical name of the predicted dataset.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Write `<submission_id>.csv` with one id column and one prediction column.
    ///
    /// The id column is the frame's natural index, or `id` holding row
    /// numbers for a synthetic index.
    ///
    /// # Errors
    /// Returns error if prediction fails or the file cannot be written
    pub fn run(&self, model: &dyn Predictor, frame: &Frame, stage_dir: &Path) -> Result<PathBuf> {
        let predictions = model.predict(frame)?;
        let (id_name, ids): (&str, ArrayRef) = match frame.index_name() {
            Some(index) => (index, frame.column(index)?.clone()),
            None => ("id", Arc::new(Int64Array::from(frame.row_ids()?))),
        };
        let output = Frame::from_columns(vec![
            (id_name, ids),
            (
                self.result_column.as_str(),
                Arc::new(Float64Array::from(predictions)) as ArrayRef,
            ),
        ])?;

        let path = stage_dir.join(ensure_extension(&self.submission_id, "csv"));
        Dataset::new(&path, DatasetFormat::Csv, DatasetParams::default(), output).save()?;
        info!(step = %self, path = %path.display(), rows = frame.num_rows(), "Submission written");
        Ok(path)
    }
}

impl fmt::Display for SubmissionMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubmissionMaker {} ({}) -> {}",
            self.dataset, self.model_id, self.submission_id
        )
    }
}
