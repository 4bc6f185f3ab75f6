//! Cross-validation: cached fold partitions and the scoring loop

mod folds;

pub use folds::{FoldCache, FoldPair, FoldPartitionSet};

use crate::frame::Frame;
use crate::model::{Estimator, Metric};
use crate::Result;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Per-evaluation scores plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvReport {
    /// One score per (run, fold), run-major
    pub scores: Vec<f64>,
    /// Arithmetic mean of `scores`
    pub mean: f64,
    /// Population standard deviation of `scores`
    pub std: f64,
}

impl CvReport {
    /// Summarize a list of scores.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_scores(scores: Vec<f64>) -> Self {
        if scores.is_empty() {
            return Self {
                scores,
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            scores,
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Scores an estimator on every cached fold of a dataset.
#[derive(Debug)]
pub struct CrossValidator {
    dataset: String,
    target: String,
    estimator: Box<dyn Estimator>,
    metric: Metric,
}

impl CrossValidator {
    /// Evaluate `estimator` on `dataset`, predicting `target`.
    #[must_use]
    pub fn new(
        dataset: impl Into<String>,
        target: impl Into<String>,
        estimator: Box<dyn Estimator>,
        metric: Metric,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            target: target.into(),
            estimator,
            metric,
        }
    }

    /// Logical name of the evaluated dataset.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Target column.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Fit on each training split, score on its held-out split.
    ///
    /// The held-out split is handed to the estimator as validation data and
    /// predicted without its target column.
    ///
    /// # Errors
    /// Returns error if a fold references unknown row ids or fitting fails
    pub fn run(&self, frame: &Frame, folds: &FoldPartitionSet) -> Result<CvReport> {
        let mut scores = Vec::with_capacity(folds.n_evaluations());
        for (run, pairs) in folds.runs().iter().enumerate() {
            for (fold, pair) in pairs.iter().enumerate() {
                let train = frame.take_ids(pair.train())?;
                let test = frame.take_ids(pair.test())?;

                let model = self.estimator.fit(&self.target, &train, Some(&test))?;
                let y_true = test.float_column(&self.target)?;
                let y_pred = model.predict(&test.drop_column(&self.target)?)?;

                let score = self.metric.score(&y_true, &y_pred)?;
                info!(run, fold, metric = self.metric.name(), score, "Fold scored");
                scores.push(score);
            }
        }

        let report = CvReport::from_scores(scores);
        info!(mean = report.mean, std = report.std, "Cross-validation finished");
        Ok(report)
    }
}

impl fmt::Display for CrossValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CrossValidator {} ({} on {}, {})",
            self.dataset,
            self.estimator.name(),
            self.target,
            self.metric.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearEstimator, MeanEstimator};
    use arrow::array::{ArrayRef, Float64Array, Int64Array};
    use std::sync::Arc;

    fn linear_frame() -> Frame {
        let ids: Vec<i64> = (1..=40).collect();
        #[allow(clippy::cast_precision_loss)]
        let x: Vec<f64> = ids.iter().map(|&i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x - 2.0).collect();
        let frame = Frame::from_columns(vec![
            ("id", Arc::new(Int64Array::from(ids)) as ArrayRef),
            ("x", Arc::new(Float64Array::from(x)) as ArrayRef),
            ("y", Arc::new(Float64Array::from(y)) as ArrayRef),
        ])
        .unwrap();
        Frame::with_index(frame.batch().clone(), "id").unwrap()
    }

    #[test]
    fn test_report_summary() {
        let report = CvReport::from_scores(vec![1.0, 3.0]);
        assert!((report.mean - 2.0).abs() < 1e-12);
        assert!((report.std - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_score_per_evaluation() {
        let frame = linear_frame();
        let folds = FoldPartitionSet::generate(&frame.row_ids().unwrap(), 2, 4, Some(1)).unwrap();
        let validator = CrossValidator::new("train", "y", Box::new(MeanEstimator), Metric::Rmse);
        let report = validator.run(&frame, &folds).unwrap();
        assert_eq!(report.scores.len(), 8);
        assert!(report.mean > 0.0);
    }

    #[test]
    fn test_linear_beats_mean() {
        let frame = linear_frame();
        let folds = FoldPartitionSet::generate(&frame.row_ids().unwrap(), 1, 5, Some(3)).unwrap();
        let mean = CrossValidator::new("train", "y", Box::new(MeanEstimator), Metric::Mae)
            .run(&frame, &folds)
            .unwrap();
        let linear = CrossValidator::new("train", "y", Box::new(LinearEstimator::new(1e-6)), Metric::Mae)
            .run(&frame, &folds)
            .unwrap();
        assert!(linear.mean < mean.mean / 100.0);
    }

    #[test]
    fn test_stale_folds_fail() {
        let frame = linear_frame();
        let folds = FoldPartitionSet::generate(&[1, 2, 999], 1, 3, Some(1)).unwrap();
        let validator = CrossValidator::new("train", "y", Box::new(MeanEstimator), Metric::Rmse);
        assert!(validator.run(&frame, &folds).is_err());
    }

    #[test]
    fn test_display() {
        let validator = CrossValidator::new("train", "y", Box::new(MeanEstimator), Metric::Rmse);
        assert_eq!(validator.to_string(), "CrossValidator train (MeanEstimator on y, rmse)");
    }
}
