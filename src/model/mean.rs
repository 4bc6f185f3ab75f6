//! Baseline: predict the training mean

use super::{target_values, Estimator, Predictor};
use crate::frame::Frame;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Type tag of [`MeanModel`] files.
pub const MEAN_MODEL_TAG: &str = "tabflow.model.MeanModel";

/// Fits a constant model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanEstimator;

impl Estimator for MeanEstimator {
    fn name(&self) -> &'static str {
        "MeanEstimator"
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn fit(&self, target: &str, train: &Frame, _valid: Option<&Frame>) -> Result<Box<dyn Predictor>> {
        let values: Vec<f64> = target_values(train, target)?
            .into_iter()
            .filter(|v| !v.is_nan())
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Ok(Box::new(MeanModel::new(mean)))
    }
}

/// Constant predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanModel {
    mean: f64,
}

impl MeanModel {
    /// Predictor returning `mean` for every row.
    #[must_use]
    pub const fn new(mean: f64) -> Self {
        Self { mean }
    }

    /// Rebuild from a saved state.
    ///
    /// # Errors
    /// Returns `StorageError` if the state does not describe a mean model
    pub fn from_state(state: Value) -> Result<Box<dyn Predictor>> {
        let model: Self = serde_json::from_value(state)
            .map_err(|e| Error::StorageError(format!("Invalid mean model state: {e}")))?;
        Ok(Box::new(model))
    }
}

impl Predictor for MeanModel {
    fn type_tag(&self) -> &'static str {
        MEAN_MODEL_TAG
    }

    fn predict(&self, data: &Frame) -> Result<Vec<f64>> {
        Ok(vec![self.mean; data.num_rows()])
    }

    fn state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
