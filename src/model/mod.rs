//! Trainable-model capability
//!
//! Two sides of the contract:
//! - [`Estimator`]: configuration that knows how to fit
//! - [`Predictor`]: a fitted model that predicts and can be persisted
//!
//! Fitted models are stored as self-describing JSON blobs:
//!
//! ```json
//! {"type": "tabflow.model.LinearModel", "state": {"features": ["x"], "intercept": 0.5, "weights": [2.0]}}
//! ```
//!
//! The `type` tag is resolved back to a loader through
//! [`crate::registry::LoaderRegistry`].

mod linear;
mod mean;
mod metric;

pub use linear::{LinearEstimator, LinearModel, LINEAR_MODEL_TAG};
pub use mean::{MeanEstimator, MeanModel, MEAN_MODEL_TAG};
pub use metric::Metric;

use crate::frame::Frame;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::fs;
use std::path::Path;

/// Model configuration that can be fitted against a target column.
pub trait Estimator: Debug {
    /// Short name used in logs and step identities
    fn name(&self) -> &'static str;

    /// Hyper-parameters as JSON (logged and recorded in descriptors)
    fn params(&self) -> Value;

    /// Fit on `train`, predicting `target`.
    ///
    /// `valid` is a held-out frame estimators may use for early stopping;
    /// the built-in estimators ignore it.
    ///
    /// # Errors
    /// Returns error if the target is missing or fitting fails
    fn fit(&self, target: &str, train: &Frame, valid: Option<&Frame>) -> Result<Box<dyn Predictor>>;
}

/// A fitted model.
pub trait Predictor: Debug {
    /// Type tag written into model files and descriptors
    fn type_tag(&self) -> &'static str;

    /// One prediction per row of `data`.
    ///
    /// # Errors
    /// Returns error if `data` lacks the columns the model was fitted on
    fn predict(&self, data: &Frame) -> Result<Vec<f64>>;

    /// Serializable fitted state.
    ///
    /// # Errors
    /// Returns error if the state cannot be encoded
    fn state(&self) -> Result<Value>;
}

/// On-disk form of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBlob {
    /// Predictor type tag
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Predictor-specific state
    pub state: Value,
}

impl ModelBlob {
    /// Capture a predictor.
    ///
    /// # Errors
    /// Returns error if the predictor state cannot be encoded
    pub fn capture(predictor: &dyn Predictor) -> Result<Self> {
        Ok(Self {
            type_tag: predictor.type_tag().to_string(),
            state: predictor.state()?,
        })
    }

    /// Write the blob to `path`, replacing it.
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a blob from `path`.
    ///
    /// # Errors
    /// Returns `MissingArtifact` if the file is absent and `StorageError` if
    /// it is not a model blob
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingArtifact(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            Error::StorageError(format!("Invalid model file {}: {e}", path.display()))
        })
    }
}

/// Serializable estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Predict the training mean of the target
    Mean,
    /// Ridge regression over numeric features
    Linear {
        /// L2 penalty
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
}

const fn default_alpha() -> f64 {
    1.0
}

impl ModelSpec {
    /// Build the configured estimator.
    #[must_use]
    pub fn build(&self) -> Box<dyn Estimator> {
        match self {
            Self::Mean => Box::new(MeanEstimator),
            Self::Linear { alpha } => Box::new(LinearEstimator::new(*alpha)),
        }
    }
}

/// Non-null target values of a training frame.
pub(crate) fn target_values(frame: &Frame, target: &str) -> Result<Vec<f64>> {
    let values = frame.float_column(target)?;
    if values.iter().all(|v| v.is_nan()) {
        return Err(Error::ModelError(format!(
            "target '{target}' has no values to fit on"
        )));
    }
    Ok(values)
}
