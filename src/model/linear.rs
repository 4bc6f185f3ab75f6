//! Ridge regression over the numeric columns of a frame

use super::{target_values, Estimator, Predictor};
use crate::frame::Frame;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Type tag of [`LinearModel`] files.
pub const LINEAR_MODEL_TAG: &str = "tabflow.model.LinearModel";

/// Closed-form ridge regression with an unpenalized intercept.
///
/// Features are every numeric column except the index and the target.
/// Null feature values are treated as `0.0`; rows with a null target are
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearEstimator {
    alpha: f64,
}

impl Default for LinearEstimator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LinearEstimator {
    /// Estimator with L2 penalty `alpha`.
    #[must_use]
    pub const fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// L2 penalty.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Estimator for LinearEstimator {
    fn name(&self) -> &'static str {
        "LinearEstimator"
    }

    fn params(&self) -> Value {
        json!({ "alpha": self.alpha })
    }

    fn fit(&self, target: &str, train: &Frame, _valid: Option<&Frame>) -> Result<Box<dyn Predictor>> {
        if self.alpha < 0.0 {
            return Err(Error::ModelError(format!(
                "alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        let y = target_values(train, target)?;
        let features = train.numeric_columns(&[target]);
        let matrix = train.feature_matrix(&features)?;

        let (rows, y): (Vec<Vec<f64>>, Vec<f64>) = matrix
            .into_iter()
            .zip(y)
            .filter(|(_, target)| !target.is_nan())
            .unzip();

        let (intercept, weights) = ridge(&rows, &y, features.len(), self.alpha)?;
        Ok(Box::new(LinearModel {
            features,
            intercept,
            weights,
        }))
    }
}

/// Center, solve `(XᵀX + αI) w = Xᵀy`, recover the intercept from the means.
#[allow(clippy::cast_precision_loss)]
fn ridge(rows: &[Vec<f64>], y: &[f64], p: usize, alpha: f64) -> Result<(f64, Vec<f64>)> {
    let n = rows.len() as f64;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut x_mean = vec![0.0; p];
    for row in rows {
        for (mean, value) in x_mean.iter_mut().zip(row) {
            *mean += value / n;
        }
    }

    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for (row, target) in rows.iter().zip(y) {
        let centered: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
        for i in 0..p {
            xty[i] += centered[i] * (target - y_mean);
            for j in 0..=i {
                xtx[i][j] += centered[i] * centered[j];
            }
        }
    }
    for i in 0..p {
        xtx[i][i] += alpha;
        for j in 0..i {
            xtx[j][i] = xtx[i][j];
        }
    }

    let weights = cholesky_solve(&xtx, &xty).ok_or_else(|| {
        Error::ModelError("normal equations are singular; increase alpha".to_string())
    })?;
    let intercept = y_mean - weights.iter().zip(&x_mean).map(|(w, m)| w * m).sum::<f64>();
    Ok((intercept, weights))
}

/// Solve a symmetric positive-definite system, `None` if it is not.
fn cholesky_solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = a[i][i] - sum;
                if diag <= f64::EPSILON {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }

    let mut z = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * z[j]).sum();
        z[i] = (b[i] - sum) / l[i][i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[j][i] * x[j]).sum();
        x[i] = (z[i] - sum) / l[i][i];
    }
    Some(x)
}

/// Fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    features: Vec<String>,
    intercept: f64,
    weights: Vec<f64>,
}

impl LinearModel {
    /// Feature columns, in weight order.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Intercept term.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Per-feature weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Rebuild from a saved state.
    ///
    /// # Errors
    /// Returns `StorageError` if the state does not describe a linear model
    pub fn from_state(state: Value) -> Result<Box<dyn Predictor>> {
        let model: Self = serde_json::from_value(state)
            .map_err(|e| Error::StorageError(format!("Invalid linear model state: {e}")))?;
        if model.features.len() != model.weights.len() {
            return Err(Error::StorageError(format!(
                "linear model has {} features but {} weights",
                model.features.len(),
                model.weights.len()
            )));
        }
        Ok(Box::new(model))
    }
}

impl Predictor for LinearModel {
    fn type_tag(&self) -> &'static str {
        LINEAR_MODEL_TAG
    }

    fn predict(&self, data: &Frame) -> Result<Vec<f64>> {
        let matrix = data.feature_matrix(&self.features)?;
        Ok(matrix
            .iter()
            .map(|row| {
                self.intercept + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>()
            })
            .collect())
    }

    fn state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
