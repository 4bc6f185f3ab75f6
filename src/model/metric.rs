//! Scoring metrics

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Regression metric (lower is better for both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Root mean squared error
    #[default]
    Rmse,
    /// Mean absolute error
    Mae,
}

impl Metric {
    /// Short name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rmse => "rmse",
            Self::Mae => "mae",
        }
    }

    /// Score predictions against ground truth.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty or differently sized inputs
    #[allow(clippy::cast_precision_loss)]
    pub fn score(self, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(Error::InvalidInput(format!(
                "{} needs equal lengths, got {} truths and {} predictions",
                self.name(),
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(Error::InvalidInput(format!("{} of an empty set", self.name())));
        }
        let n = y_true.len() as f64;
        let pairs = y_true.iter().zip(y_pred);
        Ok(match self {
            Self::Rmse => (pairs.map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n).sqrt(),
            Self::Mae => pairs.map(|(t, p)| (t - p).abs()).sum::<f64>() / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmse() {
        let score = Metric::Rmse.score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]).unwrap();
        assert!((score - (4.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mae() {
        let score = Metric::Mae.score(&[1.0, -1.0], &[0.0, 0.0]).unwrap();
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(Metric::Rmse.score(&[], &[]).is_err());
        assert!(Metric::Mae.score(&[1.0], &[1.0, 2.0]).is_err());
    }
}
