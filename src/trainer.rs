//! Model training step

use crate::frame::Frame;
use crate::manifest::{ArtifactDescriptor, ModelManifest};
use crate::model::{Estimator, ModelBlob};
use crate::storage::ensure_extension;
use crate::Result;
use serde_json::json;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Fits an estimator on a whole dataset and records the fitted model.
#[derive(Debug)]
pub struct ModelMaker {
    model_id: String,
    estimator: Box<dyn Estimator>,
    dataset: String,
    target: String,
}

impl ModelMaker {
    /// Train `estimator` on `dataset` to predict `target`, stored as `model_id`.
    #[must_use]
    pub fn new(
        model_id: impl Into<String>,
        estimator: Box<dyn Estimator>,
        dataset: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            estimator,
            dataset: dataset.into(),
            target: target.into(),
        }
    }

    /// Model id (manifest key and file stem).
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Logical name of the training dataset.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Fit, write `<model_id>.json` into `stage_dir`, record and persist.
    ///
    /// # Errors
    /// Returns error if fitting fails or the model or manifest cannot be written
    pub fn run(
        &self,
        frame: &Frame,
        stage_dir: &Path,
        manifest: &mut ModelManifest,
    ) -> Result<ArtifactDescriptor> {
        info!(step = %self, params = %self.estimator.params(), "Training model");
        let start = Instant::now();
        let model = self.estimator.fit(&self.target, frame, None)?;

        let filename = ensure_extension(&self.model_id, "json");
        ModelBlob::capture(model.as_ref())?.save(&stage_dir.join(&filename))?;

        let descriptor = ArtifactDescriptor::new(
            model.type_tag(),
            filename,
            json!({
                "estimator": self.estimator.name(),
                "params": self.estimator.params(),
                "dataset": self.dataset,
                "target": self.target,
            }),
        );
        manifest.record(self.model_id.clone(), descriptor.clone());
        manifest.persist()?;
        info!(elapsed_secs = start.elapsed().as_secs_f64(), "Model saved");
        Ok(descriptor)
    }
}

impl fmt::Display for ModelMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModelMaker {} -> {} ({})",
            self.dataset,
            self.model_id,
            self.estimator.name()
        )
    }
}
