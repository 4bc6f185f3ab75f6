//! Loader registry: recorded type tags to concrete constructors
//!
//! Descriptors store a type tag string. Instead of resolving it on every
//! load, the registry holds the closed set of known tags and every manifest
//! is checked against it when the orchestrator opens, so an unknown tag
//! fails the run before any step executes.

use crate::manifest::ArtifactDescriptor;
use crate::model::{
    LinearModel, MeanModel, ModelBlob, Predictor, LINEAR_MODEL_TAG, MEAN_MODEL_TAG,
};
use crate::storage::{Dataset, DatasetFormat, DatasetParams};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::Path;

/// Rebuilds a predictor from the `state` of a model blob.
pub type ModelLoader = fn(Value) -> Result<Box<dyn Predictor>>;

/// Maps descriptor type tags to dataset formats and model loaders.
#[derive(Debug, Clone)]
pub struct LoaderRegistry {
    datasets: FxHashMap<String, DatasetFormat>,
    models: FxHashMap<String, ModelLoader>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for format in [DatasetFormat::Csv, DatasetFormat::Parquet] {
            registry.register_dataset(format.type_tag(), format);
        }
        registry.register_model(MEAN_MODEL_TAG, MeanModel::from_state);
        registry.register_model(LINEAR_MODEL_TAG, LinearModel::from_state);
        registry
    }
}

impl LoaderRegistry {
    /// Registry with the built-in dataset formats and models.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that knows no tags at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            datasets: FxHashMap::default(),
            models: FxHashMap::default(),
        }
    }

    /// Accept `tag` for datasets stored in `format`.
    pub fn register_dataset(&mut self, tag: impl Into<String>, format: DatasetFormat) -> &mut Self {
        self.datasets.insert(tag.into(), format);
        self
    }

    /// Accept `tag` for model blobs rebuilt by `loader`.
    pub fn register_model(&mut self, tag: impl Into<String>, loader: ModelLoader) -> &mut Self {
        self.models.insert(tag.into(), loader);
        self
    }

    /// Dataset format registered for `tag`.
    ///
    /// # Errors
    /// Returns `UnknownArtifactType` for unregistered tags
    pub fn dataset_format(&self, tag: &str) -> Result<DatasetFormat> {
        self.datasets
            .get(tag)
            .copied()
            .ok_or_else(|| Error::UnknownArtifactType(tag.to_string()))
    }

    /// Model loader registered for `tag`.
    ///
    /// # Errors
    /// Returns `UnknownArtifactType` for unregistered tags
    pub fn model_loader(&self, tag: &str) -> Result<ModelLoader> {
        self.models
            .get(tag)
            .copied()
            .ok_or_else(|| Error::UnknownArtifactType(tag.to_string()))
    }

    /// Check that every dataset descriptor has a known tag and decodable params.
    ///
    /// # Errors
    /// Returns `UnknownArtifactType` or `StorageError` for the first bad entry
    pub fn validate_datasets<'a>(
        &self,
        descriptors: impl IntoIterator<Item = (&'a str, &'a ArtifactDescriptor)>,
    ) -> Result<()> {
        for (_, descriptor) in descriptors {
            self.dataset_format(descriptor.type_tag())?;
            descriptor.decode_params::<DatasetParams>()?;
        }
        Ok(())
    }

    /// Check that every model descriptor has a known tag.
    ///
    /// # Errors
    /// Returns `UnknownArtifactType` for the first unknown tag
    pub fn validate_models<'a>(
        &self,
        descriptors: impl IntoIterator<Item = (&'a str, &'a ArtifactDescriptor)>,
    ) -> Result<()> {
        for (_, descriptor) in descriptors {
            self.model_loader(descriptor.type_tag())?;
        }
        Ok(())
    }

    /// Rebuild a lazily loaded dataset from its descriptor.
    ///
    /// # Errors
    /// Returns error for unknown tags or undecodable params
    pub fn load_dataset(&self, stage_dir: &Path, descriptor: &ArtifactDescriptor) -> Result<Dataset> {
        let format = self.dataset_format(descriptor.type_tag())?;
        let params = descriptor.decode_params::<DatasetParams>()?;
        Ok(Dataset::load(
            stage_dir.join(descriptor.filename()),
            format,
            params,
        ))
    }

    /// Rebuild a fitted model from its descriptor.
    ///
    /// # Errors
    /// Returns error if the file is missing, its tag is unknown, or its tag
    /// disagrees with the descriptor
    pub fn load_model(
        &self,
        stage_dir: &Path,
        descriptor: &ArtifactDescriptor,
    ) -> Result<Box<dyn Predictor>> {
        let blob = ModelBlob::read(&stage_dir.join(descriptor.filename()))?;
        if blob.type_tag != descriptor.type_tag() {
            return Err(Error::StorageError(format!(
                "model file {} holds {}, manifest recorded {}",
                descriptor.filename(),
                blob.type_tag,
                descriptor.type_tag()
            )));
        }
        let loader = self.model_loader(&blob.type_tag)?;
        loader(blob.state)
    }
}
