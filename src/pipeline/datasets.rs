//! In-process dataset registry for a single run

use crate::frame::Frame;
use crate::storage::Dataset;
use crate::{Error, Result};
use rustc_hash::FxHashMap;

/// Logical name to lazily loaded dataset.
///
/// Seeded from the sources, grown as steps publish outputs, dropped at the
/// end of the run.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: FxHashMap<String, Dataset>,
}

impl DatasetRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `dataset` available as `name`, replacing any earlier one.
    pub fn publish(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(name.into(), dataset);
    }

    /// Whether `name` has been published.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    /// Number of published datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// The dataset published as `name`.
    ///
    /// # Errors
    /// Returns `UnresolvedInput` naming `step` if nothing was published
    pub fn resolve(&self, step: &str, name: &str) -> Result<&Dataset> {
        self.datasets.get(name).ok_or_else(|| Error::UnresolvedInput {
            step: step.to_string(),
            name: name.to_string(),
        })
    }

    /// The payload of `name`, loading it on first use.
    ///
    /// # Errors
    /// Returns `UnresolvedInput` or the dataset's read error
    pub fn frame(&self, step: &str, name: &str) -> Result<&Frame> {
        self.resolve(step, name)?.frame()
    }
}
