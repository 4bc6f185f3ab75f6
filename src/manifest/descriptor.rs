//! Artifact Descriptor - how to rebuild a persisted artifact

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recorded metadata for one artifact (dataset or model).
///
/// ## JSON Format
///
/// ```json
/// {
///   "created_at": "2024-05-01T12:00:00Z",
///   "type": "tabflow.storage.CsvDataset",
///   "filename": "clean.csv",
///   "params": {"read_params": {"index_col": "id"}, "write_params": {}}
/// }
/// ```
///
/// `filename` is relative to the stage directory holding the manifest.
/// `params` is opaque to the manifest; the loader for `type` interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactDescriptor {
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    type_tag: String,
    filename: String,
    params: Value,
}

impl ArtifactDescriptor {
    /// Create a descriptor stamped with the current time.
    #[must_use]
    pub fn new(type_tag: impl Into<String>, filename: impl Into<String>, params: Value) -> Self {
        Self {
            created_at: Utc::now(),
            type_tag: type_tag.into(),
            filename: filename.into(),
            params,
        }
    }

    /// Create a descriptor from serializable construction parameters.
    ///
    /// # Errors
    /// Returns error if `params` cannot be encoded as JSON
    pub fn with_params<P: Serialize>(
        type_tag: impl Into<String>,
        filename: impl Into<String>,
        params: &P,
    ) -> Result<Self> {
        Ok(Self::new(type_tag, filename, serde_json::to_value(params)?))
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Type tag resolved through the loader registry.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// File name relative to the stage directory.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw construction parameters.
    #[must_use]
    pub const fn params(&self) -> &Value {
        &self.params
    }

    /// Construction parameters decoded into a typed structure.
    ///
    /// # Errors
    /// Returns `StorageError` if the parameters do not fit `P`
    pub fn decode_params<P: DeserializeOwned>(&self) -> Result<P> {
        serde_json::from_value(self.params.clone()).map_err(|e| {
            Error::StorageError(format!(
                "Invalid params for {} ({}): {e}",
                self.filename, self.type_tag
            ))
        })
    }
}
