//! Per-stage manifests (the caching ledger)
//!
//! Every stage directory holds one `meta.json`. All stages share the base
//! fields; the body type adds what the stage tracks:
//!
//! ```text
//! stage            body              extra keys
//! preprocessed     DatasetCatalog    "datasets"
//! features         DatasetCatalog    "datasets"
//! cv               FoldSettings      "folds_filename", "n_runs", "n_folds"
//! models           ModelCatalog      "models"
//! submissions      NoRecords         (none)
//! ```
//!
//! Opening a manifest re-encodes the parsed document and compares key sets
//! at every level, so a field the typed structure would silently drop is
//! reported as [`Error::ManifestSchema`] instead.

mod descriptor;
mod timestamp;

pub use descriptor::ArtifactDescriptor;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Format version written into fresh manifests.
pub const MANIFEST_VERSION: u32 = 1;

/// Stage-specific part of a manifest document.
pub trait ManifestBody: Serialize + DeserializeOwned + Default {}

/// Bodies that map logical names to artifact descriptors.
pub trait Catalog {
    /// Recorded descriptors by logical name
    fn entries(&self) -> &FxHashMap<String, ArtifactDescriptor>;

    /// Mutable access to the recorded descriptors
    fn entries_mut(&mut self) -> &mut FxHashMap<String, ArtifactDescriptor>;
}

/// Dataset-bearing body (preprocessing and feature stages).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetCatalog {
    /// Dataset descriptors by logical name
    pub datasets: FxHashMap<String, ArtifactDescriptor>,
}

impl ManifestBody for DatasetCatalog {}

impl Catalog for DatasetCatalog {
    fn entries(&self) -> &FxHashMap<String, ArtifactDescriptor> {
        &self.datasets
    }

    fn entries_mut(&mut self) -> &mut FxHashMap<String, ArtifactDescriptor> {
        &mut self.datasets
    }
}

/// Model-bearing body (model stage).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Model descriptors by model id
    pub models: FxHashMap<String, ArtifactDescriptor>,
}

impl ManifestBody for ModelCatalog {}

impl Catalog for ModelCatalog {
    fn entries(&self) -> &FxHashMap<String, ArtifactDescriptor> {
        &self.models
    }

    fn entries_mut(&mut self) -> &mut FxHashMap<String, ArtifactDescriptor> {
        &mut self.models
    }
}

/// Cross-validation body: where folds live and how they were cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSettings {
    /// Fold file name inside the cv stage directory
    pub folds_filename: String,
    /// Independent shuffled runs
    pub n_runs: usize,
    /// Folds per run
    pub n_folds: usize,
}

impl Default for FoldSettings {
    fn default() -> Self {
        Self {
            folds_filename: "folds.json".to_string(),
            n_runs: 3,
            n_folds: 3,
        }
    }
}

impl ManifestBody for FoldSettings {}

/// Body of a plain manifest (base fields only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoRecords {}

impl ManifestBody for NoRecords {}

/// Preprocessing and feature-stage manifest.
pub type DatasetManifest = Manifest<DatasetCatalog>;

/// Model-stage manifest.
pub type ModelManifest = Manifest<ModelCatalog>;

/// Cross-validation manifest.
pub type CvManifest = Manifest<FoldSettings>;

/// Submission-stage manifest.
pub type PlainManifest = Manifest<NoRecords>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Document<B> {
    #[serde(deserialize_with = "timestamp::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    updated_at: DateTime<Utc>,
    version: u32,
    #[serde(flatten)]
    body: B,
}

/// A versioned JSON manifest bound to its backing file.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest<B> {
    path: PathBuf,
    doc: Document<B>,
}

impl<B: ManifestBody> Manifest<B> {
    /// Load the manifest at `path`, or start a fresh one if the file is absent.
    ///
    /// A fresh manifest is not written until [`Manifest::persist`].
    ///
    /// # Errors
    /// Returns `ManifestCorrupt` for unreadable JSON or missing fields and
    /// `ManifestSchema` when the document carries keys the stage does not know
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "Creating fresh manifest");
            let now = Utc::now();
            return Ok(Self {
                path,
                doc: Document {
                    created_at: now,
                    updated_at: now,
                    version: MANIFEST_VERSION,
                    body: B::default(),
                },
            });
        }

        let text = fs::read_to_string(&path)?;
        let corrupt = |reason: String| Error::ManifestCorrupt {
            path: path.clone(),
            reason,
        };
        let raw: Value = serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        if !raw.is_object() {
            return Err(corrupt("top level is not a JSON object".to_string()));
        }
        let doc: Document<B> =
            serde_json::from_value(raw.clone()).map_err(|e| corrupt(e.to_string()))?;

        let reencoded = serde_json::to_value(&doc)?;
        let mut missing = Vec::new();
        let mut unexpected = Vec::new();
        diff_keys(&reencoded, &raw, "", &mut missing, &mut unexpected);
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(Error::ManifestSchema {
                path,
                missing,
                unexpected,
            });
        }

        debug!(path = %path.display(), "Loaded manifest");
        Ok(Self { path, doc })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.doc.version
    }

    /// When the manifest was first created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.doc.created_at
    }

    /// When the manifest was last persisted.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.doc.updated_at
    }

    /// Stage-specific content.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.doc.body
    }

    /// Mutable stage-specific content (not persisted until [`Manifest::persist`]).
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.doc.body
    }

    /// Write the full document to the backing file, replacing it.
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn persist(&mut self) -> Result<()> {
        self.doc.updated_at = Utc::now();
        let text = serde_json::to_string_pretty(&self.doc)?;
        fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), "Persisted manifest");
        Ok(())
    }
}

impl<B: ManifestBody + Catalog> Manifest<B> {
    /// Descriptor recorded under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ArtifactDescriptor> {
        self.doc.body.entries().get(name)
    }

    /// Whether `name` has a recorded descriptor.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.doc.body.entries().contains_key(name)
    }

    /// Insert or overwrite the descriptor for `name` (in memory only).
    pub fn record(&mut self, name: impl Into<String>, descriptor: ArtifactDescriptor) {
        self.doc.body.entries_mut().insert(name.into(), descriptor);
    }

    /// Every recorded `(name, descriptor)` pair.
    pub fn descriptors(&self) -> impl Iterator<Item = (&str, &ArtifactDescriptor)> {
        self.doc
            .body
            .entries()
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    /// Number of recorded artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc.body.entries().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc.body.entries().is_empty()
    }
}

/// Collect object keys present in `expected` but not `actual` (missing) and
/// the reverse (unexpected), as dotted paths.
fn diff_keys(
    expected: &Value,
    actual: &Value,
    prefix: &str,
    missing: &mut Vec<String>,
    unexpected: &mut Vec<String>,
) {
    let (Value::Object(expected), Value::Object(actual)) = (expected, actual) else {
        return;
    };
    let path = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    for (key, value) in expected {
        match actual.get(key) {
            Some(other) => diff_keys(value, other, &path(key), missing, unexpected),
            None => missing.push(path(key)),
        }
    }
    unexpected.extend(
        actual
            .keys()
            .filter(|key| !expected.contains_key(*key))
            .map(|key| path(key)),
    );
}
