//! Error types for tabflow
//!
//! Three families, all fatal to the run that raised them:
//! - configuration errors (malformed pipeline definitions)
//! - persistence errors (manifests, fold files, artifact files)
//! - data errors (frames that violate a step's expectations)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a step contract was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AritySide {
    /// Inputs handed to the step
    Inputs,
    /// Outputs produced by the step
    Outputs,
}

impl std::fmt::Display for AritySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inputs => f.write_str("inputs"),
            Self::Outputs => f.write_str("outputs"),
        }
    }
}

/// tabflow error types
#[derive(Error, Debug)]
pub enum Error {
    /// Pipeline definition names a step kind nobody implements
    #[error("Unknown step kind: {0}")]
    UnknownStep(String),

    /// A step asked for a dataset that is not in the registry yet
    #[error("Unresolved input '{name}' for step {step}\nCheck the step order: inputs must be produced by an earlier step or declared as a source")]
    UnresolvedInput {
        /// Step identity
        step: String,
        /// Missing logical name
        name: String,
    },

    /// Declared and actual input/output counts differ (contract violation)
    #[error("Contract violation in {step}: declared {expected} {side}, got {actual}")]
    ArityMismatch {
        /// Step identity
        step: String,
        /// Inputs or outputs
        side: AritySide,
        /// Declared count
        expected: usize,
        /// Actual count
        actual: usize,
    },

    /// Invalid project or pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest file exists but is not valid JSON for its stage
    #[error("Corrupt manifest {path}: {reason}")]
    ManifestCorrupt {
        /// Manifest path
        path: PathBuf,
        /// Underlying parse failure
        reason: String,
    },

    /// Manifest key set differs from the stage schema
    #[error("Manifest {path} does not match its schema (missing: {missing:?}, unexpected: {unexpected:?})")]
    ManifestSchema {
        /// Manifest path
        path: PathBuf,
        /// Keys the schema requires but the document lacks
        missing: Vec<String>,
        /// Keys the document carries but the schema does not know
        unexpected: Vec<String>,
    },

    /// Descriptor type tag is not registered with the loader registry
    #[error("Unknown artifact type: {0}")]
    UnknownArtifactType(String),

    /// A recorded artifact (dataset or model) is not available
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// Storage error (CSV/Parquet/model files)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Row identifiers must be integers for fold generation
    #[error("Index column '{column}' has non-integer type {data_type}; integer row ids are required")]
    NonIntegerIndex {
        /// Index column name
        column: String,
        /// Arrow data type of the column
        data_type: String,
    },

    /// Column lookup failed
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Invalid input to an operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model fitting or prediction failed
    #[error("Model error: {0}")]
    ModelError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}
