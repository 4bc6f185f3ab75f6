//! Artifact store for datasets
//!
//! A [`Dataset`] couples a file path, an encoding ([`DatasetFormat`]) and the
//! construction parameters ([`DatasetParams`]) needed to read and write it
//! the same way on every run. The payload is materialized lazily:
//!
//! ```text
//! Dataset::load(path, ..)   -> nothing read yet
//! dataset.frame()?          -> file read once, cached in the instance
//! dataset.frame()?          -> cached frame
//! ```
//!
//! Steps whose outputs are never consumed downstream therefore cost no I/O
//! on a cache hit.

mod codec;

use crate::frame::Frame;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Type tag recorded for CSV datasets.
pub const CSV_DATASET_TAG: &str = "tabflow.storage.CsvDataset";

/// Type tag recorded for Parquet datasets.
pub const PARQUET_DATASET_TAG: &str = "tabflow.storage.ParquetDataset";

/// Encoding of a dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// Headed CSV text (default)
    #[default]
    Csv,
    /// Apache Parquet
    Parquet,
}

impl DatasetFormat {
    /// Extension appended to logical names that have none.
    #[must_use]
    pub const fn default_extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Type tag written into manifest descriptors.
    #[must_use]
    pub const fn type_tag(self) -> &'static str {
        match self {
            Self::Csv => CSV_DATASET_TAG,
            Self::Parquet => PARQUET_DATASET_TAG,
        }
    }

    /// File name for a logical dataset name.
    #[must_use]
    pub fn filename_for(self, logical_name: &str) -> String {
        ensure_extension(logical_name, self.default_extension())
    }
}

/// Append `.extension` to `filename` if it has no extension yet.
#[must_use]
pub fn ensure_extension(filename: &str, extension: &str) -> String {
    if Path::new(filename).extension().is_some() {
        filename.to_string()
    } else {
        format!("{filename}.{extension}")
    }
}

/// How to rebuild the frame index when reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadParams {
    /// Column to restore as the natural index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_col: Option<String>,
}

/// How to treat the index when writing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteParams {
    /// `Some(false)` suppresses the index column on write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
}

/// Construction parameters recorded next to every dataset descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetParams {
    /// Read-side parameters
    #[serde(default)]
    pub read_params: ReadParams,
    /// Write-side parameters
    #[serde(default)]
    pub write_params: WriteParams,
}

impl DatasetParams {
    /// Parameters for a frame indexed by the named column.
    #[must_use]
    pub fn natural_index(column: impl Into<String>) -> Self {
        Self {
            read_params: ReadParams {
                index_col: Some(column.into()),
            },
            write_params: WriteParams::default(),
        }
    }

    /// Parameters for a frame with a synthetic row-number index.
    #[must_use]
    pub fn synthetic_index() -> Self {
        Self {
            read_params: ReadParams::default(),
            write_params: WriteParams { index: Some(false) },
        }
    }

    /// Derive parameters from the shape of a produced frame.
    ///
    /// A natural index is remembered for reload, a synthetic one is not
    /// written at all and regenerated on reload.
    #[must_use]
    pub fn derive(frame: &Frame) -> Self {
        frame
            .index_name()
            .map_or_else(Self::synthetic_index, Self::natural_index)
    }

    fn writes_index(&self) -> bool {
        self.write_params.index.unwrap_or(true)
    }
}

/// A dataset artifact backed by a file.
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    format: DatasetFormat,
    params: DatasetParams,
    frame: OnceCell<Frame>,
}

impl Dataset {
    /// Create a dataset from an in-memory frame, to be saved at `path`.
    ///
    /// `path` gets the format's default extension if it has none.
    #[must_use]
    pub fn new(
        path: impl AsRef<Path>,
        format: DatasetFormat,
        params: DatasetParams,
        frame: Frame,
    ) -> Self {
        Self {
            path: with_default_extension(path.as_ref(), format),
            format,
            params,
            frame: OnceCell::from(frame),
        }
    }

    /// Refer to an existing file without reading it.
    #[must_use]
    pub fn load(path: impl AsRef<Path>, format: DatasetFormat, params: DatasetParams) -> Self {
        Self {
            path: with_default_extension(path.as_ref(), format),
            format,
            params,
            frame: OnceCell::new(),
        }
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name relative to its stage directory.
    #[must_use]
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File encoding.
    #[must_use]
    pub const fn format(&self) -> DatasetFormat {
        self.format
    }

    /// Construction parameters.
    #[must_use]
    pub const fn params(&self) -> &DatasetParams {
        &self.params
    }

    /// Whether the payload has been materialized.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.frame.get().is_some()
    }

    /// The payload, read from disk on first access.
    ///
    /// # Errors
    /// Returns error if the file is missing or cannot be decoded
    pub fn frame(&self) -> Result<&Frame> {
        if let Some(frame) = self.frame.get() {
            return Ok(frame);
        }
        let frame = self.read()?;
        Ok(self.frame.get_or_init(|| frame))
    }

    fn read(&self) -> Result<Frame> {
        debug!(path = %self.path.display(), format = ?self.format, "Reading dataset");
        let batch = match self.format {
            DatasetFormat::Csv => codec::read_csv(&self.path)?,
            DatasetFormat::Parquet => codec::read_parquet(&self.path)?,
        };
        match &self.params.read_params.index_col {
            Some(index) => Frame::with_index(batch, index.clone()),
            None => Ok(Frame::new(batch)),
        }
    }

    /// Write the payload to `path`, replacing any previous content.
    ///
    /// # Errors
    /// Returns error if the payload is unavailable or the write fails
    pub fn save(&self) -> Result<()> {
        let frame = self.frame()?;
        let frame = match frame.index_name() {
            Some(index) if !self.params.writes_index() => frame.drop_column(index)?,
            _ => frame.clone(),
        };
        debug!(path = %self.path.display(), rows = frame.num_rows(), "Writing dataset");
        match self.format {
            DatasetFormat::Csv => codec::write_csv(&self.path, frame.batch()),
            DatasetFormat::Parquet => codec::write_parquet(&self.path, frame.batch()),
        }
    }
}

fn with_default_extension(path: &Path, format: DatasetFormat) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format.filename_for(&name.to_string_lossy())),
        None => path.to_path_buf(),
    }
}
