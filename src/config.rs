//! Project directory layout
//!
//! ```text
//! <root>/
//!   data/                      source datasets (never written)
//!   assets/
//!     preprocessed/meta.json   + preprocessed datasets
//!     features/meta.json       + feature datasets
//!     cv/meta.json             + folds.json
//!     models/meta.json         + <model_id>.json
//!     submissions/meta.json    + <submission_id>.csv
//! ```

use crate::Result;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file name inside every stage directory.
pub const MANIFEST_FILENAME: &str = "meta.json";

/// Pipeline stage, each with its own directory and manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Preprocessing outputs
    Preprocessed,
    /// Feature-extraction outputs
    Features,
    /// Fold partitions and cross-validation settings
    CrossValidation,
    /// Trained models
    Models,
    /// Submission files
    Submissions,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::Preprocessed,
        Self::Features,
        Self::CrossValidation,
        Self::Models,
        Self::Submissions,
    ];

    /// Directory name under the assets directory.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Preprocessed => "preprocessed",
            Self::Features => "features",
            Self::CrossValidation => "cv",
            Self::Models => "models",
            Self::Submissions => "submissions",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Resolved project directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    data_dir: PathBuf,
    assets_dir: PathBuf,
}

impl ProjectLayout {
    /// Default layout (`data/`, `assets/`) under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::builder(root).build()
    }

    /// Start a layout builder for `root`.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> ProjectLayoutBuilder {
        ProjectLayoutBuilder {
            root: root.into(),
            data_dir: PathBuf::from("data"),
            assets_dir: PathBuf::from("assets"),
        }
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source dataset directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Assets directory holding every stage directory.
    #[must_use]
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Directory of `stage`.
    #[must_use]
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.assets_dir.join(stage.dir_name())
    }

    /// Manifest file of `stage`.
    #[must_use]
    pub fn manifest_path(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(MANIFEST_FILENAME)
    }

    /// Create the assets directory and every stage directory.
    ///
    /// # Errors
    /// Returns error if a directory cannot be created
    pub fn prepare(&self) -> Result<()> {
        for stage in Stage::ALL {
            fs::create_dir_all(self.stage_dir(stage))?;
        }
        Ok(())
    }
}

/// Builder for [`ProjectLayout`]; relative directories resolve against the root.
#[derive(Debug, Clone)]
pub struct ProjectLayoutBuilder {
    root: PathBuf,
    data_dir: PathBuf,
    assets_dir: PathBuf,
}

impl ProjectLayoutBuilder {
    /// Source dataset directory (default `data`).
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Assets directory (default `assets`).
    #[must_use]
    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Resolve the layout.
    #[must_use]
    pub fn build(self) -> ProjectLayout {
        ProjectLayout {
            data_dir: self.root.join(self.data_dir),
            assets_dir: self.root.join(self.assets_dir),
            root: self.root,
        }
    }
}
