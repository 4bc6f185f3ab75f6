//! Fold partitions and their on-disk cache

use crate::frame::Frame;
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One train/test split, serialized as `[[train ids], [test ids]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldPair(Vec<i64>, Vec<i64>);

impl FoldPair {
    /// Pair training ids with held-out ids.
    #[must_use]
    pub const fn new(train: Vec<i64>, test: Vec<i64>) -> Self {
        Self(train, test)
    }

    /// Row ids to fit on.
    #[must_use]
    pub fn train(&self) -> &[i64] {
        &self.0
    }

    /// Row ids to score on.
    #[must_use]
    pub fn test(&self) -> &[i64] {
        &self.1
    }
}

/// Folds for every run: `runs[run][fold]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoldPartitionSet {
    runs: Vec<Vec<FoldPair>>,
}

impl FoldPartitionSet {
    /// Shuffle `ids` independently `n_runs` times and cut each shuffle
    /// into `n_folds` contiguous test blocks.
    ///
    /// Block sizes differ by at most one; the first `len % n_folds` blocks
    /// take the extra id.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `n_folds < 2`, `n_runs < 1`, there are
    /// fewer ids than folds, or an id repeats
    pub fn generate(ids: &[i64], n_runs: usize, n_folds: usize, seed: Option<u64>) -> Result<Self> {
        if n_folds < 2 {
            return Err(Error::InvalidInput(format!(
                "n_folds must be at least 2, got {n_folds}"
            )));
        }
        if n_runs < 1 {
            return Err(Error::InvalidInput("n_runs must be at least 1".to_string()));
        }
        if ids.len() < n_folds {
            return Err(Error::InvalidInput(format!(
                "{} rows cannot be split into {n_folds} folds",
                ids.len()
            )));
        }
        let mut seen = FxHashSet::default();
        if let Some(repeated) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(Error::InvalidInput(format!(
                "row id {repeated} appears more than once; fold ids must be unique"
            )));
        }

        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let base = ids.len() / n_folds;
        let remainder = ids.len() % n_folds;

        let runs = (0..n_runs)
            .map(|_| {
                let mut shuffled = ids.to_vec();
                shuffled.shuffle(&mut rng);

                let mut start = 0;
                (0..n_folds)
                    .map(|fold| {
                        let size = if fold < remainder { base + 1 } else { base };
                        let end = start + size;
                        let test = shuffled[start..end].to_vec();
                        let train = shuffled[..start]
                            .iter()
                            .chain(&shuffled[end..])
                            .copied()
                            .collect();
                        start = end;
                        FoldPair::new(train, test)
                    })
                    .collect()
            })
            .collect();

        Ok(Self { runs })
    }

    /// Folds grouped by run.
    #[must_use]
    pub fn runs(&self) -> &[Vec<FoldPair>] {
        &self.runs
    }

    /// Number of runs.
    #[must_use]
    pub fn n_runs(&self) -> usize {
        self.runs.len()
    }

    /// Total number of (run, fold) evaluations.
    #[must_use]
    pub fn n_evaluations(&self) -> usize {
        self.runs.iter().map(Vec::len).sum()
    }

    /// Read a fold file.
    ///
    /// # Errors
    /// Returns `StorageError` if the file is unreadable or not a fold set
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            Error::StorageError(format!("Corrupt fold file {}: {e}", path.display()))
        })
    }

    /// Write a fold file, replacing it.
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

/// Generates folds once per configuration and reuses them afterwards.
#[derive(Debug, Clone)]
pub struct FoldCache {
    path: PathBuf,
    seed: Option<u64>,
}

impl FoldCache {
    /// Cache backed by the fold file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed: None,
        }
    }

    /// Generate with a fixed seed instead of entropy.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Fold file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Folds for `frame`.
    ///
    /// An existing fold file is returned as stored, without checking it
    /// against `frame` or the requested counts. Otherwise new folds are cut
    /// over the frame's row ids and written before returning.
    ///
    /// # Errors
    /// Returns `NonIntegerIndex` if the frame's row ids are not integers,
    /// `StorageError` for an unreadable fold file
    pub fn folds_for(&self, frame: &Frame, n_runs: usize, n_folds: usize) -> Result<FoldPartitionSet> {
        if self.path.exists() {
            let folds = FoldPartitionSet::load(&self.path)?;
            info!(
                path = %self.path.display(),
                runs = folds.n_runs(),
                evaluations = folds.n_evaluations(),
                "Reusing cached folds"
            );
            return Ok(folds);
        }

        let ids = frame.row_ids()?;
        let folds = FoldPartitionSet::generate(&ids, n_runs, n_folds, self.seed)?;
        folds.save(&self.path)?;
        info!(path = %self.path.display(), n_runs, n_folds, "Generated folds");
        Ok(folds)
    }
}
