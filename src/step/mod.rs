//! Dataset-producing pipeline steps
//!
//! A [`DataStep`] binds a [`Transform`] to named inputs and outputs:
//!
//! ```text
//! registry["reviews"], registry["products"]
//!        │
//!        ▼
//!   DataStep { inputs: [reviews, products], outputs: [joined], JoinFeatures }
//!        │
//!        ▼
//! registry["joined"]
//! ```
//!
//! The step identity `Name:in,..:out,..` is derived from kind, inputs and
//! outputs only, so two steps with the same wiring are the same step.

mod features;
mod preprocess;

pub use features::JoinFeatures;
pub use preprocess::{ExtractColumn, FillNulls, ReplacePatterns, StemText};

use crate::error::AritySide;
use crate::frame::Frame;
use crate::storage::DatasetFormat;
use crate::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tracing::info;

/// A pure transformation over in-memory frames.
pub trait Transform: fmt::Debug {
    /// Kind name used in identities and logs
    fn name(&self) -> &'static str;

    /// Configuration parameters (logged before execution)
    fn params(&self) -> Value;

    /// Produce output frames from input frames.
    ///
    /// # Errors
    /// Returns error if an input does not have the expected shape
    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>>;
}

/// A preprocessing or feature-extraction step.
#[derive(Debug)]
pub struct DataStep {
    inputs: Vec<String>,
    outputs: Vec<String>,
    transform: Box<dyn Transform>,
    format: DatasetFormat,
}

impl DataStep {
    /// Wire `transform` to named inputs and outputs (outputs stored as CSV).
    #[must_use]
    pub fn new<I, O>(transform: impl Transform + 'static, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self::from_boxed(Box::new(transform), inputs, outputs)
    }

    /// Same as [`DataStep::new`] for an already boxed transform.
    #[must_use]
    pub fn from_boxed<I, O>(transform: Box<dyn Transform>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            transform,
            format: DatasetFormat::default(),
        }
    }

    /// Store outputs in `format` instead of CSV.
    #[must_use]
    pub const fn with_format(mut self, format: DatasetFormat) -> Self {
        self.format = format;
        self
    }

    /// Input names, in the order the transform receives them.
    #[must_use]
    pub fn declared_inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output names, in the order the transform produces them.
    #[must_use]
    pub fn declared_outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Encoding of the produced datasets.
    #[must_use]
    pub const fn format(&self) -> DatasetFormat {
        self.format
    }

    /// Deterministic identity: `Name:in1,in2:out1`.
    #[must_use]
    pub fn identity(&self) -> String {
        format!(
            "{}:{}:{}",
            self.transform.name(),
            self.inputs.join(","),
            self.outputs.join(",")
        )
    }

    /// Run the transform, enforcing declared arity on both sides.
    ///
    /// # Errors
    /// Returns `ArityMismatch` if input or output counts differ from the
    /// declaration, or the transform's own error
    pub fn execute(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        check_arity(self, AritySide::Inputs, self.inputs.len(), inputs.len())?;

        info!(step = %self, params = %self.transform.params(), "Applying step");
        let start = Instant::now();
        let outputs = self.transform.apply(inputs)?;
        check_arity(self, AritySide::Outputs, self.outputs.len(), outputs.len())?;
        info!(elapsed_secs = start.elapsed().as_secs_f64(), "Step finished");

        Ok(outputs)
    }
}

fn check_arity(step: &DataStep, side: AritySide, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(Error::ArityMismatch {
        step: step.identity(),
        side,
        expected,
        actual,
    })
}

impl fmt::Display for DataStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.transform.name(),
            self.inputs.join(","),
            self.outputs.join(",")
        )
    }
}

/// Apply `f` to every input independently (one output per input).
pub(crate) fn map_each<F>(inputs: &[&Frame], f: F) -> Result<Vec<Frame>>
where
    F: Fn(&Frame) -> Result<Frame>,
{
    inputs.iter().map(|frame| f(frame)).collect()
}
