//! # tabflow: cached pipelines for tabular experiments
//!
//! tabflow chains preprocessing, feature extraction, cross-validation,
//! model fitting and submission writing over Arrow record batches, caching
//! every stage's output on disk so repeated runs skip finished work.
//!
//! ## Design Principles
//!
//! - **One ledger per stage**: each stage directory has a `meta.json`
//!   manifest mapping logical names to artifact descriptors
//! - **All or nothing caching**: a step is skipped only when every declared
//!   output is recorded
//! - **Closed type set**: recorded type tags resolve through a
//!   [`registry::LoaderRegistry`] validated before anything runs
//! - **Resumable**: manifests are persisted after every new artifact
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tabflow::config::ProjectLayout;
//! use tabflow::pipeline::{Orchestrator, PipelineSpec};
//! use tabflow::registry::LoaderRegistry;
//!
//! let pipeline = PipelineSpec::from_path("pipeline.json")?.into_pipeline()?;
//! let mut orchestrator = Orchestrator::open(ProjectLayout::new("."), LoaderRegistry::new())?;
//!
//! let report = orchestrator.run(&pipeline)?;
//! println!("{} executed, {} from cache", report.executed(), report.cache_hits());
//! # Ok::<(), tabflow::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod cv;
pub mod error;
pub mod frame;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod step;
pub mod storage;
pub mod submission;
pub mod trainer;

pub use error::{Error, Result};
