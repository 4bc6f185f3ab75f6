//! Cache-or-execute driver over a pipeline
//!
//! Per dataset step:
//!
//! ```text
//! pending ──all outputs recorded──▶ cache hit: rebuild from descriptors
//!    │
//!    └──any output missing──▶ executing ──▶ persisted: save, record, persist manifest
//! ```
//!
//! Both paths publish the outputs into the [`DatasetRegistry`] for later
//! steps. A partial hit re-executes the step and overwrites every output.
//! Manifests are persisted right after each new artifact, so a failed run
//! keeps everything finished before the failure.

use super::{Action, DatasetRegistry, Pipeline};
use crate::config::{ProjectLayout, Stage};
use crate::cv::{CrossValidator, CvReport, FoldCache};
use crate::manifest::{
    ArtifactDescriptor, CvManifest, DatasetManifest, ModelManifest, PlainManifest,
};
use crate::registry::LoaderRegistry;
use crate::step::DataStep;
use crate::storage::{Dataset, DatasetParams};
use crate::submission::SubmissionMaker;
use crate::trainer::ModelMaker;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

/// What happened to one action.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Every output was already recorded; nothing ran
    CacheHit,
    /// The step ran and its outputs were persisted
    Executed,
    /// Cross-validation scores
    Evaluated(CvReport),
    /// A model was fitted and recorded
    Trained {
        /// Recorded model id
        model_id: String,
    },
    /// A submission file was written
    Submitted {
        /// Submission file
        path: PathBuf,
    },
}

/// One action and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Display form of the action
    pub step: String,
    /// Outcome
    pub outcome: StepOutcome,
}

/// Outcomes of every action of a run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Per-action reports
    pub steps: Vec<StepReport>,
}

impl RunReport {
    /// Dataset steps that actually ran.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.count(|outcome| matches!(outcome, StepOutcome::Executed))
    }

    /// Dataset steps served from cache.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.count(|outcome| matches!(outcome, StepOutcome::CacheHit))
    }

    /// Cross-validation reports in execution order.
    pub fn evaluations(&self) -> impl Iterator<Item = &CvReport> {
        self.steps.iter().filter_map(|report| match &report.outcome {
            StepOutcome::Evaluated(cv) => Some(cv),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Owns the stage manifests of one project and runs pipelines against them.
#[derive(Debug)]
pub struct Orchestrator {
    layout: ProjectLayout,
    loaders: LoaderRegistry,
    preprocessed: DatasetManifest,
    features: DatasetManifest,
    cv: CvManifest,
    models: ModelManifest,
    submissions: PlainManifest,
}

impl Orchestrator {
    /// Prepare the stage directories, open every manifest and check every
    /// recorded type tag against `loaders`.
    ///
    /// # Errors
    /// Returns manifest errors, or `UnknownArtifactType` for a descriptor
    /// whose tag `loaders` does not know
    pub fn open(layout: ProjectLayout, loaders: LoaderRegistry) -> Result<Self> {
        layout.prepare()?;
        let preprocessed = DatasetManifest::open(layout.manifest_path(Stage::Preprocessed))?;
        let features = DatasetManifest::open(layout.manifest_path(Stage::Features))?;
        let cv = CvManifest::open(layout.manifest_path(Stage::CrossValidation))?;
        let models = ModelManifest::open(layout.manifest_path(Stage::Models))?;
        let submissions = PlainManifest::open(layout.manifest_path(Stage::Submissions))?;

        loaders.validate_datasets(preprocessed.descriptors())?;
        loaders.validate_datasets(features.descriptors())?;
        loaders.validate_models(models.descriptors())?;

        Ok(Self {
            layout,
            loaders,
            preprocessed,
            features,
            cv,
            models,
            submissions,
        })
    }

    /// Project layout.
    #[must_use]
    pub const fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Preprocessing manifest.
    #[must_use]
    pub const fn preprocessed(&self) -> &DatasetManifest {
        &self.preprocessed
    }

    /// Feature manifest.
    #[must_use]
    pub const fn features(&self) -> &DatasetManifest {
        &self.features
    }

    /// Cross-validation manifest.
    #[must_use]
    pub const fn cv(&self) -> &CvManifest {
        &self.cv
    }

    /// Model manifest.
    #[must_use]
    pub const fn models(&self) -> &ModelManifest {
        &self.models
    }

    /// Run every action of `pipeline` in order.
    ///
    /// # Errors
    /// Stops at the first failing action; everything persisted before it
    /// stays recorded
    pub fn run(&mut self, pipeline: &Pipeline) -> Result<RunReport> {
        let root = self.layout.root().display().to_string();
        let span = info_span!("pipeline", root = %root);
        let _guard = span.enter();

        self.apply_fold_settings(pipeline)?;

        let mut registry = DatasetRegistry::new();
        for (name, source) in pipeline.sources() {
            let path = self.layout.data_dir().join(&source.filename);
            registry.publish(name.clone(), Dataset::load(path, source.format, source.params()));
        }

        let mut report = RunReport::default();
        for action in pipeline.actions() {
            let step = action.to_string();
            let span = info_span!("step", step = %step);
            let _guard = span.enter();

            let outcome = match action {
                Action::Preprocess(data_step) => {
                    let dir = self.layout.stage_dir(Stage::Preprocessed);
                    run_data_step(data_step, &dir, &mut self.preprocessed, &self.loaders, &mut registry)?
                }
                Action::ExtractFeatures(data_step) => {
                    let dir = self.layout.stage_dir(Stage::Features);
                    run_data_step(data_step, &dir, &mut self.features, &self.loaders, &mut registry)?
                }
                Action::CrossValidate(validator) => {
                    StepOutcome::Evaluated(self.cross_validate(validator, pipeline.seed(), &registry)?)
                }
                Action::Train(maker) => self.train(maker, &registry)?,
                Action::Submit(maker) => self.submit(maker, &registry)?,
            };
            report.steps.push(StepReport { step, outcome });
        }

        info!(
            executed = report.executed(),
            cache_hits = report.cache_hits(),
            "Pipeline finished"
        );
        Ok(report)
    }

    /// The configured fold settings replace whatever the cv manifest held.
    ///
    /// Pipelines without cross-validation leave the cv manifest alone, and
    /// unchanged settings are not rewritten.
    fn apply_fold_settings(&mut self, pipeline: &Pipeline) -> Result<()> {
        let cross_validates = pipeline
            .actions()
            .iter()
            .any(|action| matches!(action, Action::CrossValidate(_)));
        let settings = pipeline.fold_settings();
        let stored = self.cv.body();
        if !cross_validates || (stored == settings && self.cv.path().exists()) {
            return Ok(());
        }
        let folds_path = self.layout.stage_dir(Stage::CrossValidation).join(&settings.folds_filename);
        if stored != settings && folds_path.exists() {
            warn!(
                path = %folds_path.display(),
                stored_runs = stored.n_runs,
                stored_folds = stored.n_folds,
                n_runs = settings.n_runs,
                n_folds = settings.n_folds,
                "Fold settings changed; the existing fold file is still used as is (delete it to regenerate)"
            );
        }
        *self.cv.body_mut() = settings.clone();
        self.cv.persist()
    }

    fn cross_validate(
        &mut self,
        validator: &CrossValidator,
        seed: Option<u64>,
        registry: &DatasetRegistry,
    ) -> Result<CvReport> {
        let frame = registry.frame(&validator.to_string(), validator.dataset())?;
        let settings = self.cv.body().clone();
        let cache = FoldCache::new(
            self.layout
                .stage_dir(Stage::CrossValidation)
                .join(&settings.folds_filename),
        )
        .with_seed(seed);
        let generated = !cache.path().exists();
        let folds = cache.folds_for(frame, settings.n_runs, settings.n_folds)?;
        if generated {
            self.cv.persist()?;
        }
        validator.run(frame, &folds)
    }

    fn train(&mut self, maker: &ModelMaker, registry: &DatasetRegistry) -> Result<StepOutcome> {
        let frame = registry.frame(&maker.to_string(), maker.dataset())?;
        let dir = self.layout.stage_dir(Stage::Models);
        maker.run(frame, &dir, &mut self.models)?;
        Ok(StepOutcome::Trained {
            model_id: maker.model_id().to_string(),
        })
    }

    fn submit(&mut self, maker: &SubmissionMaker, registry: &DatasetRegistry) -> Result<StepOutcome> {
        let descriptor = self
            .models
            .lookup(maker.model_id())
            .ok_or_else(|| Error::MissingArtifact(format!("model '{}'", maker.model_id())))?;
        let model = self
            .loaders
            .load_model(&self.layout.stage_dir(Stage::Models), descriptor)?;

        let frame = registry.frame(&maker.to_string(), maker.dataset())?;
        let path = maker.run(model.as_ref(), frame, &self.layout.stage_dir(Stage::Submissions))?;
        self.submissions.persist()?;
        Ok(StepOutcome::Submitted { path })
    }
}

/// Cache-or-execute for one dataset step.
fn run_data_step(
    step: &DataStep,
    stage_dir: &Path,
    manifest: &mut DatasetManifest,
    loaders: &LoaderRegistry,
    registry: &mut DatasetRegistry,
) -> Result<StepOutcome> {
    let recorded: Option<Vec<&ArtifactDescriptor>> = step
        .declared_outputs()
        .iter()
        .map(|name| manifest.lookup(name))
        .collect();

    if let Some(descriptors) = recorded {
        info!(step = %step, "Using cache");
        for (name, descriptor) in step.declared_outputs().iter().zip(descriptors) {
            registry.publish(name.clone(), loaders.load_dataset(stage_dir, descriptor)?);
        }
        return Ok(StepOutcome::CacheHit);
    }

    let identity = step.identity();
    let inputs = step
        .declared_inputs()
        .iter()
        .map(|name| registry.frame(&identity, name))
        .collect::<Result<Vec<_>>>()?;
    let outputs = step.execute(&inputs)?;

    let format = step.format();
    for (name, frame) in step.declared_outputs().iter().zip(outputs) {
        let params = DatasetParams::derive(&frame);
        let path = stage_dir.join(format.filename_for(name));
        let dataset = Dataset::new(path, format, params.clone(), frame);
        dataset.save()?;

        manifest.record(
            name.clone(),
            ArtifactDescriptor::with_params(format.type_tag(), dataset.filename(), &params)?,
        );
        manifest.persist()?;
        registry.publish(name.clone(), dataset);
    }
    Ok(StepOutcome::Executed)
}
