//! tabflow - run a cached experiment pipeline from a JSON definition

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabflow::config::ProjectLayout;
use tabflow::pipeline::{Orchestrator, PipelineSpec, StepOutcome};
use tabflow::registry::LoaderRegistry;

#[derive(Parser)]
#[command(name = "tabflow", version, about = "Cached, manifest-driven experiment pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every action of a pipeline, reusing cached stage outputs
    Run {
        /// Project root holding data/ and assets/
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Pipeline definition (JSON)
        #[arg(long)]
        pipeline: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tabflow::logging::init("tabflow=info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { root, pipeline } => run(root, &pipeline)?,
    }
    Ok(())
}

fn run(root: PathBuf, definition: &std::path::Path) -> anyhow::Result<()> {
    let pipeline = PipelineSpec::from_path(definition)
        .with_context(|| format!("reading {}", definition.display()))?
        .into_pipeline()?;

    let mut orchestrator = Orchestrator::open(ProjectLayout::new(root), LoaderRegistry::new())?;
    let report = orchestrator.run(&pipeline)?;

    for step in &report.steps {
        match &step.outcome {
            StepOutcome::CacheHit => println!("cached     {}", step.step),
            StepOutcome::Executed => println!("executed   {}", step.step),
            StepOutcome::Evaluated(cv) => println!(
                "evaluated  {}: mean {:.5} std {:.5} over {} folds",
                step.step,
                cv.mean,
                cv.std,
                cv.scores.len()
            ),
            StepOutcome::Trained { model_id } => println!("trained    {model_id}"),
            StepOutcome::Submitted { path } => println!("submitted  {}", path.display()),
        }
    }
    Ok(())
}
