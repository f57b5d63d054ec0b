//! yaps CLI - build genomic pipeline graphs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use yaps::runner::plan_path;
use yaps::{FixSuggestion, Pipeline, PipelineConfig, PipelineSettings, PlanRecorder, RunFlags, YapsError};

#[derive(Parser)]
#[command(name = "yaps")]
#[command(about = "yaps - per-chromosome genomic pipeline graphs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the pipeline, create its output directories and record a plan
    Plan {
        /// Path to the settings YAML
        settings: PathBuf,

        /// Resume a previous run of the same project
        #[arg(long)]
        restart: bool,

        /// Do not prompt before deleting state on restart
        #[arg(long)]
        skip_confirm: bool,

        /// Persist task state after every task
        #[arg(long)]
        flush_task_state: bool,
    },

    /// Load the settings and build the graph without touching the workspace
    Validate {
        /// Path to the settings YAML
        settings: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Plan {
            settings,
            restart,
            skip_confirm,
            flush_task_state,
        } => plan(
            &settings,
            RunFlags {
                restart,
                skip_confirm,
                flush_task_state,
            },
        ),
        Commands::Validate { settings } => validate(&settings),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.downcast_ref::<YapsError>().and_then(|y| y.fix_suggestion()) {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load(settings: &Path) -> Result<PipelineConfig> {
    let settings = PipelineSettings::from_file(settings)
        .with_context(|| format!("reading settings {}", settings.display()))?;
    Ok(PipelineConfig::load(settings)?)
}

fn plan(settings: &Path, flags: RunFlags) -> Result<()> {
    let config = load(settings)?;
    let path = plan_path(&config);

    let mut pipeline: Pipeline<PlanRecorder> = Pipeline::planned(config)?;
    pipeline.prepare()?;
    pipeline.run(flags)?;

    let graph = pipeline.graph();
    println!(
        "{} Recorded {} tasks in {} stages",
        "✓".green(),
        graph.task_count(),
        graph.stages.len()
    );
    println!("  Plan: {}", path.display().to_string().cyan());
    Ok(())
}

fn validate(settings: &Path) -> Result<()> {
    let config = load(settings)?;
    let kind = config.kind();
    let pipeline = Pipeline::build(config, PlanRecorder::new("validate"))?;

    println!("{} Pipeline '{}' is valid", "✓".green(), kind);
    println!("  Chromosomes: {}", pipeline.config().chroms().len());
    for stage in &pipeline.graph().stages {
        println!("  {}: {} tasks", stage.name(), stage.len());
    }
    println!("  Tasks: {}", pipeline.graph().task_count());
    Ok(())
}
