//! Pipeline lifecycle: build, prepare, hand off
//!
//! Building only submits tasks to the engine. Filesystem effects happen in
//! [`Pipeline::prepare`], and execution is the engine's business once
//! [`Pipeline::run`] hands the graph over.

use std::path::PathBuf;

use tracing::info;

use crate::config::PipelineConfig;
use crate::engine::{default_log_dir, ExecutionEngine, PlanRecorder, RunOptions};
use crate::error::Result;
use crate::pipelines::{construct, PipelineGraph};

/// Flags for a run, forwarded to the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub restart: bool,
    pub skip_confirm: bool,
    pub flush_task_state: bool,
}

/// A configured pipeline whose graph has been submitted to `E`
pub struct Pipeline<E: ExecutionEngine> {
    config: PipelineConfig,
    engine: E,
    graph: PipelineGraph,
}

impl Pipeline<PlanRecorder> {
    /// Build into a [`PlanRecorder`] that writes `<workspace>/plan.json`,
    /// recording the job database and primary log alongside the tasks
    pub fn planned(config: PipelineConfig) -> Result<Self> {
        let engine = PlanRecorder::new(config.project_name())
            .with_plan_path(plan_path(&config))
            .with_state_db(config.job_db())
            .with_primary_log(config.primary_log());
        Self::build(config, engine)
    }
}

impl<E: ExecutionEngine> Pipeline<E> {
    /// Construct every stage; no filesystem side effects
    pub fn build(config: PipelineConfig, mut engine: E) -> Result<Self> {
        let graph = construct(&config, &mut engine)?;
        info!(
            pipeline = %config.kind(),
            stages = graph.stages.len(),
            tasks = graph.task_count(),
            "pipeline constructed"
        );
        Ok(Self {
            config,
            engine,
            graph,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Workspace, output directories, generated inputs; idempotent
    pub fn prepare(&self) -> Result<()> {
        self.config.ensure_workspace()?;
        self.engine.make_output_dirs()?;
        self.graph.write_aux_files()
    }

    /// Hand the graph to the engine, leaving the workflow open for more tasks
    pub fn run(&mut self, flags: RunFlags) -> Result<()> {
        let workspace = self.config.workspace().to_path_buf();
        let options = RunOptions {
            continue_without_finalizing: true,
            restart: flags.restart,
            skip_confirm: flags.skip_confirm,
            flush_task_state: flags.flush_task_state,
            ..RunOptions::default()
        }
        .with_log_dir(move |task| default_log_dir(&workspace, task));

        self.engine.run(options)
    }
}

/// `<workspace>/plan.json`
pub fn plan_path(config: &PipelineConfig) -> PathBuf {
    config.workspace().join("plan.json")
}
