//! Concrete pipelines built on the stage graph builder

pub mod b38;
pub mod mie;
pub mod pca;
pub mod postvqsr;
pub mod postvqsr38;

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::config::{PipelineConfig, PipelineKind};
use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::stage::Stage;
use crate::task::Params;

/// A file a stage reads that the pipeline itself generates
///
/// Written after output directories exist, never during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Stages submitted for one pipeline, in build order
#[derive(Debug, Default)]
pub struct PipelineGraph {
    pub stages: Vec<Stage>,
    pub aux_files: Vec<AuxFile>,
}

impl PipelineGraph {
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Stage::len).sum()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name().to_string() == name)
    }

    pub fn write_aux_files(&self) -> Result<()> {
        for file in &self.aux_files {
            if let Some(dir) = file.path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&file.path, &file.contents)?;
            debug!(path = %file.path.display(), "wrote auxiliary file");
        }
        Ok(())
    }
}

/// Build the configured pipeline into `engine`
pub fn construct<E: ExecutionEngine>(config: &PipelineConfig, engine: &mut E) -> Result<PipelineGraph> {
    match config.kind() {
        PipelineKind::Postvqsr => postvqsr::construct(config, engine),
        PipelineKind::Postvqsr38 => postvqsr38::construct(config, engine),
        PipelineKind::Mie => mie::construct(config, engine),
        PipelineKind::Pca => pca::construct(config, engine),
        PipelineKind::B38 => b38::construct(config, engine),
    }
}

/// Parameter map from literal pairs
pub(crate) fn params<const N: usize>(pairs: [(&str, String); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
