//! Realignment of per-sample BAMs to GRCh38
//!
//! A single root stage keyed by sample id rather than chromosome:
//!
//! ```text
//! 1 exec-speedseq-realign  (one task per sample)
//! ```

use tracing::instrument;

use super::{params, PipelineGraph};
use crate::builder::{StageDef, StageGraphBuilder};
use crate::config::PipelineConfig;
use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::resource::ResourceSpec;

/// 50 GB on a single 8-core host
fn realign_resources() -> ResourceSpec {
    ResourceSpec::new(
        "long",
        50_000_000,
        "select[mem>45000] rusage[mem=48000] span[hosts=1]",
    )
    .with_cpus(8)
}

#[instrument(skip_all, fields(project = %config.project_name()))]
pub fn construct<E: ExecutionEngine>(config: &PipelineConfig, engine: &mut E) -> Result<PipelineGraph> {
    let mut b = StageGraphBuilder::new(config, engine);

    let realign = b.per_sample(
        &StageDef::new("1-exec-speedseq-realign", realign_resources())?,
        config.sample_bams(),
        |slot, sample| {
            let mut p = params([
                ("in_bams", sample.joined()),
                ("out_prefix", slot.path(&format!("{}.b38.realign", slot.key()))),
                ("out_tmp_dir", slot.path("tmpdir")),
            ]);
            if let Some(name) = &sample.meta.original_name {
                p.insert("in_sample_name".to_string(), name.clone());
            }
            Ok(p)
        },
    )?;

    Ok(PipelineGraph {
        stages: vec![realign],
        aux_files: Vec::new(),
    })
}
