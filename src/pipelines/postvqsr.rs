//! Post-VQSR variant cleanup on GRCh37
//!
//! ```text
//! 1 select-variants-ac-0-removal ── 2 decompose-normalize-uniq
//!     ── 3 filter-missingness ── 4 annotate-w-1000G
//! ```

use tracing::instrument;

use super::{params, PipelineGraph};
use crate::builder::{inherit, StageDef, StageGraphBuilder};
use crate::config::PipelineConfig;
use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::resource::ResourceSpec;

#[instrument(skip_all, fields(project = %config.project_name()))]
pub fn construct<E: ExecutionEngine>(config: &PipelineConfig, engine: &mut E) -> Result<PipelineGraph> {
    let mut b = StageGraphBuilder::new(config, engine);

    let ac0 = b.root(
        &StageDef::new("1-select-variants-ac-0-removal", ResourceSpec::long_8g())?,
        |slot, vcf| {
            Ok(params([
                ("in_vcf", vcf.display().to_string()),
                ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
                ("out_log", slot.path(&format!("select-variants-chrom-{}-gatk.log", slot.chrom()))),
            ]))
        },
    )?;

    let dnu = b.chain(
        &StageDef::new("2-decompose-normalize-uniq", ResourceSpec::long_8g())?,
        ac0.tasks(),
        |slot, parent| {
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
                ("out_log", slot.path(&format!("decompose-normalize-unique-{}.log", slot.chrom()))),
            ]))
        },
    )?;

    let missingness = b.chain(
        &StageDef::new("3-filter-missingness", ResourceSpec::long_8g())?,
        dnu.tasks(),
        |slot, parent| {
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
                ("out_log", slot.path(&format!("filter-missingness-{}.log", slot.chrom()))),
            ]))
        },
    )?;

    let kg = b.chain(
        &StageDef::new("4-annotate-w-1000G", ResourceSpec::long_8g())?,
        missingness.tasks(),
        |slot, parent| {
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("out_vcf", slot.path(&format!("1kg-annotated.c{}.vcf.gz", slot.chrom()))),
                ("out_log", slot.path(&format!("1000G-annotate.{}.log", slot.chrom()))),
            ]))
        },
    )?;

    Ok(PipelineGraph {
        stages: vec![ac0, dnu, missingness, kg],
        aux_files: Vec::new(),
    })
}
