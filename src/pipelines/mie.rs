//! Mendelian inheritance error rates by VQSLOD partition
//!
//! Every chromosome VCF is partitioned once per (variant class, method,
//! label) combination, tranche levels and percentile bins alike, and each
//! partition is run through the trio plink pipeline.

use std::collections::BTreeMap;

use tracing::instrument;

use super::{params, PipelineGraph};
use crate::builder::{inherit, Combination, StageDef, StageGraphBuilder};
use crate::config::{PipelineConfig, VariantClass, VqslodInterval};
use crate::engine::ExecutionEngine;
use crate::error::{Result, YapsError};
use crate::resource::ResourceSpec;

/// How a label's VQSLOD interval was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Tranche,
    Percentile,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Tranche => "tranche",
            Method::Percentile => "percentile",
        }
    }
}

/// Partition cases in build order
pub const CASES: [(Method, VariantClass); 4] = [
    (Method::Tranche, VariantClass::Snps),
    (Method::Tranche, VariantClass::Indels),
    (Method::Percentile, VariantClass::Snps),
    (Method::Percentile, VariantClass::Indels),
];

fn intervals(config: &PipelineConfig, method: Method, class: VariantClass) -> Result<&BTreeMap<u32, VqslodInterval>> {
    match method {
        Method::Tranche => config.tranche_intervals(class),
        Method::Percentile => config.percentiles(class),
    }
}

/// Combinations `type, method, label` with their intervals, labels ascending within a case
pub fn combinations(config: &PipelineConfig) -> Result<Vec<(Combination, VqslodInterval)>> {
    let mut combos = Vec::new();
    for (method, class) in CASES {
        for (label, interval) in intervals(config, method, class)? {
            let combo = Combination::new()
                .with("type", class.as_str())
                .with("method", method.as_str())
                .with("label", label.to_string());
            combos.push((combo, *interval));
        }
    }
    Ok(combos)
}

#[instrument(skip_all, fields(project = %config.project_name()))]
pub fn construct<E: ExecutionEngine>(config: &PipelineConfig, engine: &mut E) -> Result<PipelineGraph> {
    let samples = config.samples()?.display().to_string();
    let trio_fam = config.plink_fam()?.display().to_string();
    let cases = combinations(config)?;
    let combos: Vec<Combination> = cases.iter().map(|(c, _)| c.clone()).collect();

    let mut b = StageGraphBuilder::new(config, engine);

    let partition = b.cartesian(
        &StageDef::new("1-partition-vcfs", ResourceSpec::long_8g())?,
        &combos,
        |slot, combo, vcf| {
            let interval = cases
                .iter()
                .find(|(c, _)| c == combo)
                .map(|(_, i)| *i)
                .ok_or_else(|| YapsError::graph("combination without an interval"))?;
            Ok(params([
                ("in_vcf", vcf.display().to_string()),
                ("out_vcf", slot.path(&format!("selected.c{}.vcf.gz", slot.chrom()))),
                ("in_min_vqslod", interval.min.to_string()),
                ("in_max_vqslod", interval.max.to_string()),
                ("in_samples", samples.clone()),
            ]))
        },
    )?;

    let plink = b.chain(
        &StageDef::new("2-plink-pipeline", ResourceSpec::long_8g())?,
        partition.tasks(),
        |slot, parent| {
            let out_dir = slot
                .stage_dir()
                .join(parent.param("in_type")?)
                .join(parent.param("in_method")?)
                .join(parent.param("in_label")?)
                .join(slot.chrom());
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("in_trio_fam", trio_fam.clone()),
                ("in_type", inherit(parent, "in_type")?),
                ("in_method", inherit(parent, "in_method")?),
                ("in_label", inherit(parent, "in_label")?),
                ("out_dir", out_dir.display().to_string()),
            ]))
        },
    )?;

    Ok(PipelineGraph {
        stages: vec![partition, plink],
        aux_files: Vec::new(),
    })
}
