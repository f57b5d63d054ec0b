//! Post-VQSR variant QC on GRCh38
//!
//! ```text
//! 1 select-variants-ac-0-removal ─┬─ 2 count-sample-missingness (autosomes) ── 2.1 calculate (1-22)
//!                                 └─ 3 decompose-normalize-uniq ── 4 remove-symbolic-alleles
//!                                    ── 5 filter-variant-missingness ── 6 annotate-w-1000G
//!                                    ── 7 annotate-w-ExAC ─┬─ 9 gatk-variant-eval ── 9.1 summary
//!                                                          ├─ 10 bcftools-stats ── 10.1 summary
//!                                                          └─ 11 concat-by-contig
//! ```
//!
//! Stage 11 is only built when a reference index is configured.

use tracing::{debug, instrument, warn};

use super::{params, PipelineGraph};
use crate::builder::{handles, inherit, StageDef, StageGraphBuilder};
use crate::config::PipelineConfig;
use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::resource::ResourceSpec;
use crate::stage::Stage;

/// The `ccdg` queue with `gb` gigabytes reserved on an 8+ core host
fn ccdg(gb: u64) -> ResourceSpec {
    ResourceSpec::new(
        "ccdg",
        gb * 1_000_000,
        format!("select[mem>{0}000 && ncpus>8] rusage[mem={0}000]", gb),
    )
}

fn is_autosome(chrom: &str) -> bool {
    chrom.starts_with(|c: char| c.is_ascii_digit())
}

#[instrument(skip_all, fields(project = %config.project_name()))]
pub fn construct<E: ExecutionEngine>(config: &PipelineConfig, engine: &mut E) -> Result<PipelineGraph> {
    let mut b = StageGraphBuilder::new(config, engine);
    let mut graph = PipelineGraph::default();

    // 1. drop alternates no sample carries
    let ac0 = b.root(&StageDef::new("1-select-variants-ac-0-removal", ccdg(8))?, |slot, vcf| {
        Ok(params([
            ("in_vcf", vcf.display().to_string()),
            ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
            ("out_log", slot.path(&format!("select-variants-chrom-{}-gatk.log", slot.chrom()))),
        ]))
    })?;

    // 2. per-chromosome missingness counts, autosomes only
    let counts = b.chain_filtered(
        &StageDef::new("2-count-sample-missingness", ccdg(8))?,
        ac0.tasks(),
        is_autosome,
        |slot, parent| {
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("out_json", slot.path(&format!("{}-sample-missingness-counts.json", slot.chrom()))),
                ("out_log", slot.path(&format!("{}-sample-missingness-counts.log", slot.chrom()))),
            ]))
        },
    )?;

    let counts_dir = config.stage_dir(counts.name());
    let missingness = if counts.is_empty() {
        warn!("no autosomes configured, skipping sample missingness");
        None
    } else {
        let stage = b.summarize(
            &StageDef::new("2.1-calculate-sample-missingness", ccdg(8))?,
            "1-22",
            counts.tasks(),
            |dir, _| {
                Ok(params([
                    ("in_json", counts_dir.join("*").join("*.json").display().to_string()),
                    ("out_stats", dir.join("sample-missingness-pct.dat").display().to_string()),
                    ("out_log", dir.join("sample-missingness-pct.dat.log").display().to_string()),
                ]))
            },
        )?;
        Some(stage)
    };

    // 3. decompose, normalize, uniq
    let dnu = b.chain(&StageDef::new("3-decompose-normalize-uniq", ccdg(32))?, ac0.tasks(), |slot, parent| {
        Ok(params([
            ("in_vcf", inherit(parent, "out_vcf")?),
            ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
            ("out_log", slot.path(&format!("decompose-normalize-unique-{}.log", slot.chrom()))),
        ]))
    })?;

    // 4. symbolic deletion alleles
    let rsa = b.chain(
        &StageDef::new(
            "4-remove-symbolic-alleles",
            ResourceSpec::new("ccdg", 4_000_000, "select[mem>4000 && ncpus>8] rusage[mem=4000]"),
        )?,
        dnu.tasks(),
        |slot, parent| {
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
                ("out_log", slot.path(&format!("remove-symbolic-alleles-chrom-{}-gatk.log", slot.chrom()))),
            ]))
        },
    )?;

    // 5. site missingness
    let fvm = b.chain(&StageDef::new("5-filter-variant-missingness", ccdg(8))?, rsa.tasks(), |slot, parent| {
        Ok(params([
            ("in_vcf", inherit(parent, "out_vcf")?),
            ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
            ("out_stats", slot.path(&format!("{}.stats.missingness.out", slot.chrom()))),
            ("out_log", slot.path(&format!("filter-missingness-{}.log", slot.chrom()))),
        ]))
    })?;

    // 6-7. population annotations
    let kg = b.chain(&StageDef::new("6-annotate-w-1000G", ccdg(8))?, fvm.tasks(), |slot, parent| {
        Ok(params([
            ("in_vcf", inherit(parent, "out_vcf")?),
            ("out_vcf", slot.path(&format!("1kg-annotated.c{}.vcf.gz", slot.chrom()))),
            ("out_log", slot.path(&format!("1000G-annotate.{}.log", slot.chrom()))),
        ]))
    })?;

    let exac = b.chain(&StageDef::new("7-annotate-w-ExAC", ccdg(8))?, kg.tasks(), |slot, parent| {
        Ok(params([
            ("in_vcf", inherit(parent, "out_vcf")?),
            ("out_vcf", slot.path(&format!("ExAC-annotated.c{}.vcf.gz", slot.chrom()))),
            ("out_log", slot.path(&format!("ExAC-annotate.{}.log", slot.chrom()))),
        ]))
    })?;

    // 9. GATK VariantEval
    let eval = b.chain(&StageDef::new("9-gatk-variant-eval", ccdg(10))?, exac.tasks(), |slot, parent| {
        Ok(params([
            ("in_vcf", inherit(parent, "out_vcf")?),
            ("out_stats", slot.path(&format!("chrom-{}-variant-eval.out", slot.chrom()))),
            ("out_log", slot.path(&format!("chrom-{}-variant-eval.log", slot.chrom()))),
        ]))
    })?;
    let eval_summary = summary(&mut b, config, "9.1-gatk-variant-eval-summary", &eval)?;

    // 10. bcftools stats
    let stats = b.chain(&StageDef::new("10-bcftools-stats", ccdg(10))?, exac.tasks(), |slot, parent| {
        Ok(params([
            ("in_vcf", inherit(parent, "out_vcf")?),
            ("out_stats", slot.path(&format!("{}.stats.out", slot.chrom()))),
        ]))
    })?;
    let stats_summary = summary(&mut b, config, "10.1-bcftools-stats-summary", &stats)?;

    // 11. one VCF per contig
    let concat = if config.reference_index().is_some() {
        let stage = b.fan_in_by_contig(&StageDef::new("11-concat-by-contig", ccdg(8))?, exac.tasks(), |slot, members| {
            let inputs = members
                .iter()
                .map(|t| inherit(t, "out_vcf"))
                .collect::<Result<Vec<_>>>()?;
            Ok(params([
                ("in_vcfs", inputs.join(",")),
                ("out_vcf", slot.path(&format!("combined.c{}.vcf.gz", slot.chrom()))),
            ]))
        })?;
        Some(stage)
    } else {
        debug!("no reference index, skipping contig concatenation");
        None
    };

    graph.stages.extend([ac0, counts]);
    graph.stages.extend(missingness);
    graph.stages.extend([
        dnu,
        rsa,
        fvm,
        kg,
        exac,
        eval,
        eval_summary,
        stats,
        stats_summary,
    ]);
    graph.stages.extend(concat);
    Ok(graph)
}

/// `all-chroms` task reading the prior stage's directory
fn summary<E: ExecutionEngine>(
    b: &mut StageGraphBuilder<'_, E>,
    config: &PipelineConfig,
    name: &str,
    prior: &Stage,
) -> Result<Stage> {
    let in_dir = config.stage_dir(prior.name());
    b.summarize(&StageDef::new(name, ccdg(8))?, "all-chroms", &handles(prior), |dir, _| {
        Ok(params([
            ("in_dir", in_dir.display().to_string()),
            ("out_dir", dir.display().to_string()),
        ]))
    })
}
