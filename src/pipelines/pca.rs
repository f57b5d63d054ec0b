//! Principal component analysis over LD-pruned biallelic SNPs
//!
//! Per chromosome: filter, convert to plink, prune, extract. Then merge all
//! chromosomes, run smartpca and tabulate the eigenvectors.

use std::path::Path;

use tracing::instrument;

use super::{params, AuxFile, PipelineGraph};
use crate::builder::{handles, inherit, StageDef, StageGraphBuilder};
use crate::config::PipelineConfig;
use crate::engine::ExecutionEngine;
use crate::error::{Result, YapsError};
use crate::resource::ResourceSpec;

const ALL_CHROMS: &str = "all-chroms";
const MERGE_LIST: &str = "allfiles.txt";

fn long_16g() -> ResourceSpec {
    ResourceSpec::new("long", 16_000_000, "select[mem>16000] rusage[mem=16000]")
}

#[instrument(skip_all, fields(project = %config.project_name()))]
pub fn construct<E: ExecutionEngine>(config: &PipelineConfig, engine: &mut E) -> Result<PipelineGraph> {
    let min_vqslod = config.vqslod_threshold()?;
    let mut b = StageGraphBuilder::new(config, engine);

    let filtered = b.root(&StageDef::new("1-filter-biallelic-snps", ResourceSpec::long_8g())?, |slot, vcf| {
        Ok(params([
            ("in_vcf", vcf.display().to_string()),
            ("out_vcf", slot.path(&format!("filtered.snps.c{}.vcf.gz", slot.chrom()))),
            ("in_min_vqslod", min_vqslod.to_string()),
        ]))
    })?;

    let binaries = b.chain(
        &StageDef::new("2-plink-binaries", ResourceSpec::long_8g())?,
        filtered.tasks(),
        |slot, parent| {
            Ok(params([
                ("in_vcf", inherit(parent, "out_vcf")?),
                ("out_path", slot.path(&format!("c{}", slot.chrom()))),
            ]))
        },
    )?;

    let pruned = b.chain(&StageDef::new("3-plink-ld-prune", long_16g())?, binaries.tasks(), |slot, parent| {
        Ok(params([
            ("in_path", inherit(parent, "out_path")?),
            ("out_path", slot.path(&format!("c{}-pruned", slot.chrom()))),
        ]))
    })?;

    let extracted = b.chain(&StageDef::new("4-plink-extract-prune", long_16g())?, pruned.tasks(), |slot, parent| {
        Ok(params([
            ("in_path", inherit(parent, "in_path")?),
            ("in_extract", format!("{}.prune.in", parent.param("out_path")?)),
            ("out_path", slot.path(&format!("c{}.extracted", slot.chrom()))),
        ]))
    })?;

    // the first chromosome is the merge reference, the rest go in the merge list
    let mut merge_list = None;
    let merged = b.summarize(
        &StageDef::new("5-plink-merge-prune-files", long_16g())?,
        ALL_CHROMS,
        extracted.tasks(),
        |dir, parents| {
            let (first, rest) = parents
                .split_first()
                .ok_or_else(|| YapsError::graph("nothing to merge"))?;
            let list_path = dir.join(MERGE_LIST);
            let mut contents = String::new();
            for task in rest {
                contents.push_str(task.param("out_path")?);
                contents.push('\n');
            }
            merge_list = Some(AuxFile {
                path: list_path.clone(),
                contents,
            });
            Ok(params([
                ("in_ref", inherit(first, "out_path")?),
                ("in_merge_file", list_path.display().to_string()),
                ("out_path", dir.join("merged").display().to_string()),
            ]))
        },
    )?;

    let smartpca = b.summarize(
        &StageDef::new(
            "6-eigenstrat-smartpca",
            ResourceSpec::new("hall-lab", 16_000_000, "select[mem>16000] rusage[mem=16000]"),
        )?,
        ALL_CHROMS,
        &handles(&merged),
        |dir, parents| {
            let merged = parents[0].param("out_path")?;
            Ok(params([
                ("in_ped_file", format!("{}.ped", merged)),
                ("in_map_file", format!("{}.map", merged)),
                ("out_prj_dir", dir.display().to_string()),
            ]))
        },
    )?;

    let frame = b.summarize(
        &StageDef::new(
            "7-make-data-frame",
            ResourceSpec::new("hall-lab", 4_000_000, "select[mem>4000] rusage[mem=4000]"),
        )?,
        ALL_CHROMS,
        &handles(&smartpca),
        |dir, parents| {
            let prj_dir = Path::new(parents[0].param("out_prj_dir")?);
            Ok(params([
                ("in_file", prj_dir.join("merged.eigenstrat.pca.evec").display().to_string()),
                ("out_file", dir.join("merged.eigenstrat.pca.evec.tsv").display().to_string()),
            ]))
        },
    )?;

    Ok(PipelineGraph {
        stages: vec![filtered, binaries, pruned, extracted, merged, smartpca, frame],
        aux_files: merge_list.into_iter().collect(),
    })
}
