//! Derived, read-only pipeline configuration
//!
//! [`PipelineConfig::load`] reads every input table exactly once, validates
//! them for the configured pipeline and derives what the stage builders
//! iterate over. Nothing here touches the filesystem beyond reading, except
//! the explicit [`PipelineConfig::ensure_workspace`].

mod samples;
mod settings;
mod tables;

pub use samples::{read_sample_bams, SampleBams, SampleMeta};
pub use settings::{PipelineKind, PipelineSettings};
pub use tables::{
    read_chrom_paths, read_percentiles, read_tranches, tranche_intervals, IntervalTable,
    VariantClass, VqslodInterval, TRANCHE_SENTINEL,
};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, YapsError};
use crate::natural::sort_natural;
use crate::region::ChromosomeIndex;
use crate::resource::{ContainerProfile, ResourceContext};
use crate::stage::StageName;

/// Chromosomes the PCA pipeline refuses, compared case-insensitively
const PCA_FORBIDDEN: [&str; 2] = ["X", "Y"];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    kind: PipelineKind,
    project_name: String,
    workspace: PathBuf,
    job_db: PathBuf,
    email: Option<String>,
    job_group: Option<String>,
    container: Option<ContainerProfile>,
    input_table: Option<PathBuf>,
    vcfs: BTreeMap<String, PathBuf>,
    chroms: Vec<String>,
    reference_index: Option<ChromosomeIndex>,
    tranche_intervals: IntervalTable,
    percentiles: IntervalTable,
    samples: Option<PathBuf>,
    plink_fam: Option<PathBuf>,
    vqslod_threshold: Option<f64>,
    sample_bams: Vec<(String, SampleBams)>,
}

fn require<'a, T>(kind: PipelineKind, field: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| {
        YapsError::config(format!("the {} pipeline requires '{}'", kind, field))
    })
}

fn require_file(kind: PipelineKind, field: &str, value: &Option<PathBuf>) -> Result<PathBuf> {
    let path = require(kind, field, value)?;
    if !path.is_file() {
        return Err(YapsError::config(format!(
            "'{}' file {} does not exist",
            field,
            path.display()
        )));
    }
    Ok(path.clone())
}

impl PipelineConfig {
    /// Read and validate every input named by `settings`
    ///
    /// Fails before any task exists if a table is malformed, a required
    /// category is missing, or a forbidden chromosome is present.
    pub fn load(settings: PipelineSettings) -> Result<Self> {
        let kind = settings.pipeline;

        let vcfs = match (&settings.input_vcfs, kind) {
            (Some(table), _) => {
                let vcfs = read_chrom_paths(table)?;
                if vcfs.is_empty() {
                    warn!(table = %table.display(), "input table lists no chromosomes");
                }
                vcfs
            }
            (None, PipelineKind::B38) => BTreeMap::new(),
            (None, _) => {
                return Err(YapsError::config(format!(
                    "the {} pipeline requires 'input_vcfs'",
                    kind
                )))
            }
        };
        let mut chroms: Vec<String> = vcfs.keys().cloned().collect();
        sort_natural(&mut chroms);

        let forbidden: Vec<String> = match (&settings.forbidden_chromosomes, kind) {
            (Some(list), _) => list.clone(),
            (None, PipelineKind::Pca) => PCA_FORBIDDEN.iter().map(|s| s.to_string()).collect(),
            (None, _) => Vec::new(),
        };
        ensure_absent(&forbidden, &chroms)?;

        let reference_index = match &settings.reference_index {
            Some(path) => Some(ChromosomeIndex::load(path)?),
            None => None,
        };

        let mut tranche_table = IntervalTable::new();
        let mut percentiles = IntervalTable::new();
        let mut samples = None;
        let mut plink_fam = None;
        let mut vqslod_threshold = None;
        let mut sample_bams = Vec::new();

        match kind {
            PipelineKind::Postvqsr | PipelineKind::Postvqsr38 => {}
            PipelineKind::Mie => {
                let tranches = read_tranches(&require_file(kind, "tranches", &settings.tranches)?)?;
                tranche_table = tranches
                    .iter()
                    .map(|(class, levels)| (*class, tranche_intervals(levels)))
                    .collect();
                percentiles =
                    read_percentiles(&require_file(kind, "percentiles", &settings.percentiles)?)?;
                samples = Some(require_file(kind, "samples", &settings.samples)?);
                plink_fam = Some(require_file(kind, "plink_fam", &settings.plink_fam)?);
            }
            PipelineKind::Pca => {
                vqslod_threshold = Some(*require(kind, "vqslod_threshold", &settings.vqslod_threshold)?);
            }
            PipelineKind::B38 => {
                sample_bams = read_sample_bams(&require_file(kind, "sample_bams", &settings.sample_bams)?)?;
                if sample_bams.is_empty() {
                    warn!("sample listing names no samples");
                }
            }
        }

        let container = if settings.docker {
            Some(settings.container.clone().unwrap_or_default())
        } else {
            None
        };

        let job_db = settings
            .job_db
            .clone()
            .unwrap_or_else(|| settings.workspace.join(".job_queue.db"));

        info!(
            pipeline = %kind,
            project = %settings.project_name,
            chromosomes = chroms.len(),
            containerized = container.is_some(),
            "loaded pipeline config"
        );

        Ok(Self {
            kind,
            project_name: settings.project_name,
            workspace: settings.workspace,
            job_db,
            email: settings.email,
            job_group: settings.drm_job_group,
            container,
            input_table: settings.input_vcfs,
            vcfs,
            chroms,
            reference_index,
            tranche_intervals: tranche_table,
            percentiles,
            samples,
            plink_fam,
            vqslod_threshold,
            sample_bams,
        })
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Engine state database
    pub fn job_db(&self) -> &Path {
        &self.job_db
    }

    /// `<workspace>/<project>.log`
    pub fn primary_log(&self) -> PathBuf {
        self.workspace.join(format!("{}.log", self.project_name))
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Chromosomes in natural order
    pub fn chroms(&self) -> &[String] {
        &self.chroms
    }

    pub fn vcfs(&self) -> &BTreeMap<String, PathBuf> {
        &self.vcfs
    }

    /// Input file for `chrom`
    pub fn input(&self, chrom: &str) -> Result<&Path> {
        self.vcfs.get(chrom).map(PathBuf::as_path).ok_or_else(|| {
            let table = match &self.input_table {
                Some(table) => table.display().to_string(),
                None => "the input table".to_string(),
            };
            YapsError::config(format!("chromosome '{}' is not listed in {}", chrom, table))
        })
    }

    /// Samples to realign, in natural order of id
    pub fn sample_bams(&self) -> &[(String, SampleBams)] {
        &self.sample_bams
    }

    pub fn reference_index(&self) -> Option<&ChromosomeIndex> {
        self.reference_index.as_ref()
    }

    pub fn tranche_intervals(&self, class: VariantClass) -> Result<&BTreeMap<u32, VqslodInterval>> {
        self.tranche_intervals
            .get(&class)
            .ok_or_else(|| YapsError::config(format!("no tranche intervals for '{}'", class)))
    }

    pub fn percentiles(&self, class: VariantClass) -> Result<&BTreeMap<u32, VqslodInterval>> {
        self.percentiles
            .get(&class)
            .ok_or_else(|| YapsError::config(format!("no percentiles for '{}'", class)))
    }

    pub fn samples(&self) -> Result<&Path> {
        self.samples
            .as_deref()
            .ok_or_else(|| YapsError::config("no samples file configured"))
    }

    pub fn plink_fam(&self) -> Result<&Path> {
        self.plink_fam
            .as_deref()
            .ok_or_else(|| YapsError::config("no plink fam file configured"))
    }

    pub fn vqslod_threshold(&self) -> Result<f64> {
        self.vqslod_threshold
            .ok_or_else(|| YapsError::config("no VQSLOD threshold configured"))
    }

    /// Pipeline-wide inputs to resource resolution
    pub fn resource_context(&self) -> ResourceContext {
        ResourceContext {
            email: self.email.clone(),
            job_group: self.job_group.clone(),
            container: self.container.clone(),
        }
    }

    /// `<workspace>/<stage>`
    pub fn stage_dir(&self, stage: &StageName) -> PathBuf {
        self.workspace.join(stage.to_string())
    }

    /// Create the workspace if missing; safe to call repeatedly
    pub fn ensure_workspace(&self) -> Result<()> {
        fs::create_dir_all(&self.workspace)?;
        debug!(workspace = %self.workspace.display(), "workspace ready");
        Ok(())
    }
}

fn ensure_absent(forbidden: &[String], chroms: &[String]) -> Result<()> {
    for token in forbidden {
        if let Some(found) = chroms.iter().find(|c| c.eq_ignore_ascii_case(token)) {
            return Err(YapsError::config(format!(
                "chromosome '{}' must be excluded from the input table",
                found
            )));
        }
    }
    Ok(())
}
