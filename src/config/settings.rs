//! YAML settings document

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resource::ContainerProfile;

/// Which concrete pipeline to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// GRCh37 post-VQSR cleanup
    Postvqsr,
    Postvqsr38,
    Mie,
    Pca,
    /// Per-sample realignment to GRCh38
    B38,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Postvqsr => "postvqsr",
            PipelineKind::Postvqsr38 => "postvqsr38",
            PipelineKind::Mie => "mie",
            PipelineKind::Pca => "pca",
            PipelineKind::B38 => "b38",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_project_name() -> String {
    "yaps2.default".to_string()
}

/// Everything a pipeline run is configured with
///
/// Relative paths are resolved against the settings file's directory by
/// [`PipelineSettings::from_file`].
///
/// ```yaml
/// pipeline: mie
/// workspace: /scratch/mie
/// input_vcfs: vcfs.tsv
/// tranches: tranches.tsv
/// percentiles: percentiles.tsv
/// samples: controls.txt
/// plink_fam: trios.fam
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    pub pipeline: PipelineKind,
    #[serde(default = "default_project_name")]
    pub project_name: String,
    pub workspace: PathBuf,
    /// Engine state database; `<workspace>/.job_queue.db` when absent
    #[serde(default)]
    pub job_db: Option<PathBuf>,
    #[serde(default)]
    pub email: Option<String>,
    /// `chrom<TAB>vcf` table; every pipeline but b38 needs one
    #[serde(default)]
    pub input_vcfs: Option<PathBuf>,
    /// JSON of sample id -> bams and metadata, for b38
    #[serde(default)]
    pub sample_bams: Option<PathBuf>,
    /// Reference `.fai`; enables region validation and contig grouping
    #[serde(default)]
    pub reference_index: Option<PathBuf>,
    #[serde(default)]
    pub tranches: Option<PathBuf>,
    #[serde(default)]
    pub percentiles: Option<PathBuf>,
    #[serde(default)]
    pub samples: Option<PathBuf>,
    #[serde(default)]
    pub plink_fam: Option<PathBuf>,
    #[serde(default)]
    pub vqslod_threshold: Option<f64>,
    /// Chromosomes that must not appear in `input_vcfs` (case-insensitive)
    #[serde(default)]
    pub forbidden_chromosomes: Option<Vec<String>>,
    /// Run every task under the container profile
    #[serde(default)]
    pub docker: bool,
    #[serde(default)]
    pub container: Option<ContainerProfile>,
    #[serde(default)]
    pub drm_job_group: Option<String>,
}

impl PipelineSettings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a settings file, resolving relative paths against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut settings = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            settings.resolve_relative(base);
        }
        Ok(settings)
    }

    pub fn resolve_relative(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        rebase(&mut self.workspace);
        for path in [
            &mut self.input_vcfs,
            &mut self.sample_bams,
            &mut self.job_db,
            &mut self.reference_index,
            &mut self.tranches,
            &mut self.percentiles,
            &mut self.samples,
            &mut self.plink_fam,
        ]
        .into_iter()
        .flatten()
        {
            rebase(path);
        }
    }
}
