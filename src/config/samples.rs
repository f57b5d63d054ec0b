//! Per-sample BAM listing for realignment
//!
//! ```json
//! {
//!   "H_XYZ-1234": {
//!     "bams": ["/gerald/a.bam", "/gerald/b.bam"],
//!     "meta": { "original-name": "H_XYZ-sample-1234", "gender": "male" }
//!   }
//! }
//! ```
//!
//! Keys other than `bams` and `meta.original-name` are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, YapsError};
use crate::natural::natural_cmp;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMeta {
    #[serde(rename = "original-name", default)]
    pub original_name: Option<String>,
}

/// One sample's input BAMs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleBams {
    pub bams: Vec<PathBuf>,
    #[serde(default)]
    pub meta: SampleMeta,
}

impl SampleBams {
    /// BAM paths space-separated, as one parameter value
    pub fn joined(&self) -> String {
        self.bams
            .iter()
            .map(|b| b.display().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Samples in natural order of their id; every sample needs at least one BAM
pub fn read_sample_bams(path: &Path) -> Result<Vec<(String, SampleBams)>> {
    let content = fs::read_to_string(path)?;
    let map: BTreeMap<String, SampleBams> = serde_json::from_str(&content)?;

    let mut samples: Vec<(String, SampleBams)> = map.into_iter().collect();
    for (id, sample) in &samples {
        if id.trim().is_empty() {
            return Err(YapsError::config(format!("{}: empty sample id", path.display())));
        }
        if sample.bams.is_empty() {
            return Err(YapsError::config(format!(
                "{}: sample '{}' lists no bams",
                path.display(),
                id
            )));
        }
    }
    samples.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    Ok(samples)
}
