//! Tab-separated input tables
//!
//! - chromosome table: `chrom<TAB>path`
//! - tranche table: `category<TAB>level<TAB>min-vqslod`
//! - percentile table: `category<TAB>percentile<TAB>min-vqslod<TAB>max-vqslod`
//!
//! Blank lines are skipped; any other row with the wrong column count is fatal.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, YapsError};

/// Upper VQSLOD bound given to the most permissive tranche
pub const TRANCHE_SENTINEL: f64 = 100_000.0;

/// Variant class a threshold row applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantClass {
    Snps,
    Indels,
}

impl VariantClass {
    pub const ALL: [VariantClass; 2] = [VariantClass::Snps, VariantClass::Indels];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantClass::Snps => "snps",
            VariantClass::Indels => "indels",
        }
    }
}

impl fmt::Display for VariantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snps" => Ok(VariantClass::Snps),
            "indels" => Ok(VariantClass::Indels),
            _ => Err(()),
        }
    }
}

/// Closed-open VQSLOD interval `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VqslodInterval {
    pub min: f64,
    pub max: f64,
}

impl VqslodInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value < self.max
    }
}

/// Per-class interval tables, keyed by tranche level or percentile
pub type IntervalTable = BTreeMap<VariantClass, BTreeMap<u32, VqslodInterval>>;

/// Non-blank rows with their 1-based line numbers
fn read_rows(path: &Path, columns: usize) -> Result<Vec<(usize, Vec<String>)>> {
    let content = fs::read_to_string(path)?;
    let mut rows = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split('\t').map(str::to_string).collect();
        if fields.len() != columns {
            return Err(YapsError::TableFormat {
                path: path.to_path_buf(),
                line: i + 1,
                expected: columns,
                found: fields.len(),
            });
        }
        rows.push((i + 1, fields));
    }

    Ok(rows)
}

fn parse_field<T: FromStr>(path: &Path, line: usize, what: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        YapsError::config(format!(
            "{}:{}: {} '{}' is not a valid number",
            path.display(),
            line,
            what,
            raw
        ))
    })
}

/// `chrom<TAB>path` rows as a map; a chromosome listed twice is an error
pub fn read_chrom_paths(path: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut map = BTreeMap::new();
    for (line, fields) in read_rows(path, 2)? {
        let chrom = fields[0].trim().to_string();
        if chrom.is_empty() {
            return Err(YapsError::config(format!(
                "{}:{}: empty chromosome name",
                path.display(),
                line
            )));
        }
        let file = PathBuf::from(fields[1].trim());
        if map.insert(chrom.clone(), file).is_some() {
            return Err(YapsError::config(format!(
                "{}:{}: chromosome '{}' listed more than once",
                path.display(),
                line,
                chrom
            )));
        }
    }
    Ok(map)
}

fn class_of(path: &Path, line: usize, raw: &str) -> Option<VariantClass> {
    let class = raw.trim().parse().ok();
    if class.is_none() {
        debug!(file = %path.display(), line, category = raw, "skipping row of unknown category");
    }
    class
}

fn require_all_classes<V>(path: &Path, table: &BTreeMap<VariantClass, V>) -> Result<()> {
    for class in VariantClass::ALL {
        if !table.contains_key(&class) {
            return Err(YapsError::config(format!(
                "{} has no '{}' rows",
                path.display(),
                class
            )));
        }
    }
    Ok(())
}

/// Tranche boundaries: class -> level -> minimum VQSLOD
pub fn read_tranches(path: &Path) -> Result<BTreeMap<VariantClass, BTreeMap<u32, f64>>> {
    let mut table: BTreeMap<VariantClass, BTreeMap<u32, f64>> = BTreeMap::new();
    for (line, fields) in read_rows(path, 3)? {
        let Some(class) = class_of(path, line, &fields[0]) else {
            continue;
        };
        let level: u32 = parse_field(path, line, "tranche level", &fields[1])?;
        let min: f64 = parse_field(path, line, "minimum VQSLOD", &fields[2])?;
        table.entry(class).or_default().insert(level, min);
    }
    require_all_classes(path, &table)?;
    Ok(table)
}

/// Percentile bins: class -> percentile -> [min, max)
pub fn read_percentiles(path: &Path) -> Result<IntervalTable> {
    let mut table: IntervalTable = BTreeMap::new();
    for (line, fields) in read_rows(path, 4)? {
        let Some(class) = class_of(path, line, &fields[0]) else {
            continue;
        };
        let percentile: u32 = parse_field(path, line, "percentile", &fields[1])?;
        let min: f64 = parse_field(path, line, "minimum VQSLOD", &fields[2])?;
        let max: f64 = parse_field(path, line, "maximum VQSLOD", &fields[3])?;
        table
            .entry(class)
            .or_default()
            .insert(percentile, VqslodInterval { min, max });
    }
    require_all_classes(path, &table)?;
    Ok(table)
}

/// Pair each tranche boundary with the previous level's boundary
///
/// Level order is ascending; the first level's upper bound is
/// [`TRANCHE_SENTINEL`].
pub fn tranche_intervals(levels: &BTreeMap<u32, f64>) -> BTreeMap<u32, VqslodInterval> {
    let mut intervals = BTreeMap::new();
    let mut upper = TRANCHE_SENTINEL;
    for (&level, &min) in levels {
        intervals.insert(level, VqslodInterval { min, max: upper });
        upper = min;
    }
    intervals
}
