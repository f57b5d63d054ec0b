//! Genomic regions: `chrom`, `chrom:start` or `chrom:start-end`
//!
//! Chromosome names may themselves contain colons (`chrHLA:1:2:3:4`), so a
//! string is first looked up verbatim in the reference index and only then
//! split as `name:start(-end)?`.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, YapsError};
use crate::natural::{compare_digits, NaturalKey};

static REGION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<chrom>.+):(?P<start>[0-9]+)(?:-(?P<end>[0-9]+))?$").expect("valid region regex")
});

/// Known chromosome names, read from the first column of a `.fai`
#[derive(Debug, Clone, Default)]
pub struct ChromosomeIndex {
    names: HashSet<String>,
}

impl ChromosomeIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_index_text(&content))
    }

    pub fn from_index_text(content: &str) -> Self {
        let names = content
            .lines()
            .filter_map(|line| line.split('\t').next())
            .map(str::trim_end)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn contains(&self, chrom: &str) -> bool {
        self.names.contains(chrom)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A chromosome, an open-ended interval, or a closed interval
///
/// Positions keep their original digit text. Equality and hashing use the
/// parsed strings as-is; ordering compares them numerically and falls back
/// to the text only to stay consistent with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    chrom: String,
    start: Option<String>,
    end: Option<String>,
}

impl Region {
    /// Parse `text` against the chromosome names in the reference index at `index_path`
    pub fn parse(index_path: &Path, text: &str) -> Result<Self> {
        let index = ChromosomeIndex::load(index_path)?;
        Self::parse_with(&index, text)
    }

    /// Parse `text` against an already loaded index
    pub fn parse_with(index: &ChromosomeIndex, text: &str) -> Result<Self> {
        if index.contains(text) {
            return Ok(Self::whole(text));
        }

        let caps = REGION_RE
            .captures(text)
            .ok_or_else(|| YapsError::InvalidRegion {
                region: text.to_string(),
            })?;

        Ok(Self {
            chrom: caps["chrom"].to_string(),
            start: Some(caps["start"].to_string()),
            end: caps.name("end").map(|m| m.as_str().to_string()),
        })
    }

    /// The whole of `chrom`
    pub fn whole(chrom: impl Into<String>) -> Self {
        Self {
            chrom: chrom.into(),
            start: None,
            end: None,
        }
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }

    pub fn is_whole_chromosome(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Three-way comparison as -1, 0 or 1
    pub fn compare(&self, other: &Self) -> i32 {
        match self.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
}

// None < Some: a whole chromosome starts before any position.
fn cmp_start(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_digits(a, b),
    }
}

// Some < None: an open end reaches further than any bounded one.
fn cmp_end(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_digits(a, b),
    }
}

impl Ord for Region {
    fn cmp(&self, other: &Self) -> Ordering {
        NaturalKey::new(&self.chrom)
            .cmp(&NaturalKey::new(&other.chrom))
            .then_with(|| cmp_start(self.start(), other.start()))
            .then_with(|| cmp_end(self.end(), other.end()))
            .then_with(|| self.chrom.cmp(&other.chrom))
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for Region {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chrom)?;
        if let Some(start) = &self.start {
            write!(f, ":{}", start)?;
            if let Some(end) = &self.end {
                write!(f, "-{}", end)?;
            }
        }
        Ok(())
    }
}
