//! Error types with fix suggestions
//!
//! Every failure aborts graph construction as a whole: nothing here is
//! recoverable mid-build, so callers propagate with `?` and the binary
//! reports the first error.

use std::path::PathBuf;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum YapsError {
    // ─────────────────────────────────────────────────────────────
    // Regions (YAPS-010)
    // ─────────────────────────────────────────────────────────────
    #[error("YAPS-010: Invalid region '{region}': not a known chromosome and not chrom:start[-end]")]
    InvalidRegion { region: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration (YAPS-020 to YAPS-021)
    // ─────────────────────────────────────────────────────────────
    #[error("YAPS-020: Configuration error: {details}")]
    ConfigValidation { details: String },

    #[error("YAPS-021: {path}:{line}: expected {expected} tab-separated columns, found {found}")]
    TableFormat {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // Graph construction (YAPS-030 to YAPS-033)
    // ─────────────────────────────────────────────────────────────
    #[error("YAPS-030: Graph construction error: {details}")]
    GraphConstruction { details: String },

    #[error("YAPS-031: Task '{task}' has no parameter '{param}'")]
    MissingParam { task: String, param: String },

    #[error("YAPS-032: Task '{task}' was already added to the graph")]
    DuplicateTask { task: String },

    #[error("YAPS-033: Task '{task}' references parent '{parent}' that is not in the graph")]
    UnknownParent { task: String, parent: String },

    // ─────────────────────────────────────────────────────────────
    // Ambient
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl YapsError {
    pub fn config(details: impl Into<String>) -> Self {
        YapsError::ConfigValidation {
            details: details.into(),
        }
    }

    pub fn graph(details: impl Into<String>) -> Self {
        YapsError::GraphConstruction {
            details: details.into(),
        }
    }
}

impl FixSuggestion for YapsError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            YapsError::InvalidRegion { .. } => {
                Some("Use a chromosome name from the reference .fai or chrom:start-end")
            }
            YapsError::ConfigValidation { .. } => {
                Some("Fix the input tables named in the settings file")
            }
            YapsError::TableFormat { .. } => Some("Check the file is tab-delimited, not space-delimited"),
            YapsError::GraphConstruction { .. } => None,
            YapsError::MissingParam { .. } => {
                Some("Declare the output parameter on the upstream stage")
            }
            YapsError::DuplicateTask { .. } => Some("Give every task in a stage a unique uid"),
            YapsError::UnknownParent { .. } => None,
            YapsError::Io(_) => Some("Check file path and permissions"),
            YapsError::Yaml(_) => Some("Check YAML syntax: indentation and quoting"),
            YapsError::Json(_) => None,
        }
    }
}

pub type Result<T, E = YapsError> = std::result::Result<T, E>;
