//! Stage names: `<index>-<label>`, e.g. `10.1-bcftools-stats-summary`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::YapsError;
use crate::task::TaskHandle;

/// Name of one pipeline stage
///
/// The index is one or more dot-separated digit groups. The full name is
/// used for execution-log grouping and as the stage's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StageName {
    index: String,
    label: String,
}

impl StageName {
    pub fn new(index: impl Into<String>, label: impl Into<String>) -> Result<Self, YapsError> {
        let index = index.into();
        let label = label.into();

        let index_ok = !index.is_empty()
            && index
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if !index_ok {
            return Err(YapsError::graph(format!("stage index '{}' is not dotted digits", index)));
        }
        if label.is_empty() || label.contains('/') {
            return Err(YapsError::graph(format!("stage label '{}' is not a valid directory name", label)));
        }

        Ok(Self { index, label })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.index, self.label)
    }
}

impl FromStr for StageName {
    type Err = YapsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, label) = s
            .split_once('-')
            .ok_or_else(|| YapsError::graph(format!("stage name '{}' has no '<index>-' prefix", s)))?;
        StageName::new(index, label)
    }
}

impl From<StageName> for String {
    fn from(name: StageName) -> Self {
        name.to_string()
    }
}

impl TryFrom<String> for StageName {
    type Error = YapsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// The tasks one builder call produced, in creation order
#[derive(Debug, Clone)]
pub struct Stage {
    name: StageName,
    tasks: Vec<TaskHandle>,
}

impl Stage {
    pub fn new(name: StageName, tasks: Vec<TaskHandle>) -> Self {
        Self { name, tasks }
    }

    pub fn name(&self) -> &StageName {
        &self.name
    }

    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn push(&mut self, task: TaskHandle) {
        self.tasks.push(task);
    }

    /// The only task of a single-task stage
    pub fn single(&self) -> Result<&TaskHandle, YapsError> {
        match self.tasks.as_slice() {
            [task] => Ok(task),
            tasks => Err(YapsError::graph(format!(
                "stage '{}' has {} tasks, expected exactly one",
                self.name,
                tasks.len()
            ))),
        }
    }
}
