//! Task descriptors
//!
//! A [`TaskSpec`] is what a stage builder submits; a [`Task`] is what the
//! execution engine recorded for it. Tasks are immutable once recorded and
//! shared as [`TaskHandle`]s, so later stages can read a parent's declared
//! outputs without re-deriving paths.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, YapsError};
use crate::resource::ResourceSpec;
use crate::stage::StageName;

/// Parameter bag: `in_*` inputs, `out_*` declared outputs, pipeline fields
pub type Params = BTreeMap<String, String>;

/// Parameter every per-chromosome task carries
pub const CHROM_PARAM: &str = "in_chrom";

/// Shared handle to a recorded task
pub type TaskHandle = Arc<Task>;

/// Opaque command descriptor; the engine knows how to turn it into a command line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Graph-wide task identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskKey {
    pub stage: String,
    pub uid: String,
}

impl TaskKey {
    pub fn new(stage: &StageName, uid: &str) -> Self {
        Self {
            stage: stage.to_string(),
            uid: uid.to_string(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.uid)
    }
}

/// A task as submitted to the execution engine
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub stage: StageName,
    pub uid: String,
    pub params: Params,
    pub command: Command,
    pub resources: ResourceSpec,
    pub parents: Vec<TaskHandle>,
}

impl TaskSpec {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.stage, &self.uid)
    }
}

/// A task as recorded by the execution engine
#[derive(Debug)]
pub struct Task {
    id: usize,
    stage: StageName,
    uid: String,
    params: Params,
    command: Command,
    resources: ResourceSpec,
    parents: Vec<TaskHandle>,
}

impl Task {
    /// Record `spec` under creation id `id`
    pub fn new(id: usize, spec: TaskSpec) -> Self {
        Self {
            id,
            stage: spec.stage,
            uid: spec.uid,
            params: spec.params,
            command: spec.command,
            resources: spec.resources,
            parents: spec.parents,
        }
    }

    /// Creation order within the graph
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stage(&self) -> &StageName {
        &self.stage
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.stage, &self.uid)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn resources(&self) -> &ResourceSpec {
        &self.resources
    }

    pub fn parents(&self) -> &[TaskHandle] {
        &self.parents
    }

    /// A recorded parameter, or `MissingParam`
    pub fn param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| YapsError::MissingParam {
                task: self.key().to_string(),
                param: name.to_string(),
            })
    }

    /// The chromosome (or region) this task covers
    pub fn chrom(&self) -> Result<&str> {
        self.param(CHROM_PARAM)
    }
}

/// Sort handles by creation id
pub fn sorted_by_id(tasks: &[TaskHandle]) -> Vec<TaskHandle> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by_key(|t| t.id());
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(uid: &str) -> TaskSpec {
        let mut params = Params::new();
        params.insert(CHROM_PARAM.to_string(), uid.to_string());
        params.insert("out_vcf".to_string(), format!("/ws/1-x/{}/out.vcf.gz", uid));
        TaskSpec {
            stage: StageName::new("1", "x").unwrap(),
            uid: uid.to_string(),
            params,
            command: Command::new("noop"),
            resources: ResourceSpec::long_8g(),
            parents: Vec::new(),
        }
    }

    #[test]
    fn reads_declared_params() {
        let task = Task::new(0, spec("2"));
        assert_eq!(task.chrom().unwrap(), "2");
        assert_eq!(task.param("out_vcf").unwrap(), "/ws/1-x/2/out.vcf.gz");
        assert_eq!(task.key().to_string(), "1-x/2");
    }

    #[test]
    fn missing_param_names_task() {
        let task = Task::new(0, spec("2"));
        let err = task.param("out_log").unwrap_err();
        assert_eq!(err.to_string(), "YAPS-031: Task '1-x/2' has no parameter 'out_log'");
    }

    #[test]
    fn sorts_by_creation_id() {
        let a: TaskHandle = Arc::new(Task::new(2, spec("a")));
        let b: TaskHandle = Arc::new(Task::new(0, spec("b")));
        let c: TaskHandle = Arc::new(Task::new(1, spec("c")));
        let uids: Vec<String> = sorted_by_id(&[a, b, c])
            .iter()
            .map(|t| t.uid().to_string())
            .collect();
        assert_eq!(uids, vec!["b", "c", "a"]);
    }
}
