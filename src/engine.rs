//! Execution engine seam
//!
//! Graph construction only talks to an [`ExecutionEngine`]: it submits
//! [`TaskSpec`]s and gets back handles to recorded [`Task`]s. Running tasks,
//! retries, persistence and resume belong to the engine.
//!
//! [`PlanRecorder`] is the bundled engine. It validates and records the graph
//! and writes it out as a JSON plan instead of spawning anything.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, YapsError};
use crate::flow_graph::FlowGraph;
use crate::stage::Stage;
use crate::task::{Task, TaskHandle, TaskKey, TaskSpec};

/// Maps a task to the directory its execution logs go to
pub type LogDirFn = Box<dyn Fn(&Task) -> PathBuf>;

/// Flags for handing a built graph to the engine
pub struct RunOptions {
    /// Leave the workflow open so more tasks can be appended later
    pub continue_without_finalizing: bool,
    pub log_dir: Option<LogDirFn>,
    pub restart: bool,
    pub skip_confirm: bool,
    /// Persist task state after every task rather than in batches
    pub flush_task_state: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            continue_without_finalizing: true,
            log_dir: None,
            restart: false,
            skip_confirm: false,
            flush_task_state: false,
        }
    }
}

impl RunOptions {
    pub fn with_log_dir(mut self, f: impl Fn(&Task) -> PathBuf + 'static) -> Self {
        self.log_dir = Some(Box::new(f));
        self
    }
}

/// `<workspace>/logs/<stage>/<uid>`
pub fn default_log_dir(workspace: &Path, task: &Task) -> PathBuf {
    workspace
        .join("logs")
        .join(task.stage().to_string())
        .join(task.uid())
}

/// The collaborator that records and runs tasks
pub trait ExecutionEngine {
    /// Record a task; its parents must already be recorded
    fn add_task(&mut self, spec: TaskSpec) -> Result<TaskHandle>;

    /// Create every directory the recorded tasks will write into
    fn make_output_dirs(&self) -> Result<()>;

    /// Hand the recorded graph over for execution
    fn run(&mut self, options: RunOptions) -> Result<()>;
}

/// One task in a recorded plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub id: usize,
    pub stage: String,
    pub uid: String,
    pub command: String,
    pub params: crate::task::Params,
    pub drm_params: serde_json::Value,
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// A recorded graph in dependency order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub workflow: String,
    /// Where a scheduling engine keeps task state across restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_db: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_log: Option<PathBuf>,
    pub finalized: bool,
    pub restart: bool,
    pub skip_confirm: bool,
    pub flush_task_state: bool,
    pub tasks: Vec<PlannedTask>,
}

/// In-process engine that records the graph and writes a JSON plan
pub struct PlanRecorder {
    workflow: String,
    plan_path: Option<PathBuf>,
    state_db: Option<PathBuf>,
    primary_log: Option<PathBuf>,
    tasks: Vec<TaskHandle>,
    /// (stage, uid) -> position in `tasks`
    index: HashMap<TaskKey, usize>,
    plan: Option<Plan>,
}

impl PlanRecorder {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            plan_path: None,
            state_db: None,
            primary_log: None,
            tasks: Vec::new(),
            index: HashMap::new(),
            plan: None,
        }
    }

    /// Write the plan to `path` on `run`
    pub fn with_plan_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_path = Some(path.into());
        self
    }

    /// Record the engine state database the plan belongs to
    pub fn with_state_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_db = Some(path.into());
        self
    }

    /// Workflow-level log, alongside the per-task log directories
    pub fn with_primary_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.primary_log = Some(path.into());
        self
    }

    /// Recorded tasks in creation order
    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskHandle> {
        self.index.get(key).map(|&i| &self.tasks[i])
    }

    /// Recorded tasks grouped by stage, stages in order of first task
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = Vec::new();
        for task in &self.tasks {
            match stages.iter_mut().find(|s| s.name() == task.stage()) {
                Some(stage) => stage.push(Arc::clone(task)),
                None => stages.push(Stage::new(task.stage().clone(), vec![Arc::clone(task)])),
            }
        }
        stages
    }

    /// Plan produced by the last `run`
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    fn check_parents(&self, spec: &TaskSpec) -> Result<()> {
        for parent in &spec.parents {
            let known = self
                .index
                .get(&parent.key())
                .map(|&i| Arc::ptr_eq(&self.tasks[i], parent))
                .unwrap_or(false);
            if !known {
                return Err(YapsError::UnknownParent {
                    task: spec.key().to_string(),
                    parent: parent.key().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl ExecutionEngine for PlanRecorder {
    fn add_task(&mut self, spec: TaskSpec) -> Result<TaskHandle> {
        let key = spec.key();
        if self.index.contains_key(&key) {
            return Err(YapsError::DuplicateTask {
                task: key.to_string(),
            });
        }
        self.check_parents(&spec)?;

        let id = self.tasks.len();
        let task = Arc::new(Task::new(id, spec));
        debug!(task = %key, id, parents = task.parents().len(), "recorded task");

        self.index.insert(key, id);
        self.tasks.push(Arc::clone(&task));
        Ok(task)
    }

    fn make_output_dirs(&self) -> Result<()> {
        let mut created = 0usize;
        for task in &self.tasks {
            for (name, value) in task.params() {
                if !name.starts_with("out_") {
                    continue;
                }
                let path = Path::new(value);
                let dir = if name.ends_with("_dir") {
                    Some(path)
                } else {
                    path.parent()
                };
                if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(dir)?;
                    created += 1;
                }
            }
        }
        debug!(workflow = %self.workflow, directories = created, "ensured output directories");
        Ok(())
    }

    fn run(&mut self, options: RunOptions) -> Result<()> {
        let graph = FlowGraph::from_tasks(&self.tasks);
        let order = graph.topological_order()?;

        let by_key: HashMap<String, &TaskHandle> =
            self.tasks.iter().map(|t| (t.key().to_string(), t)).collect();

        let mut planned = Vec::with_capacity(order.len());
        for key in &order {
            let key: &str = key;
            let task = by_key[key];
            planned.push(PlannedTask {
                id: task.id(),
                stage: task.stage().to_string(),
                uid: task.uid().to_string(),
                command: task.command().to_string(),
                params: task.params().clone(),
                drm_params: task.resources().to_drm_params(),
                parents: graph.get_dependencies(key).iter().map(|p| p.to_string()).collect(),
                log_dir: options.log_dir.as_ref().map(|f| f(&**task)),
            });
        }

        let plan = Plan {
            workflow: self.workflow.clone(),
            state_db: self.state_db.clone(),
            primary_log: self.primary_log.clone(),
            finalized: !options.continue_without_finalizing,
            restart: options.restart,
            skip_confirm: options.skip_confirm,
            flush_task_state: options.flush_task_state,
            tasks: planned,
        };

        if let Some(path) = &self.plan_path {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            fs::write(path, serde_json::to_string_pretty(&plan)?)?;
        }

        info!(
            workflow = %self.workflow,
            tasks = plan.tasks.len(),
            final_tasks = graph.get_final_tasks().len(),
            "recorded plan"
        );
        self.plan = Some(plan);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceSpec;
    use crate::stage::StageName;
    use crate::task::{Command, Params};
    use tempfile::tempdir;

    fn spec(stage: &str, uid: &str, out: Option<&Path>, parents: Vec<TaskHandle>) -> TaskSpec {
        let mut params = Params::new();
        if let Some(out) = out {
            params.insert("out_vcf".to_string(), out.display().to_string());
        }
        TaskSpec {
            stage: stage.parse::<StageName>().unwrap(),
            uid: uid.to_string(),
            params,
            command: Command::new("noop"),
            resources: ResourceSpec::long_8g(),
            parents,
        }
    }

    #[test]
    fn assigns_creation_ids() {
        let mut engine = PlanRecorder::new("test");
        let a = engine.add_task(spec("1-a", "1", None, vec![])).unwrap();
        let b = engine.add_task(spec("2-b", "1", None, vec![a.clone()])).unwrap();
        assert_eq!(engine.get(&b.key()).map(|t| t.id()), Some(1));
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(b.parents()[0].key(), a.key());
    }

    #[test]
    fn rejects_duplicate_identity() {
        let mut engine = PlanRecorder::new("test");
        engine.add_task(spec("1-a", "1", None, vec![])).unwrap();
        let err = engine.add_task(spec("1-a", "1", None, vec![])).unwrap_err();
        assert!(matches!(err, YapsError::DuplicateTask { .. }));
    }

    #[test]
    fn rejects_parents_from_another_graph() {
        let mut other = PlanRecorder::new("other");
        let foreign = other.add_task(spec("1-a", "1", None, vec![])).unwrap();

        let mut engine = PlanRecorder::new("test");
        let err = engine.add_task(spec("2-b", "1", None, vec![foreign])).unwrap_err();
        assert!(matches!(err, YapsError::UnknownParent { .. }));
    }

    #[test]
    fn groups_stages_in_creation_order() {
        let mut engine = PlanRecorder::new("test");
        let a1 = engine.add_task(spec("1-a", "1", None, vec![])).unwrap();
        let a2 = engine.add_task(spec("1-a", "2", None, vec![])).unwrap();
        engine.add_task(spec("2-b", "all", None, vec![a1, a2])).unwrap();

        let stages = engine.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name().to_string(), "1-a");
        assert_eq!(stages[0].len(), 2);
        assert_eq!(stages[1].len(), 1);
    }

    #[test]
    fn creates_output_directories() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("1-a/chr1/out.vcf.gz");
        let mut engine = PlanRecorder::new("test");
        engine.add_task(spec("1-a", "chr1", Some(&out), vec![])).unwrap();

        engine.make_output_dirs().unwrap();
        engine.make_output_dirs().unwrap();
        assert!(temp.path().join("1-a/chr1").is_dir());
        assert!(!out.exists());
    }

    #[test]
    fn run_writes_plan_in_dependency_order() {
        let temp = tempdir().unwrap();
        let plan_path = temp.path().join("plan.json");
        let workspace = temp.path().to_path_buf();

        let mut engine = PlanRecorder::new("test")
            .with_plan_path(&plan_path)
            .with_state_db(temp.path().join(".job_queue.db"))
            .with_primary_log(temp.path().join("test.log"));
        let a = engine.add_task(spec("1-a", "1", None, vec![])).unwrap();
        engine.add_task(spec("2-b", "1", None, vec![a])).unwrap();

        let options = RunOptions {
            restart: true,
            ..RunOptions::default()
        }
        .with_log_dir(move |task| default_log_dir(&workspace, task));
        engine.run(options).unwrap();

        let written: Plan = serde_json::from_str(&fs::read_to_string(&plan_path).unwrap()).unwrap();
        assert_eq!(Some(&written), engine.plan());
        assert!(written.restart);
        assert_eq!(written.state_db, Some(temp.path().join(".job_queue.db")));
        assert_eq!(written.primary_log, Some(temp.path().join("test.log")));
        assert!(!written.finalized);
        assert_eq!(written.tasks[1].parents, vec!["1-a/1"]);
        assert_eq!(
            written.tasks[1].log_dir.as_deref(),
            Some(temp.path().join("logs/2-b/1").as_path())
        );
        assert_eq!(written.tasks[0].drm_params["q"], "long");
    }
}
