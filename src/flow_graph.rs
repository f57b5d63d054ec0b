//! Dependency graph over recorded tasks (Arc<str> optimized)
//!
//! Nodes are `stage/uid` keys; edges run parent → child.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{Result, YapsError};
use crate::task::TaskHandle;

/// Graph of task dependencies built from parent links
pub struct FlowGraph {
    /// task key -> list of successor keys
    adjacency: HashMap<Arc<str>, Vec<Arc<str>>>,
    /// task key -> list of predecessor keys (parents)
    predecessors: HashMap<Arc<str>, Vec<Arc<str>>>,
    /// All task keys in creation order
    task_ids: Vec<Arc<str>>,
    task_set: HashSet<Arc<str>>,
}

impl FlowGraph {
    pub fn from_tasks(tasks: &[TaskHandle]) -> Self {
        let capacity = tasks.len();
        let mut adjacency: HashMap<Arc<str>, Vec<Arc<str>>> = HashMap::with_capacity(capacity);
        let mut predecessors: HashMap<Arc<str>, Vec<Arc<str>>> = HashMap::with_capacity(capacity);
        let mut task_ids: Vec<Arc<str>> = Vec::with_capacity(capacity);
        let mut task_set: HashSet<Arc<str>> = HashSet::with_capacity(capacity);

        let mut ordered = tasks.to_vec();
        ordered.sort_by_key(|t| t.id());

        // Create Arc<str> once per task, reuse everywhere
        for task in &ordered {
            let id: Arc<str> = Arc::from(task.key().to_string());
            task_ids.push(Arc::clone(&id));
            task_set.insert(Arc::clone(&id));
            adjacency.insert(Arc::clone(&id), Vec::new());
            predecessors.insert(id, Vec::new());
        }

        for task in &ordered {
            let child = task.key().to_string();
            let tgt_arc = task_set
                .get(child.as_str())
                .cloned()
                .unwrap_or_else(|| Arc::from(child.as_str()));

            for parent in task.parents() {
                let parent = parent.key().to_string();
                let src_arc = task_set
                    .get(parent.as_str())
                    .cloned()
                    .unwrap_or_else(|| Arc::from(parent.as_str()));

                adjacency
                    .entry(Arc::clone(&src_arc))
                    .or_default()
                    .push(Arc::clone(&tgt_arc));
                predecessors
                    .entry(Arc::clone(&tgt_arc))
                    .or_default()
                    .push(src_arc);
            }
        }

        Self {
            adjacency,
            predecessors,
            task_ids,
            task_set,
        }
    }

    pub fn len(&self) -> usize {
        self.task_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
    }

    /// Parents of a task
    #[inline]
    pub fn get_dependencies(&self, task_key: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.predecessors
            .get(task_key)
            .map(|v| v.as_slice())
            .unwrap_or(EMPTY)
    }

    /// Children of a task
    #[inline]
    pub fn get_successors(&self, task_key: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.adjacency
            .get(task_key)
            .map(|v| v.as_slice())
            .unwrap_or(EMPTY)
    }

    /// Tasks nothing depends on, in creation order
    pub fn get_final_tasks(&self) -> Vec<Arc<str>> {
        self.task_ids
            .iter()
            .filter(|id| {
                self.adjacency
                    .get(id.as_ref())
                    .map(|v| v.is_empty())
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    #[inline]
    pub fn contains(&self, task_key: &str) -> bool {
        self.task_set.contains(task_key)
    }

    /// Check if there's a path from `from` to `to` (BFS)
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.adjacency.get(current) {
                for neighbor in neighbors {
                    if neighbor.as_ref() == to {
                        return true;
                    }
                    if visited.insert(neighbor.as_ref()) {
                        queue.push_back(neighbor.as_ref());
                    }
                }
            }
        }

        false
    }

    /// Kahn's algorithm, ties broken by creation order
    ///
    /// Fails if an edge names a task outside the graph or the edges form a cycle.
    pub fn topological_order(&self) -> Result<Vec<Arc<str>>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(self.task_ids.len());
        for id in &self.task_ids {
            let key: &str = id;
            let parents = self.get_dependencies(key);
            if let Some(unknown) = parents.iter().find(|p| !self.task_set.contains(*p)) {
                return Err(YapsError::UnknownParent {
                    task: key.to_string(),
                    parent: unknown.to_string(),
                });
            }
            in_degree.insert(key, parents.len());
        }

        let mut queue: VecDeque<&Arc<str>> = VecDeque::new();
        for id in &self.task_ids {
            let key: &str = id;
            if in_degree.get(key) == Some(&0) {
                queue.push_back(id);
            }
        }
        let mut order = Vec::with_capacity(self.task_ids.len());

        while let Some(current) = queue.pop_front() {
            order.push(Arc::clone(current));
            let key: &str = current;
            for child in self.get_successors(key) {
                let child_key: &str = child;
                if let Some(degree) = in_degree.get_mut(child_key) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if order.len() != self.task_ids.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(key, _)| *key)
                .collect();
            return Err(YapsError::graph(format!("cycle through {}", stuck.join(", "))));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceSpec;
    use crate::stage::StageName;
    use crate::task::{Command, Params, Task, TaskSpec};

    fn task(id: usize, stage: &str, uid: &str, parents: &[&TaskHandle]) -> TaskHandle {
        Arc::new(Task::new(
            id,
            TaskSpec {
                stage: stage.parse::<StageName>().unwrap(),
                uid: uid.to_string(),
                params: Params::new(),
                command: Command::new("noop"),
                resources: ResourceSpec::long_8g(),
                parents: parents.iter().map(|p| Arc::clone(p)).collect(),
            },
        ))
    }

    fn diamond() -> Vec<TaskHandle> {
        let root = task(0, "1-root", "1", &[]);
        let left = task(1, "2-left", "1", &[&root]);
        let right = task(2, "3-right", "1", &[&root]);
        let join = task(3, "4-join", "all-chroms", &[&left, &right]);
        vec![root, left, right, join]
    }

    #[test]
    fn edges_follow_parents() {
        let graph = FlowGraph::from_tasks(&diamond());
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.get_dependencies("4-join/all-chroms").len(), 2);
        assert_eq!(graph.get_successors("1-root/1").len(), 2);
        assert!(graph.get_dependencies("1-root/1").is_empty());
    }

    #[test]
    fn final_tasks_are_sinks() {
        let graph = FlowGraph::from_tasks(&diamond());
        let finals: Vec<String> = graph.get_final_tasks().iter().map(|s| s.to_string()).collect();
        assert_eq!(finals, vec!["4-join/all-chroms"]);
    }

    #[test]
    fn reachability() {
        let graph = FlowGraph::from_tasks(&diamond());
        assert!(graph.has_path("1-root/1", "4-join/all-chroms"));
        assert!(!graph.has_path("2-left/1", "3-right/1"));
        assert!(!graph.has_path("4-join/all-chroms", "1-root/1"));
    }

    #[test]
    fn topological_order_respects_edges_and_creation_order() {
        let mut tasks = diamond();
        tasks.reverse();
        let order: Vec<String> = FlowGraph::from_tasks(&tasks)
            .topological_order()
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(order, vec!["1-root/1", "2-left/1", "3-right/1", "4-join/all-chroms"]);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let orphan_parent = task(0, "1-root", "1", &[]);
        let child = task(1, "2-child", "1", &[&orphan_parent]);
        let err = FlowGraph::from_tasks(&[child]).topological_order().unwrap_err();
        assert!(matches!(err, YapsError::UnknownParent { .. }));
    }
}
