//! Task data model for execution plans.
//!
//! Sub-tasks are the atomic units of a plan. They are created once by the
//! planner, are immutable during execution, and are referenced by id from
//! the status log after the run.

use serde::{Deserialize, Serialize};

/// Unique identifier for a sub-task within one plan.
///
/// Unlike process-global identifiers, task ids are short strings assigned
/// by the planner (for example `"task_1"`). They are unique within a
/// single plan and never reused while the plan lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a task id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One unit of work in an execution plan.
///
/// A sub-task names the workers that must run for it, the tasks that must
/// settle before it may start, and the context keys it is allowed to read.
/// The planner emits `agents` as the worker list key; both spellings are
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique identifier within the plan.
    pub id: TaskId,
    /// Human-readable label; not used in control flow.
    #[serde(default)]
    pub description: String,
    /// Workers to invoke for this task, in declared order. Commonly one.
    #[serde(default, alias = "agents")]
    pub workers: Vec<String>,
    /// Ids of tasks that must settle (complete, fail, or time out)
    /// before this task may start.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Advisory planner flag. Actual parallelism is derived structurally
    /// from `depends_on`, never from this field.
    #[serde(default)]
    pub can_parallel: bool,
    /// Context keys this task may read, in addition to the goal key.
    #[serde(default)]
    pub data_needs: Vec<String>,
}

impl SubTask {
    /// Create a sub-task with the given id and a single worker.
    pub fn new(id: impl Into<TaskId>, worker: &str) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            workers: vec![worker.to_string()],
            depends_on: Vec::new(),
            can_parallel: false,
            data_needs: Vec::new(),
        }
    }

    /// Set the human-readable description.
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Replace the worker list.
    pub fn with_workers(mut self, workers: &[&str]) -> Self {
        self.workers = workers.iter().map(|w| w.to_string()).collect();
        self
    }

    /// Add dependencies on the given task ids.
    pub fn depends(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|id| TaskId::from(*id)).collect();
        self
    }

    /// Declare the context keys this task consumes.
    pub fn needs(mut self, keys: &[&str]) -> Self {
        self.data_needs = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// The first declared worker, used to label log entries.
    pub fn primary_worker(&self) -> Option<&str> {
        self.workers.first().map(|w| w.as_str())
    }

    /// Check whether this task has no dependencies.
    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}
