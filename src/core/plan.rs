//! Execution plans produced by the planner collaborator.
//!
//! A plan is the full task graph for one goal. The executor accepts the
//! plan's `sub_tasks` and their `depends_on` edges as ground truth and
//! recomputes waves itself; `execution_order` and `parallel_groups` are
//! carried as planner-reported hints only.

use crate::core::task::{SubTask, TaskId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one plan instance.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Create a new unique plan identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The full task graph for one goal.
///
/// Computed once by the planner before execution begins and not mutated
/// during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Identifier assigned when the plan enters the executor.
    #[serde(default)]
    pub id: PlanId,
    /// The sub-tasks, in planner order. Order within a wave follows this.
    pub sub_tasks: Vec<SubTask>,
    /// Planner-suggested linear order. Informational.
    #[serde(default)]
    pub execution_order: Vec<TaskId>,
    /// Planner-suggested parallel groupings. Informational; the executor
    /// recomputes waves from `depends_on`.
    #[serde(default)]
    pub parallel_groups: Vec<Vec<TaskId>>,
}

impl ExecutionPlan {
    /// Create a plan from a list of sub-tasks.
    pub fn new(sub_tasks: Vec<SubTask>) -> Self {
        Self {
            id: PlanId::new(),
            sub_tasks,
            execution_order: Vec::new(),
            parallel_groups: Vec::new(),
        }
    }

    /// Parse a plan from planner JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Look up a sub-task by id.
    pub fn get(&self, id: &TaskId) -> Option<&SubTask> {
        self.sub_tasks.iter().find(|t| &t.id == id)
    }

    /// Check whether the plan contains a task with the given id.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Number of sub-tasks in the plan.
    pub fn len(&self) -> usize {
        self.sub_tasks.len()
    }

    /// Check if the plan has no sub-tasks.
    pub fn is_empty(&self) -> bool {
        self.sub_tasks.is_empty()
    }

    /// Validate structural plan invariants.
    ///
    /// Task ids must be non-empty and unique within the plan. Dangling
    /// `depends_on` references and cycles are deliberately *not* errors
    /// here: they are plan-quality issues the wave organizer recovers
    /// from with its forced-final-wave escape valve.
    ///
    /// # Errors
    /// Returns a validation error for an empty or duplicated task id.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for task in &self.sub_tasks {
            if task.id.as_str().is_empty() {
                return Err(Error::Validation("task with empty id".to_string()));
            }
            if !seen.insert(&task.id) {
                return Err(Error::Validation(format!(
                    "duplicate task id: {}",
                    task.id
                )));
            }
        }
        Ok(())
    }

    /// Ids referenced by `depends_on` edges that are missing from the plan.
    ///
    /// Returned as `(task, missing dependency)` pairs in plan order.
    pub fn dangling_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        self.sub_tasks
            .iter()
            .flat_map(|task| {
                task.depends_on
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .map(|dep| (task.id.clone(), dep.clone()))
            })
            .collect()
    }
}
