//! Dependency graph and wave organization.
//!
//! The wave organizer groups a plan's sub-tasks into ordered execution
//! waves: every task lands in the earliest wave whose predecessors cover
//! all of its dependencies, and tasks within a wave keep the plan's
//! insertion order. Plans with cycles or dangling dependency references
//! never hang the organizer; the unresolved tasks are force-placed into
//! one final wave and reported as a plan-quality issue.

use crate::clog_warn;
use crate::core::plan::ExecutionPlan;
use crate::core::task::{SubTask, TaskId};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Why tasks were force-placed into the final wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedReason {
    /// The dependency edges contain at least one cycle.
    Cycle,
    /// A task depends on an id that is not in the plan.
    MissingDependency,
}

impl std::fmt::Display for ForcedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForcedReason::Cycle => write!(f, "dependency cycle"),
            ForcedReason::MissingDependency => write!(f, "missing dependency"),
        }
    }
}

/// The dependency structure of a plan, backed by petgraph.
///
/// Used for diagnostics on malformed plans; the wave sweep itself works
/// directly on the `depends_on` sets. Edges pointing at ids missing from
/// the plan are skipped here and surfaced by
/// [`ExecutionPlan::dangling_dependencies`].
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a plan's tasks and `depends_on` edges.
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for task in &plan.sub_tasks {
            let node = graph.add_node(task.id.clone());
            index.insert(task.id.clone(), node);
        }

        for task in &plan.sub_tasks {
            for dep in &task.depends_on {
                if let (Some(&from), Some(&to)) = (index.get(dep), index.get(&task.id)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph, index }
    }

    /// Check whether the dependency edges contain a cycle.
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tasks that directly depend on the given task.
    pub fn dependents(&self, id: &TaskId) -> Vec<&TaskId> {
        match self.index.get(id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
                .filter_map(|n| self.graph.node_weight(n))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

/// The ordered waves computed for one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveSet {
    waves: Vec<Vec<SubTask>>,
    forced: Vec<TaskId>,
    forced_reason: Option<ForcedReason>,
}

impl WaveSet {
    /// The waves, in execution order.
    pub fn waves(&self) -> &[Vec<SubTask>] {
        &self.waves
    }

    /// Number of waves.
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Ids force-placed into the final wave because their dependencies
    /// could never be satisfied. Empty for well-formed plans.
    pub fn forced_tasks(&self) -> &[TaskId] {
        &self.forced
    }

    /// Why the final wave was forced, if it was.
    pub fn forced_reason(&self) -> Option<ForcedReason> {
        self.forced_reason
    }

    /// Check whether the escape valve fired for this plan.
    pub fn is_forced(&self) -> bool {
        !self.forced.is_empty()
    }

    /// The wave index a task was placed in.
    pub fn wave_of(&self, id: &TaskId) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|t| &t.id == id))
    }

    /// Consume the set, yielding the waves.
    pub fn into_waves(self) -> Vec<Vec<SubTask>> {
        self.waves
    }
}

/// Group a plan's sub-tasks into ordered execution waves.
///
/// Iteratively sweeps the not-yet-placed tasks for those whose
/// `depends_on` are all placed; each non-empty sweep becomes the next
/// wave. If tasks remain but none qualifies (a cycle, or a reference to
/// a missing task id), the remainder is force-placed into one final wave
/// instead of looping forever. The forced ids are reported on the
/// returned [`WaveSet`] and logged at WARN; callers should treat a
/// forced wave as a plan-quality issue, not a crash.
///
/// Within a wave, tasks keep the plan's insertion order.
pub fn organize_waves(plan: &ExecutionPlan) -> WaveSet {
    let total = plan.sub_tasks.len();
    let mut placed: HashSet<TaskId> = HashSet::with_capacity(total);
    let mut waves: Vec<Vec<SubTask>> = Vec::new();
    let mut forced: Vec<TaskId> = Vec::new();
    let mut forced_reason = None;

    while placed.len() < total {
        let ready: Vec<SubTask> = plan
            .sub_tasks
            .iter()
            .filter(|t| !placed.contains(&t.id))
            .filter(|t| t.depends_on.iter().all(|dep| placed.contains(dep)))
            .cloned()
            .collect();

        if ready.is_empty() {
            // Escape valve: nothing can make the remaining tasks ready,
            // so run them all in one last wave rather than hanging.
            let remainder: Vec<SubTask> = plan
                .sub_tasks
                .iter()
                .filter(|t| !placed.contains(&t.id))
                .cloned()
                .collect();

            forced = remainder.iter().map(|t| t.id.clone()).collect();
            let reason = if DependencyGraph::from_plan(plan).has_cycle() {
                ForcedReason::Cycle
            } else {
                ForcedReason::MissingDependency
            };
            forced_reason = Some(reason);

            clog_warn!(
                "forcing {} unresolved task(s) into a final wave ({}): {}",
                remainder.len(),
                reason,
                forced
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            for task in &remainder {
                placed.insert(task.id.clone());
            }
            waves.push(remainder);
            break;
        }

        for task in &ready {
            placed.insert(task.id.clone());
        }
        waves.push(ready);
    }

    WaveSet {
        waves,
        forced,
        forced_reason,
    }
}
