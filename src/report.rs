//! Status log and worker status reporting.
//!
//! The status log is the append-only record of task lifecycle events for
//! one coordinator run; the worker status table tracks each worker's most
//! recent state. Both are mutated by wave-runner tasks and therefore live
//! together behind the run's single lock (see [`StatusBoard`]).

use crate::core::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle states recorded in the status log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Completed,
    Failed,
    #[serde(rename = "timeout")]
    TimedOut,
}

impl TaskState {
    /// Check whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::TimedOut => write!(f, "timeout"),
        }
    }
}

/// One record of a task lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// The task that transitioned.
    pub task_id: TaskId,
    /// The worker the task was labelled with (its primary worker).
    pub worker: String,
    /// The state entered.
    pub status: TaskState,
    /// Error text for failed transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
}

impl StatusEntry {
    fn new(task_id: TaskId, worker: &str, status: TaskState, error: Option<String>) -> Self {
        Self {
            task_id,
            worker: worker.to_string(),
            status,
            error,
            timestamp: Utc::now(),
        }
    }

    /// A task started executing.
    pub fn running(task_id: TaskId, worker: &str) -> Self {
        Self::new(task_id, worker, TaskState::Running, None)
    }

    /// A task completed successfully.
    pub fn completed(task_id: TaskId, worker: &str) -> Self {
        Self::new(task_id, worker, TaskState::Completed, None)
    }

    /// A task failed with an error.
    pub fn failed(task_id: TaskId, worker: &str, error: &str) -> Self {
        Self::new(task_id, worker, TaskState::Failed, Some(error.to_string()))
    }

    /// A task did not settle before the wave deadline.
    pub fn timed_out(task_id: TaskId, worker: &str) -> Self {
        Self::new(task_id, worker, TaskState::TimedOut, None)
    }
}

/// Append-only record of task lifecycle events, ordered by emission time.
///
/// Lives for the duration of one coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLog {
    entries: Vec<StatusEntry>,
}

impl StatusLog {
    /// Append an entry. Entries are never removed or reordered.
    pub fn push(&mut self, entry: StatusEntry) {
        self.entries.push(entry);
    }

    /// All entries, in emission order.
    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one task, in emission order.
    pub fn for_task(&self, id: &TaskId) -> Vec<&StatusEntry> {
        self.entries.iter().filter(|e| &e.task_id == id).collect()
    }

    /// Count entries in the given state.
    pub fn count(&self, state: TaskState) -> usize {
        self.entries.iter().filter(|e| e.status == state).count()
    }

    /// The last terminal state recorded for a task, if any.
    pub fn terminal_state(&self, id: &TaskId) -> Option<TaskState> {
        self.entries
            .iter()
            .rev()
            .find(|e| &e.task_id == id && e.status.is_terminal())
            .map(|e| e.status)
    }

    /// Task ids with at least one entry, in first-seen order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.task_id) {
                seen.push(entry.task_id.clone());
            }
        }
        seen
    }

    /// Synthesize a minimal run summary from the log.
    ///
    /// Used as the last-resort result text when the aggregation worker
    /// is unavailable or fails; the run still returns data rather than
    /// an empty summary.
    pub fn fallback_summary(&self) -> String {
        let tasks = self.task_ids();
        let mut completed = 0usize;
        let mut failed: Vec<String> = Vec::new();
        let mut timed_out: Vec<String> = Vec::new();

        for id in &tasks {
            match self.terminal_state(id) {
                Some(TaskState::Completed) => completed += 1,
                Some(TaskState::Failed) => {
                    let detail = self
                        .for_task(id)
                        .iter()
                        .rev()
                        .find_map(|e| e.error.clone())
                        .unwrap_or_else(|| "unknown error".to_string());
                    failed.push(format!("{} ({})", id, detail));
                }
                Some(TaskState::TimedOut) => timed_out.push(id.to_string()),
                _ => {}
            }
        }

        let mut summary = format!(
            "{} of {} task(s) completed",
            completed,
            tasks.len()
        );
        if !failed.is_empty() {
            summary.push_str(&format!("; failed: {}", failed.join(", ")));
        }
        if !timed_out.is_empty() {
            summary.push_str(&format!("; timed out: {}", timed_out.join(", ")));
        }
        summary.push_str(". Summary worker unavailable; partial results retained.");
        summary
    }
}

/// Latest observed state per worker name, overwritten on each transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerStatusTable {
    states: HashMap<String, TaskState>,
}

impl WorkerStatusTable {
    /// Record a worker's newest state.
    pub fn record(&mut self, worker: &str, state: TaskState) {
        self.states.insert(worker.to_string(), state);
    }

    /// A worker's most recent state.
    pub fn get(&self, worker: &str) -> Option<TaskState> {
        self.states.get(worker).copied()
    }

    /// The full table.
    pub fn as_map(&self) -> &HashMap<String, TaskState> {
        &self.states
    }

    /// Number of tracked workers.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if no workers were tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Shared observability state for one run.
///
/// The only structures mutated concurrently during a run; wave-runner
/// tasks update them through a single async lock.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    /// Append-only lifecycle log.
    pub log: StatusLog,
    /// Latest state per worker.
    pub workers: WorkerStatusTable,
}

impl StatusBoard {
    /// Record one transition in both the log and the worker table.
    pub fn record(&mut self, entry: StatusEntry) {
        if !entry.worker.is_empty() {
            self.workers.record(&entry.worker, entry.status);
        }
        self.log.push(entry);
    }
}
