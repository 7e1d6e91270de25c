//! Worker dispatch for a single task.
//!
//! The dispatcher enforces the data-visibility boundary between tasks:
//! each task sees a filtered copy of the shared context restricted to the
//! goal key plus its declared `data_needs`, never the live context. It
//! then invokes the task's workers in declared order and merges their
//! fragments.

use crate::clog_trace;
use crate::context::{Fragment, SharedContext};
use crate::core::task::SubTask;
use crate::error::{Error, Result};
use crate::worker::{TaskInput, WorkerRegistry};
use std::sync::Arc;

/// Executes one task against a context snapshot.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a worker registry.
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Build the task-scoped input for `task` from a context snapshot.
    ///
    /// The projection keeps the goal key plus the keys named by the
    /// task's `data_needs`; everything else is invisible to the task.
    pub fn task_input(task: &SubTask, snapshot: &SharedContext) -> TaskInput {
        TaskInput::new(snapshot.project(&task.data_needs))
    }

    /// Invoke the task's workers in declared order.
    ///
    /// Fragments from multiple workers merge left to right, so a later
    /// worker of the same task wins on key collision. The first worker
    /// error fails the whole task; an unknown worker name counts as a
    /// failure too.
    ///
    /// # Errors
    /// Returns the first resolution or execution error, tagged with the
    /// worker's name.
    pub async fn dispatch(&self, task: &SubTask, snapshot: &SharedContext) -> Result<Fragment> {
        let input = Self::task_input(task, snapshot);
        clog_trace!(
            "dispatch {}: {} worker(s), {} visible key(s)",
            task.id,
            task.workers.len(),
            input.context().len()
        );

        let mut merged = Fragment::new();
        for name in &task.workers {
            let worker = self.registry.resolve(name)?;
            let fragment =
                worker
                    .execute(input.clone())
                    .await
                    .map_err(|err| Error::WorkerFailed {
                        worker: name.clone(),
                        message: err.to_string(),
                    })?;
            for (key, value) in fragment {
                merged.insert(key, value);
            }
        }
        Ok(merged)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}
