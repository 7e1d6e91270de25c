//! Worker contract and registry.
//!
//! A worker is an opaque unit of work identified by name. It consumes a
//! task-scoped input context and produces a context fragment; failure is
//! signalled through the error channel, never by an empty result. Workers
//! must not block indefinitely — the wave runner bounds them with the
//! wave deadline and a cooperative cancellation signal.

use crate::context::{Fragment, SharedContext};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only input handed to a worker.
///
/// Wraps the filtered context snapshot built by the dispatcher: the goal
/// key plus whatever the task's `data_needs` declared. Workers never see
/// the live shared context.
#[derive(Debug, Clone)]
pub struct TaskInput {
    context: SharedContext,
}

impl TaskInput {
    /// Wrap an already-projected context snapshot.
    pub fn new(context: SharedContext) -> Self {
        Self { context }
    }

    /// The goal text for this run.
    pub fn goal(&self) -> &str {
        self.context.goal()
    }

    /// Look up a visible context value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Check whether a key is visible to this task.
    pub fn contains(&self, key: &str) -> bool {
        self.context.contains(key)
    }

    /// The visible context snapshot.
    pub fn context(&self) -> &SharedContext {
        &self.context
    }
}

/// The uniform worker capability: input context in, fragment out.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Produce a context fragment from the task-scoped input.
    ///
    /// An `Ok` with an empty fragment is a legitimate "nothing to add";
    /// failure must be an `Err`.
    async fn execute(&self, input: TaskInput) -> Result<Fragment>;
}

/// Mapping from worker name to an invocable worker.
///
/// Resolution failures are reported as errors and become task failures
/// in the dispatcher, never process aborts.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under a name, replacing any previous holder.
    pub fn register(&mut self, name: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.insert(name.into(), worker);
    }

    /// Resolve a worker by name.
    ///
    /// # Errors
    /// Returns [`Error::WorkerNotFound`] for unknown names.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Worker>> {
        self.workers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::WorkerNotFound(name.to_string()))
    }

    /// Check whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<&str> {
        self.workers.keys().map(|k| k.as_str()).collect()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Check if no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("WorkerRegistry")
            .field("workers", &names)
            .finish()
    }
}

// ========== Built-in workers ==========

/// Worker that returns a fixed fragment regardless of input.
///
/// Stands in for real data-fetching workers in the CLI demo and in
/// tests.
#[derive(Debug, Clone)]
pub struct StaticWorker {
    fragment: Fragment,
}

impl StaticWorker {
    /// Create a worker that always produces `fragment`.
    pub fn new(fragment: Fragment) -> Self {
        Self { fragment }
    }

    /// Create a worker producing a one-entry fragment.
    pub fn single(key: &str, value: impl Into<Value>) -> Self {
        Self {
            fragment: crate::context::fragment(key, value),
        }
    }
}

#[async_trait]
impl Worker for StaticWorker {
    async fn execute(&self, _input: TaskInput) -> Result<Fragment> {
        Ok(self.fragment.clone())
    }
}

/// Worker that echoes the goal text back under a configurable key.
#[derive(Debug, Clone)]
pub struct GoalEchoWorker {
    key: String,
}

impl GoalEchoWorker {
    /// Create an echo worker writing under `key`.
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl Worker for GoalEchoWorker {
    async fn execute(&self, input: TaskInput) -> Result<Fragment> {
        Ok(crate::context::fragment(
            &self.key,
            input.goal().to_string(),
        ))
    }
}
