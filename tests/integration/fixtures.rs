//! Test fixtures for integration tests.
//!
//! Provides mock workers and run helpers shared across the suite.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crest::context::Fragment;
use crest::error::{Error, Result};
use crest::orchestration::{CompositeResult, Coordinator, CoordinatorConfig};
use crest::worker::{StaticWorker, TaskInput, Worker, WorkerRegistry};
use crest::ExecutionPlan;

/// Worker that always fails with a fixed message.
pub struct FailingWorker {
    message: String,
}

impl FailingWorker {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Worker for FailingWorker {
    async fn execute(&self, _input: TaskInput) -> Result<Fragment> {
        Err(Error::Validation(self.message.clone()))
    }
}

/// Worker that panics when executed.
pub struct PanickingWorker;

#[async_trait]
impl Worker for PanickingWorker {
    async fn execute(&self, _input: TaskInput) -> Result<Fragment> {
        panic!("fixture panic");
    }
}

/// Worker that sleeps before returning its fragment.
pub struct SlowWorker {
    delay: Duration,
    fragment: Fragment,
}

impl SlowWorker {
    pub fn new(delay: Duration, fragment: Fragment) -> Self {
        Self { delay, fragment }
    }
}

#[async_trait]
impl Worker for SlowWorker {
    async fn execute(&self, _input: TaskInput) -> Result<Fragment> {
        tokio::time::sleep(self.delay).await;
        Ok(self.fragment.clone())
    }
}

/// Record of the context keys a [`RecordingWorker`] was shown, one entry
/// per invocation.
pub type SeenKeys = Arc<Mutex<Vec<Vec<String>>>>;

/// Worker that records the visible context keys, then produces its
/// fragment. Used to verify the data-visibility boundary.
pub struct RecordingWorker {
    seen: SeenKeys,
    fragment: Fragment,
}

impl RecordingWorker {
    /// Create the worker plus a handle to its recordings.
    pub fn new(fragment: Fragment) -> (Self, SeenKeys) {
        let seen: SeenKeys = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                seen: Arc::clone(&seen),
                fragment,
            },
            seen,
        )
    }
}

#[async_trait]
impl Worker for RecordingWorker {
    async fn execute(&self, input: TaskInput) -> Result<Fragment> {
        let keys: Vec<String> = input.context().keys().map(|k| k.to_string()).collect();
        self.seen.lock().unwrap().push(keys);
        Ok(self.fragment.clone())
    }
}

/// Build a registry from (name, worker) pairs.
pub fn registry(pairs: Vec<(&str, Arc<dyn Worker>)>) -> Arc<WorkerRegistry> {
    let mut registry = WorkerRegistry::new();
    for (name, worker) in pairs {
        registry.register(name, worker);
    }
    Arc::new(registry)
}

/// A static worker producing a one-entry fragment, boxed for `registry`.
pub fn static_worker(key: &str, value: impl Into<Value>) -> Arc<dyn Worker> {
    Arc::new(StaticWorker::single(key, value))
}

/// Coordinator settings with a test-friendly wave deadline.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        wave_deadline: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Run a plan to completion with the given registry and settings,
/// draining lifecycle events.
pub async fn run_plan_with(
    plan: ExecutionPlan,
    registry: Arc<WorkerRegistry>,
    config: CoordinatorConfig,
) -> CompositeResult {
    let (event_tx, mut event_rx) = mpsc::channel(100);
    let drain = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

    let coordinator = Coordinator::new(registry, config, event_tx);
    let result = coordinator.run(plan, "integration goal").await;
    drop(coordinator);
    let _ = drain.await;
    result
}

/// Run a plan with default test settings.
pub async fn run_plan(plan: ExecutionPlan, registry: Arc<WorkerRegistry>) -> CompositeResult {
    run_plan_with(plan, registry, test_config()).await
}
