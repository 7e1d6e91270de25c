//! Concurrent execution of one wave.
//!
//! All tasks of a wave are launched together, each on its own tokio task,
//! against the same immutable context snapshot — no task can observe a
//! sibling's output. A wave-level deadline bounds the whole wave: tasks
//! that have not settled when it expires are marked as timed out, a
//! cancellation signal is fired so they stop cooperatively, and their
//! fragments are discarded even if they materialize later. A failing or
//! panicking task never terminates its siblings or the wave.

use crate::clog_debug;
use crate::context::{Fragment, SharedContext};
use crate::core::task::{SubTask, TaskId};
use crate::orchestration::dispatch::Dispatcher;
use crate::report::{StatusBoard, StatusEntry};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Events emitted by the wave runner for task lifecycle changes.
///
/// These events let external components (like the CLI) follow a run
/// without polling the status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// A task has started executing.
    TaskStarted {
        /// The task that started.
        task_id: TaskId,
        /// The task's primary worker.
        worker: String,
    },
    /// A task completed successfully.
    TaskCompleted {
        /// The task that completed.
        task_id: TaskId,
    },
    /// A task failed with an error.
    TaskFailed {
        /// The task that failed.
        task_id: TaskId,
        /// Error message describing the failure.
        error: String,
    },
    /// A task did not settle before the wave deadline.
    TaskTimedOut {
        /// The task that timed out.
        task_id: TaskId,
    },
    /// A wave finished (all members settled or the deadline fired).
    WaveCompleted {
        /// Zero-based wave index.
        wave: usize,
        /// How many tasks settled before the deadline.
        settled: usize,
    },
}

/// Outcome of one task's execution within a wave.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task produced a fragment to merge.
    Success(Fragment),
    /// The task failed; the error text also lands in the status log.
    Failure(String),
    /// The task did not settle before the wave deadline.
    DeadlineExceeded,
}

/// One task's result. Every wave member yields exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    /// The originating task.
    pub task_id: TaskId,
    /// The task's primary worker, for log labelling.
    pub worker: String,
    /// What happened.
    pub outcome: TaskOutcome,
    /// When the result was produced.
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Check whether the task produced a fragment.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success(_))
    }

    /// The produced fragment, for successful tasks.
    pub fn fragment(&self) -> Option<&Fragment> {
        match &self.outcome {
            TaskOutcome::Success(fragment) => Some(fragment),
            _ => None,
        }
    }
}

/// Runs the tasks of one wave concurrently under a deadline.
pub struct WaveRunner {
    /// Executes individual tasks.
    dispatcher: Dispatcher,
    /// Shared status log + worker table, updated from runner tasks.
    board: Arc<RwLock<StatusBoard>>,
    /// Channel for emitting lifecycle events.
    event_tx: mpsc::Sender<RunnerEvent>,
    /// Wave-level deadline.
    deadline: Duration,
}

impl WaveRunner {
    /// Create a wave runner.
    ///
    /// # Arguments
    ///
    /// * `dispatcher` - Executes individual tasks against snapshots
    /// * `board` - Shared status state, also written by runner tasks
    /// * `event_tx` - Channel for lifecycle events
    /// * `deadline` - Wave-level time budget
    pub fn new(
        dispatcher: Dispatcher,
        board: Arc<RwLock<StatusBoard>>,
        event_tx: mpsc::Sender<RunnerEvent>,
        deadline: Duration,
    ) -> Self {
        Self {
            dispatcher,
            board,
            event_tx,
            deadline,
        }
    }

    /// Execute `wave` against a snapshot of the shared context.
    ///
    /// Returns exactly one [`TaskResult`] per wave member: settled
    /// results first, in completion order (nondeterministic for parallel
    /// tasks), then deadline-exceeded results in wave order. The call
    /// returns within the deadline plus scheduling epsilon; it never
    /// waits out a straggler.
    pub async fn run_wave(
        &self,
        wave_index: usize,
        wave: &[SubTask],
        snapshot: &SharedContext,
    ) -> Vec<TaskResult> {
        clog_debug!("wave {}: launching {} task(s)", wave_index, wave.len());

        let cancel = CancellationToken::new();
        let mut join_set: JoinSet<TaskResult> = JoinSet::new();

        for task in wave {
            join_set.spawn(Self::execute_task(
                task.clone(),
                self.dispatcher.clone(),
                snapshot.clone(),
                Arc::clone(&self.board),
                self.event_tx.clone(),
                cancel.child_token(),
            ));
        }

        let deadline = Instant::now() + self.deadline;
        let mut results: Vec<TaskResult> = Vec::with_capacity(wave.len());
        let mut settled: HashSet<TaskId> = HashSet::new();

        while settled.len() < wave.len() {
            match timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    self.record_settled(&result).await;
                    settled.insert(result.task_id.clone());
                    results.push(result);
                }
                Ok(Some(Err(join_err))) => {
                    // Aborted tasks surface here after a deadline; anything
                    // else is unexpected and only logged. Either way the
                    // sweep below accounts for the task.
                    if !join_err.is_cancelled() {
                        crate::clog_error!(
                            "wave {}: task join error: {}",
                            wave_index,
                            join_err
                        );
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // Deadline: stop waiting and stop counting results.
                    cancel.cancel();
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Every wave member not settled by now is a timeout.
        for task in wave {
            if settled.contains(&task.id) {
                continue;
            }
            let worker = task.primary_worker().unwrap_or_default().to_string();
            {
                let mut board = self.board.write().await;
                board.record(StatusEntry::timed_out(task.id.clone(), &worker));
            }
            let _ = self
                .event_tx
                .send(RunnerEvent::TaskTimedOut {
                    task_id: task.id.clone(),
                })
                .await;
            results.push(TaskResult {
                task_id: task.id.clone(),
                worker,
                outcome: TaskOutcome::DeadlineExceeded,
                finished_at: Utc::now(),
            });
        }

        let _ = self
            .event_tx
            .send(RunnerEvent::WaveCompleted {
                wave: wave_index,
                settled: settled.len(),
            })
            .await;
        clog_debug!(
            "wave {}: {} settled, {} timed out",
            wave_index,
            settled.len(),
            wave.len() - settled.len()
        );

        results
    }

    /// Body of one spawned task: record the running transition, dispatch,
    /// and convert every failure mode (worker error, panic, cancellation)
    /// into a result value.
    async fn execute_task(
        task: SubTask,
        dispatcher: Dispatcher,
        snapshot: SharedContext,
        board: Arc<RwLock<StatusBoard>>,
        event_tx: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> TaskResult {
        let worker = task.primary_worker().unwrap_or_default().to_string();

        {
            let mut board = board.write().await;
            board.record(StatusEntry::running(task.id.clone(), &worker));
        }
        let _ = event_tx
            .send(RunnerEvent::TaskStarted {
                task_id: task.id.clone(),
                worker: worker.clone(),
            })
            .await;

        let dispatch = AssertUnwindSafe(dispatcher.dispatch(&task, &snapshot)).catch_unwind();
        let outcome = tokio::select! {
            result = dispatch => match result {
                Ok(Ok(fragment)) => TaskOutcome::Success(fragment),
                Ok(Err(err)) => TaskOutcome::Failure(err.to_string()),
                Err(panic) => TaskOutcome::Failure(panic_message(panic)),
            },
            _ = cancel.cancelled() => TaskOutcome::DeadlineExceeded,
        };

        TaskResult {
            task_id: task.id,
            worker,
            outcome,
            finished_at: Utc::now(),
        }
    }

    /// Record the terminal transition for a settled task and emit the
    /// matching event.
    async fn record_settled(&self, result: &TaskResult) {
        let entry = match &result.outcome {
            TaskOutcome::Success(_) => {
                StatusEntry::completed(result.task_id.clone(), &result.worker)
            }
            TaskOutcome::Failure(error) => {
                StatusEntry::failed(result.task_id.clone(), &result.worker, error)
            }
            TaskOutcome::DeadlineExceeded => {
                StatusEntry::timed_out(result.task_id.clone(), &result.worker)
            }
        };
        {
            let mut board = self.board.write().await;
            board.record(entry);
        }

        let event = match &result.outcome {
            TaskOutcome::Success(_) => RunnerEvent::TaskCompleted {
                task_id: result.task_id.clone(),
            },
            TaskOutcome::Failure(error) => RunnerEvent::TaskFailed {
                task_id: result.task_id.clone(),
                error: error.clone(),
            },
            TaskOutcome::DeadlineExceeded => RunnerEvent::TaskTimedOut {
                task_id: result.task_id.clone(),
            },
        };
        let _ = self.event_tx.send(event).await;
    }
}

/// Extract a readable message from a panic payload.
fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("worker panicked: {}", msg)
    } else {
        "worker panicked".to_string()
    }
}
