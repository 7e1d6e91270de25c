//! Top-level coordination of plan execution.
//!
//! The coordinator drives one plan through the phase sequence
//! `Planning → Running → Aggregating → Done`: it organizes waves, runs
//! them in order through the wave runner, folds successful fragments into
//! the shared context between waves, and finishes with a terminal
//! aggregation step. It has no failure mode of its own — every error
//! degrades to status-log data inside the returned [`CompositeResult`].

use crate::clog;
use crate::clog_warn;
use crate::context::{fragment, SharedContext};
use crate::core::graph::organize_waves;
use crate::core::plan::ExecutionPlan;
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::orchestration::dispatch::Dispatcher;
use crate::orchestration::runner::{RunnerEvent, WaveRunner};
use crate::report::{StatusBoard, StatusEntry, StatusLog, WorkerStatusTable};
use crate::worker::{TaskInput, WorkerRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Phases of one coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Plan received, waves being organized.
    Planning,
    /// Waves executing in order.
    Running,
    /// Terminal aggregation of the final context.
    Aggregating,
    /// Composite result assembled.
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Planning => write!(f, "planning"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Aggregating => write!(f, "aggregating"),
            RunPhase::Done => write!(f, "done"),
        }
    }
}

/// A record of a phase transition with timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    /// The phase that was entered.
    pub phase: RunPhase,
    /// When this phase was entered.
    pub entered_at: DateTime<Utc>,
}

/// Tracks the phase of one run and enforces valid transitions.
///
/// Phases progress strictly forward:
/// Planning -> Running -> Aggregating -> Done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    phase: RunPhase,
    history: Vec<PhaseHistoryEntry>,
}

impl RunState {
    /// Create a state in the Planning phase.
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Planning,
            history: vec![PhaseHistoryEntry {
                phase: RunPhase::Planning,
                entered_at: Utc::now(),
            }],
        }
    }

    /// Check if a transition to the target phase is valid from the
    /// current phase.
    pub fn can_transition(&self, target: RunPhase) -> bool {
        matches!(
            (self.phase, target),
            (RunPhase::Planning, RunPhase::Running)
                | (RunPhase::Running, RunPhase::Aggregating)
                | (RunPhase::Aggregating, RunPhase::Done)
        )
    }

    /// Attempt to transition to a new phase.
    ///
    /// # Errors
    /// Returns an error if the transition violates the phase ordering.
    pub fn transition(&mut self, target: RunPhase) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }

        self.phase = target;
        self.history.push(PhaseHistoryEntry {
            phase: target,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    /// Step to the next phase in the fixed order. Idempotent at Done.
    pub fn advance(&mut self) -> RunPhase {
        let next = match self.phase {
            RunPhase::Planning => RunPhase::Running,
            RunPhase::Running => RunPhase::Aggregating,
            RunPhase::Aggregating | RunPhase::Done => RunPhase::Done,
        };
        if next != self.phase {
            self.phase = next;
            self.history.push(PhaseHistoryEntry {
                phase: next,
                entered_at: Utc::now(),
            });
        }
        next
    }

    /// The current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// The history of all phases entered, in order.
    pub fn history(&self) -> &[PhaseHistoryEntry] {
        &self.history
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for one coordinator run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Time budget per wave. Tasks not settled when it expires are
    /// marked as timed out.
    pub wave_deadline: Duration,
    /// Worker invoked on the full context when no task produced a
    /// summary.
    pub aggregator: String,
    /// Context key the summary is expected under.
    pub summary_key: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            wave_deadline: Duration::from_secs(120),
            aggregator: "summarizer".to_string(),
            summary_key: "summary".to_string(),
        }
    }
}

/// Everything one run produces, even on partial failure.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeResult {
    /// The final shared context, goal key included.
    pub context: SharedContext,
    /// Append-only lifecycle log for the run.
    pub status_log: StatusLog,
    /// Latest state per worker.
    pub worker_status: WorkerStatusTable,
    /// The executed plan, unchanged.
    pub plan: ExecutionPlan,
    /// Ids force-placed into the final wave; empty for well-formed plans.
    pub forced_tasks: Vec<TaskId>,
    /// Phase history for the run.
    pub phases: Vec<PhaseHistoryEntry>,
}

/// Drives a plan through wave organization, wave execution, context
/// merging, and terminal aggregation.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use crest::orchestration::{Coordinator, CoordinatorConfig};
/// use crest::worker::WorkerRegistry;
///
/// let (event_tx, mut event_rx) = mpsc::channel(100);
/// let coordinator = Coordinator::new(registry, CoordinatorConfig::default(), event_tx);
/// let result = coordinator.run(plan, "find the next launch window").await;
/// ```
pub struct Coordinator {
    /// Workers available to tasks, by name.
    registry: Arc<WorkerRegistry>,
    /// Run settings.
    config: CoordinatorConfig,
    /// Channel for forwarding runner lifecycle events.
    event_tx: mpsc::Sender<RunnerEvent>,
}

impl Coordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `registry` - Worker registry tasks resolve against
    /// * `config` - Run settings (deadline, aggregation)
    /// * `event_tx` - Channel for task lifecycle events
    pub fn new(
        registry: Arc<WorkerRegistry>,
        config: CoordinatorConfig,
        event_tx: mpsc::Sender<RunnerEvent>,
    ) -> Self {
        Self {
            registry,
            config,
            event_tx,
        }
    }

    /// The coordinator's run settings.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Execute `plan` for `goal` and return the composite result.
    ///
    /// Never fails: worker errors, timeouts, malformed plans, and
    /// aggregation failures all degrade to status-log entries and a
    /// best-effort summary inside the returned value.
    pub async fn run(&self, plan: ExecutionPlan, goal: &str) -> CompositeResult {
        let mut state = RunState::new();
        let board = Arc::new(RwLock::new(StatusBoard::default()));
        let mut context = SharedContext::with_goal(goal);

        if let Err(err) = plan.validate() {
            // Structural defects are plan-quality issues, not aborts;
            // execution proceeds on a best-effort basis.
            clog_warn!("plan {} failed validation: {}", plan.id.short(), err);
        }

        let wave_set = organize_waves(&plan);
        clog!(
            "plan {}: {} task(s) in {} wave(s)",
            plan.id.short(),
            plan.len(),
            wave_set.wave_count()
        );

        state.advance();
        let runner = WaveRunner::new(
            Dispatcher::new(Arc::clone(&self.registry)),
            Arc::clone(&board),
            self.event_tx.clone(),
            self.config.wave_deadline,
        );

        for (index, wave) in wave_set.waves().iter().enumerate() {
            let snapshot = context.clone();
            let results = runner.run_wave(index, wave, &snapshot).await;

            // Fold successful fragments in, in completion order; later
            // results win on key collision.
            for result in &results {
                if let Some(frag) = result.fragment() {
                    context.merge_fragment(frag);
                }
            }
        }

        state.advance();
        if !context.contains(&self.config.summary_key) {
            self.aggregate(&mut context, &board).await;
        }

        state.advance();
        let board = board.read().await.clone();
        clog!(
            "plan {}: done ({} log entries)",
            plan.id.short(),
            board.log.len()
        );

        CompositeResult {
            context,
            status_log: board.log,
            worker_status: board.workers,
            plan,
            forced_tasks: wave_set.forced_tasks().to_vec(),
            phases: state.history().to_vec(),
        }
    }

    /// Invoke the terminal aggregation worker on the full context; fall
    /// back to a summary synthesized from the status log if it is
    /// missing, fails, or exceeds the wave deadline.
    async fn aggregate(&self, context: &mut SharedContext, board: &Arc<RwLock<StatusBoard>>) {
        let agg_id = TaskId::from("aggregate");
        let name = self.config.aggregator.as_str();

        // Snapshot the fallback text now, while the log holds exactly the
        // plan tasks' entries.
        let fallback = board.read().await.log.fallback_summary();

        {
            let mut board = board.write().await;
            board.record(StatusEntry::running(agg_id.clone(), name));
        }

        let outcome: Result<crate::context::Fragment> = match self.registry.resolve(name) {
            Ok(worker) => {
                let input = TaskInput::new(context.clone());
                match tokio::time::timeout(self.config.wave_deadline, worker.execute(input))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(self.config.wave_deadline)),
                }
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(frag) => {
                context.merge_fragment(&frag);
                let mut board = board.write().await;
                board.record(StatusEntry::completed(agg_id, name));
            }
            Err(err) => {
                clog_warn!("aggregation worker {} unavailable: {}", name, err);
                let mut board = board.write().await;
                board.record(StatusEntry::failed(agg_id, name, &err.to_string()));
            }
        }

        if !context.contains(&self.config.summary_key) {
            context.merge_fragment(&fragment(&self.config.summary_key, fallback));
        }
    }
}
