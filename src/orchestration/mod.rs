//! Orchestration layer for plan execution.
//!
//! This module provides the components that turn an organized plan into
//! results: the dispatcher that executes one task behind the
//! data-visibility boundary, the wave runner that executes a wave
//! concurrently under a deadline, and the coordinator that sequences
//! waves and assembles the composite result.

mod coordinator;
mod dispatch;
mod runner;

pub use coordinator::{
    CompositeResult, Coordinator, CoordinatorConfig, PhaseHistoryEntry, RunPhase, RunState,
};
pub use dispatch::Dispatcher;
pub use runner::{RunnerEvent, TaskOutcome, TaskResult, WaveRunner};
