//! Core domain models for plan execution.
//!
//! This module contains the fundamental data structures consumed by the
//! executor: sub-tasks, execution plans, and the dependency graph with
//! its wave organization.

pub mod graph;
pub mod plan;
pub mod task;

pub use graph::{organize_waves, DependencyGraph, ForcedReason, WaveSet};
pub use plan::{ExecutionPlan, PlanId};
pub use task::{SubTask, TaskId};
