pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod report;
pub mod worker;

pub use context::{Fragment, SharedContext, GOAL_KEY};
pub use crate::core::{ExecutionPlan, SubTask, TaskId};
pub use error::{Error, Result};
pub use orchestration::{CompositeResult, Coordinator, CoordinatorConfig};
pub use report::{StatusEntry, StatusLog, TaskState, WorkerStatusTable};
pub use worker::{Worker, WorkerRegistry};
