//! Data model: tasks, steps, actions, and batch lifecycle.

mod action;
mod batch;
mod step;
mod task;

pub use action::{Action, ActionKind};
pub use batch::{BatchStatus, StepRecord, TaskBatch};
pub use step::{AgentStep, EnhancedStep, StepStatus};
pub use task::{AgentTask, TaskStatus};
