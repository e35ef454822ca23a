//! Plan elaboration boundary and task grouping.

mod chunker;
mod elaborator;

pub use chunker::TaskChunker;
pub use elaborator::{
    enforce_approval_policy, manual_fallback_task, parse_plan_response, PlanElaborator,
    PlanResponse, PlannedStep, WorkspaceContext, MANUAL_TASK_MARKER,
};
