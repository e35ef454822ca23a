//! Confidence-aware multi-task orchestration for AI coding agents.
//!
//! A set of proposed tasks becomes one supervised batch: tasks are
//! elaborated into steps in bounded-parallel groups, every step is
//! risk-scored against historical patterns before execution, risky steps
//! get ordered fallback plans, edits run under an independent concurrency
//! ceiling with per-batch rollback, and executed work is reviewed from
//! multiple perspectives with low scores corrected through atomic
//! amendments.
//!
//! External collaborators (plan elaboration, the pattern-memory store,
//! and per-action executors) are narrow traits injected at construction.

pub mod amendment;
pub mod confidence;
pub mod config;
pub mod edit;
pub mod error;
pub mod executor;
pub mod memory;
pub mod orchestrator;
pub mod planning;
pub mod review;
pub mod task;

pub use amendment::{AmendmentBatch, AmendmentProcessor, AmendmentStats, ProposedChange};
pub use confidence::{
    estimate_success_rate, ConfidenceEstimator, ConfidenceFactor, FallbackPlan,
    FallbackPlanGenerator, RiskLevel, StepConfidence,
};
pub use config::ConvoyConfig;
pub use edit::{EditBatch, EditBatchStatus, EditOperationManager, EditStats};
pub use error::{ConvoyError, Result};
pub use executor::{ActionExecutor, ActionOutcome, ExecutionContext, ExecutorSet};
pub use memory::{NoMemory, PatternMatch, PatternMemory};
pub use orchestrator::{Orchestrator, OrchestratorStats};
pub use planning::{PlanElaborator, TaskChunker, WorkspaceContext, MANUAL_TASK_MARKER};
pub use review::{ReviewBatch, ReviewEngine, ReviewPerspective};
pub use task::{
    Action, ActionKind, AgentStep, AgentTask, BatchStatus, EnhancedStep, StepRecord, StepStatus,
    TaskBatch, TaskStatus,
};
