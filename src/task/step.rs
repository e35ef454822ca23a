//! Atomic steps inside an agent task.
//!
//! Step execution is a small explicit state machine
//! (pending -> in_progress -> {completed | failed | awaiting_approval});
//! a retry produces a fresh step value via [`AgentStep::next_attempt`]
//! instead of mutating a shared counter in place.

use serde::{Deserialize, Serialize};

use crate::confidence::{FallbackPlan, StepConfidence};

use super::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    AwaitingApproval,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub id: String,
    pub task_id: String,
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub action: Action,
    pub status: StepStatus,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,
}

impl AgentStep {
    pub fn new(
        task_id: impl Into<String>,
        order: u32,
        title: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            order,
            title: title.into(),
            description: String::new(),
            action,
            status: StepStatus::Pending,
            requires_approval: false,
            retry_count: 0,
            max_retries: 2,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn started(mut self) -> Self {
        self.status = StepStatus::InProgress;
        self
    }

    pub fn completed(mut self) -> Self {
        self.status = StepStatus::Completed;
        self
    }

    pub fn failed(mut self) -> Self {
        self.status = StepStatus::Failed;
        self
    }

    pub fn parked_for_approval(mut self) -> Self {
        self.status = StepStatus::AwaitingApproval;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.status = StepStatus::Skipped;
        self
    }

    /// A fresh attempt of the same step: counter bumped, status reset.
    pub fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self.status = StepStatus::Pending;
        self
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// A step enriched with its pre-execution risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedStep {
    pub step: AgentStep,
    pub confidence: StepConfidence,
    pub fallbacks: Vec<FallbackPlan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn read_step() -> AgentStep {
        AgentStep::new(
            "t-1",
            0,
            "Read config",
            Action::ReadFile {
                path: PathBuf::from("config.toml"),
            },
        )
    }

    #[test]
    fn test_step_lifecycle() {
        let step = read_step();
        assert_eq!(step.status, StepStatus::Pending);

        let step = step.started();
        assert_eq!(step.status, StepStatus::InProgress);

        let step = step.completed();
        assert!(step.status.is_terminal());
    }

    #[test]
    fn test_next_attempt_is_a_new_value() {
        let step = read_step().with_max_retries(2).started().failed();
        let retry = step.clone().next_attempt();

        assert_eq!(step.retry_count, 0);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.status, StepStatus::Pending);
        assert_eq!(retry.id, step.id);
    }

    #[test]
    fn test_can_retry_bounds() {
        let step = read_step().with_max_retries(1);
        assert!(step.can_retry());

        let step = step.next_attempt();
        assert!(!step.can_retry());
    }
}
