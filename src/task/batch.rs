//! Batch lifecycle for a set of tasks executed together.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConvoyError, Result};

use super::AgentTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Executing,
    Reviewing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status only moves forward; `Failed` is reachable from any
    /// non-terminal state and nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Failed) => true,
            (Self::Pending, Self::Executing) => true,
            (Self::Executing, Self::Reviewing) => true,
            (Self::Executing, Self::Completed) => true,
            (Self::Reviewing, Self::Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Raw execution result for one step, keyed in the batch results map
/// by `task_id/step_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub task_id: String,
    pub step_id: String,
    pub success: bool,
    pub output: String,
    pub attempts: u32,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl StepRecord {
    pub fn key(&self) -> String {
        format!("{}/{}", self.task_id, self.step_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBatch {
    pub id: String,
    pub tasks: Vec<AgentTask>,
    pub status: BatchStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: HashMap<String, StepRecord>,
    pub review_score: Option<f32>,
    pub error: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Number of sequential elaboration groups driven for this batch.
    #[serde(default)]
    pub chunks_executed: usize,
    /// Pre-execution success projection over the batch's step confidences.
    pub predicted_success_rate: Option<f64>,
}

impl TaskBatch {
    pub fn new(tasks: Vec<AgentTask>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tasks,
            status: BatchStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            results: HashMap::new(),
            review_score: None,
            error: None,
            recommendations: Vec::new(),
            chunks_executed: 0,
            predicted_success_rate: None,
        }
    }

    pub fn transition(&mut self, next: BatchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ConvoyError::InvalidBatchTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn complete(&mut self) {
        self.status = BatchStatus::Completed;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = BatchStatus::Failed;
        }
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn record(&mut self, record: StepRecord) {
        self.results.insert(record.key(), record);
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only_transitions() {
        let mut batch = TaskBatch::new(Vec::new());
        assert_eq!(batch.status, BatchStatus::Pending);

        batch.transition(BatchStatus::Executing).unwrap();
        batch.transition(BatchStatus::Reviewing).unwrap();
        batch.transition(BatchStatus::Completed).unwrap();

        // Terminal states are sticky.
        assert!(batch.transition(BatchStatus::Executing).is_err());
        assert!(batch.transition(BatchStatus::Failed).is_err());
    }

    #[test]
    fn test_executing_may_skip_review() {
        let mut batch = TaskBatch::new(Vec::new());
        batch.transition(BatchStatus::Executing).unwrap();
        batch.transition(BatchStatus::Completed).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
    }

    #[test]
    fn test_no_regression() {
        let mut batch = TaskBatch::new(Vec::new());
        batch.transition(BatchStatus::Executing).unwrap();
        assert!(batch.transition(BatchStatus::Pending).is_err());
        batch.transition(BatchStatus::Reviewing).unwrap();
        assert!(batch.transition(BatchStatus::Executing).is_err());
    }

    #[test]
    fn test_failed_from_any_active_state() {
        let mut batch = TaskBatch::new(Vec::new());
        batch.transition(BatchStatus::Executing).unwrap();
        batch.fail("executor crashed");
        assert_eq!(batch.status, BatchStatus::Failed);
        assert!(batch.ended_at.is_some());
        assert_eq!(batch.error.as_deref(), Some("executor crashed"));
    }

    #[test]
    fn test_record_keying() {
        let mut batch = TaskBatch::new(Vec::new());
        batch.record(StepRecord {
            task_id: "t-1".into(),
            step_id: "s-1".into(),
            success: true,
            output: "ok".into(),
            attempts: 1,
            data: serde_json::Value::Null,
        });
        assert!(batch.results.contains_key("t-1/s-1"));
    }
}
