use serde::{Deserialize, Serialize};

use super::AgentStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    AwaitingApproval,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A unit of user intent, decomposed into ordered steps by plan elaboration.
/// Mutated only by the orchestrator task driving its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub title: String,
    pub description: String,
    /// The originating natural-language request.
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub steps: Vec<AgentStep>,
    pub status: TaskStatus,
}

impl AgentTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            request: String::new(),
            steps: Vec::new(),
            status: TaskStatus::AwaitingApproval,
        }
    }

    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = request.into();
        self
    }
}
