use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Invalid batch transition: {from} -> {to}")]
    InvalidBatchTransition { from: String, to: String },

    #[error("Plan elaboration returned malformed output: {0}")]
    PlanFormat(String),

    #[error("Plan elaboration failed: {0}")]
    Elaboration(String),

    #[error("No executor registered for action: {0}")]
    ExecutorMissing(String),

    #[error("Step {step_id} failed: {message}")]
    StepExecution { step_id: String, message: String },

    #[error("Max retries exceeded for step: {0}")]
    MaxRetriesExceeded(String),

    #[error("Destructive step {step_id} failed, aborting batch: {message}")]
    DestructiveStepFailed { step_id: String, message: String },

    #[error("Review failed: {0}")]
    Review(String),

    #[error("Amendment application failed: {0}")]
    Amendment(String),

    #[error("Batch cancelled by user: {0}")]
    Cancelled(String),

    #[error("Memory query failed: {0}")]
    Memory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl ConvoyError {
    /// Short remediation hints surfaced alongside a failed batch.
    pub fn remediation_hints(&self) -> Vec<String> {
        match self {
            Self::PlanFormat(_) | Self::Elaboration(_) => vec![
                "Re-run the batch; elaboration output may be transiently malformed".into(),
                "Review the originating request for ambiguous phrasing".into(),
            ],
            Self::ExecutorMissing(kind) => {
                vec![format!("Register an executor for '{}' before resubmitting", kind)]
            }
            Self::DestructiveStepFailed { .. } => vec![
                "Inspect the working tree before retrying; edits were rolled back".into(),
                "Consider splitting the destructive step into a reviewed manual change".into(),
            ],
            Self::Cancelled(_) => vec!["Resubmit the batch to retry the cancelled work".into()],
            Self::Review(_) => {
                vec!["Review perspectives all failed; check their upstream services".into()]
            }
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvoyError>;
