//! Boundary to the external action executors, one per action kind.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConvoyError, Result};
use crate::task::{Action, ActionKind};

/// Ambient information passed to every executor invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub batch_id: String,
    pub working_dir: PathBuf,
}

impl ExecutionContext {
    pub fn new(batch_id: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_id: batch_id.into(),
            working_dir: working_dir.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub files_changed: Vec<PathBuf>,
}

impl ActionOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_files_changed(mut self, files: Vec<PathBuf>) -> Self {
        self.files_changed = files;
        self
    }
}

/// External action executor. A returned `Err` is an infrastructure
/// failure; a domain failure is `Ok` with `success = false`.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action, ctx: &ExecutionContext) -> Result<ActionOutcome>;
}

/// Registry mapping each action kind to its executor.
#[derive(Clone, Default)]
pub struct ExecutorSet {
    executors: HashMap<ActionKind, Arc<dyn ActionExecutor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ActionKind, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(kind, executor);
    }

    pub fn with_executor(mut self, kind: ActionKind, executor: Arc<dyn ActionExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    /// Register one executor for every action kind.
    pub fn with_universal(executor: Arc<dyn ActionExecutor>) -> Self {
        let kinds = [
            ActionKind::ReadFile,
            ActionKind::WriteFile,
            ActionKind::EditFile,
            ActionKind::DeleteFile,
            ActionKind::CreateDirectory,
            ActionKind::RunCommand,
            ActionKind::Search,
            ActionKind::Analyze,
            ActionKind::GenerateCode,
            ActionKind::RunTests,
            ActionKind::Commit,
            ActionKind::Custom,
        ];
        let mut set = Self::new();
        for kind in kinds {
            set.register(kind, Arc::clone(&executor));
        }
        set
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub async fn execute(&self, action: &Action, ctx: &ExecutionContext) -> Result<ActionOutcome> {
        let executor = self
            .get(action.kind())
            .ok_or_else(|| ConvoyError::ExecutorMissing(action.kind().to_string()))?;
        executor.execute(action, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ActionExecutor for Echo {
        async fn execute(&self, action: &Action, _ctx: &ExecutionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::ok(action.kind().to_string()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let set = ExecutorSet::new().with_executor(ActionKind::Search, Arc::new(Echo));
        let ctx = ExecutionContext::new("b-1", ".");

        let outcome = set
            .execute(
                &Action::Search {
                    query: "login".into(),
                },
                &ctx,
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output, "search");
    }

    #[tokio::test]
    async fn test_missing_executor_is_an_error() {
        let set = ExecutorSet::new();
        let ctx = ExecutionContext::new("b-1", ".");

        let err = set
            .execute(
                &Action::RunCommand {
                    command: "cargo check".into(),
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConvoyError::ExecutorMissing(_)));
    }
}
