//! Boundary to the external plan-elaboration service.
//!
//! Elaboration turns a task description into a structured step list. The
//! engine never trusts that output blindly: malformed responses are
//! substituted with a single approval-gated manual step, and destructive
//! actions are forced to require approval no matter what the plan claimed.

use std::path::PathBuf;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConvoyError, Result};
use crate::task::{Action, AgentStep, AgentTask, TaskStatus};

/// Title prefix marking a task whose plan had to be replaced by hand.
pub const MANUAL_TASK_MARKER: &str = "[manual]";

/// Workspace information handed to the elaboration service.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    pub root: PathBuf,
    /// Advisory step-count hint forwarded to the service; the engine
    /// never truncates a returned plan against it.
    pub max_steps: Option<u32>,
}

impl WorkspaceContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_steps: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// External elaboration collaborator. Implementations should return
/// [`ConvoyError::PlanFormat`] for malformed service output so the
/// orchestrator can substitute a manual task instead of failing the batch.
#[async_trait]
pub trait PlanElaborator: Send + Sync {
    async fn elaborate(&self, task: &AgentTask, ctx: &WorkspaceContext) -> Result<Vec<AgentStep>>;
}

/// Wire shape of a structured elaboration response.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlanResponse {
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlannedStep {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub action: Action,
    #[serde(default)]
    pub requires_approval: bool,
}

/// Parse a raw service response into steps for `task`, enforcing the
/// approval policy on each one.
pub fn parse_plan_response(
    task: &AgentTask,
    raw: &str,
    default_max_retries: u32,
) -> Result<Vec<AgentStep>> {
    let response: PlanResponse = serde_json::from_str(raw)
        .map_err(|e| ConvoyError::PlanFormat(format!("not a structured plan: {}", e)))?;
    if response.steps.is_empty() {
        return Err(ConvoyError::PlanFormat("plan contained no steps".into()));
    }

    Ok(response
        .steps
        .into_iter()
        .enumerate()
        .map(|(order, planned)| {
            let step = AgentStep::new(&task.id, order as u32, planned.title, planned.action)
                .with_description(planned.description)
                .with_requires_approval(planned.requires_approval)
                .with_max_retries(default_max_retries);
            enforce_approval_policy(step)
        })
        .collect())
}

/// Destructive actions require human approval, overriding upstream input.
pub fn enforce_approval_policy(mut step: AgentStep) -> AgentStep {
    if step.action.is_destructive() && !step.requires_approval {
        warn!(
            step_id = %step.id,
            action = %step.action.kind(),
            "Forcing approval on destructive step"
        );
        step.requires_approval = true;
    }
    step
}

/// Replace a task whose elaboration came back unusable with a single
/// approval-gated manual step.
pub fn manual_fallback_task(mut task: AgentTask, reason: &str) -> AgentTask {
    warn!(task_id = %task.id, reason = %reason, "Substituting manual fallback for task");

    task.title = format!("{} {}", MANUAL_TASK_MARKER, task.title);
    let step = AgentStep::new(
        &task.id,
        0,
        "Manual intervention required",
        Action::Custom {
            name: "manual".into(),
            params: serde_json::json!({
                "reason": reason,
                "request": task.request,
            }),
        },
    )
    .with_description(format!("Plan elaboration failed: {}", reason))
    .with_requires_approval(true);

    task.steps = vec![step.parked_for_approval()];
    task.status = TaskStatus::AwaitingApproval;
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ActionKind, StepStatus};

    fn task() -> AgentTask {
        AgentTask::new("Fix auth", "Fix the login flow").with_request("login is broken")
    }

    #[test]
    fn test_parse_valid_plan() {
        let raw = r#"{
            "steps": [
                {"title": "Read handler", "action": {"type": "read_file", "path": "src/auth.rs"}},
                {"title": "Patch handler", "action": {"type": "edit_file", "path": "src/auth.rs", "find": "old", "replace": "new"}}
            ]
        }"#;

        let steps = parse_plan_response(&task(), raw, 3).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].order, 0);
        assert_eq!(steps[1].order, 1);
        assert_eq!(steps[0].max_retries, 3);
        assert_eq!(steps[0].action.kind(), ActionKind::ReadFile);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_plan_response(&task(), "Sure! Here is the plan:\n1. read", 2).unwrap_err();
        assert!(matches!(err, ConvoyError::PlanFormat(_)));
    }

    #[test]
    fn test_parse_rejects_empty_plan() {
        let err = parse_plan_response(&task(), r#"{"steps": []}"#, 2).unwrap_err();
        assert!(matches!(err, ConvoyError::PlanFormat(_)));
    }

    #[test]
    fn test_dangerous_command_forces_approval() {
        let raw = r#"{
            "steps": [
                {"title": "Clean up", "action": {"type": "run_command", "command": "rm -rf /"}, "requires_approval": false}
            ]
        }"#;

        let steps = parse_plan_response(&task(), raw, 2).unwrap();
        assert!(steps[0].requires_approval);
    }

    #[test]
    fn test_benign_command_keeps_plan_flag() {
        let raw = r#"{
            "steps": [
                {"title": "Run tests", "action": {"type": "run_command", "command": "cargo test"}, "requires_approval": false}
            ]
        }"#;

        let steps = parse_plan_response(&task(), raw, 2).unwrap();
        assert!(!steps[0].requires_approval);
    }

    #[test]
    fn test_manual_fallback_shape() {
        let fallback = manual_fallback_task(task(), "response was prose, not JSON");

        assert!(fallback.title.starts_with(MANUAL_TASK_MARKER));
        assert_eq!(fallback.status, TaskStatus::AwaitingApproval);
        assert_eq!(fallback.steps.len(), 1);

        let step = &fallback.steps[0];
        assert_eq!(step.action.kind(), ActionKind::Custom);
        assert!(step.requires_approval);
        assert_eq!(step.status, StepStatus::AwaitingApproval);

        let json = serde_json::to_value(&step.action).unwrap();
        assert_eq!(json["type"], "custom");
    }
}
