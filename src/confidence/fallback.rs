//! Contingency planning for medium- and high-risk steps.
//!
//! Low-risk steps get no fallback overhead. Riskier steps get a short
//! ordered chain tailored to the action, and every high-risk step ends
//! with an escalation to the user. Consumers try fallbacks in sequence
//! only after the primary action and its retries are exhausted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::task::{Action, AgentStep};

use super::{RiskLevel, StepConfidence};

/// Escalating to a human is itself a near-certain fallback.
const ESCALATION_CONFIDENCE: u8 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPlan {
    pub step_id: String,
    /// Human-readable condition under which to try this fallback.
    pub trigger: String,
    pub alternative: Action,
    /// 0-100 confidence in the fallback itself succeeding.
    pub confidence: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPlanGenerator;

impl FallbackPlanGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, step: &AgentStep, confidence: &StepConfidence) -> Vec<FallbackPlan> {
        if confidence.risk.is_low() {
            return Vec::new();
        }

        let mut plans = Vec::new();

        match &step.action {
            Action::ReadFile { path } => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());

                plans.push(FallbackPlan {
                    step_id: step.id.clone(),
                    trigger: "If file not found".into(),
                    alternative: Action::Search {
                        query: file_name.clone(),
                    },
                    confidence: 70,
                    reasoning: format!(
                        "The file may live elsewhere; search the codebase for '{}'",
                        file_name
                    ),
                });

                if is_config_like(path) {
                    plans.push(FallbackPlan {
                        step_id: step.id.clone(),
                        trigger: "If file not found after search".into(),
                        alternative: Action::WriteFile {
                            path: path.clone(),
                            content: String::new(),
                        },
                        confidence: 60,
                        reasoning: "Configuration files can be created with defaults when absent"
                            .into(),
                    });
                }
            }
            Action::WriteFile { path, .. } | Action::EditFile { path, .. } => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        plans.push(FallbackPlan {
                            step_id: step.id.clone(),
                            trigger: "If parent directory is missing".into(),
                            alternative: Action::CreateDirectory {
                                path: parent.to_path_buf(),
                            },
                            confidence: 75,
                            reasoning: format!(
                                "Create '{}' before retrying the write",
                                parent.display()
                            ),
                        });
                    }
                }
            }
            _ => {}
        }

        if confidence.risk == RiskLevel::High {
            plans.push(FallbackPlan {
                step_id: step.id.clone(),
                trigger: "If all attempts fail".into(),
                alternative: Action::Custom {
                    name: "ask_user".into(),
                    params: serde_json::json!({ "step": step.title }),
                },
                confidence: ESCALATION_CONFIDENCE,
                reasoning: "A human can resolve what automation could not".into(),
            });
        }

        plans
    }
}

fn is_config_like(path: &Path) -> bool {
    let config_extensions = ["toml", "json", "yaml", "yml", "ini", "conf", "cfg", "env"];
    let by_extension = path
        .extension()
        .map(|e| config_extensions.iter().any(|c| e.eq_ignore_ascii_case(c)))
        .unwrap_or(false);
    let by_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase().contains("config"))
        .unwrap_or(false);
    by_extension || by_name
}
