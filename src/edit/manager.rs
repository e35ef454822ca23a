//! Bounded-concurrency edit application with per-batch rollback.
//!
//! Every successfully applied edit records the pre-edit state of its
//! target so the whole batch can be reversed. Rollback runs on paths that
//! are already failing, so a rollback error is logged and counted in
//! stats rather than raised.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::EditConfig;
use crate::error::{ConvoyError, Result};
use crate::executor::{ExecutionContext, ExecutorSet};
use crate::task::{Action, AgentStep, EnhancedStep, StepRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditBatchStatus {
    Pending,
    Applied,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOperation {
    pub step_id: String,
    pub action: Action,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditBatch {
    pub id: String,
    /// Task or amendment group the edits belong to.
    pub group_id: String,
    pub affected_paths: Vec<PathBuf>,
    pub operations: Vec<EditOperation>,
    pub status: EditBatchStatus,
}

/// Pre-edit state of a target path.
#[derive(Debug, Clone)]
enum PriorState {
    Missing,
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct AppliedEdit {
    step_id: String,
    path: PathBuf,
    prior: PriorState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditStats {
    pub edits_applied: u64,
    pub edit_failures: u64,
    pub batches_applied: u64,
    pub batches_rolled_back: u64,
    pub rollback_failures: u64,
}

/// Everything one multi-edit pass produced: the per-task edit batches and
/// the raw per-step records for the batch results map.
#[derive(Debug)]
pub struct MultiEditOutcome {
    pub batches: Vec<EditBatch>,
    pub records: Vec<StepRecord>,
}

struct StepExecution {
    task_id: String,
    step_id: String,
    action: Action,
    destructive: bool,
    record: StepRecord,
}

pub struct EditOperationManager {
    semaphore: Arc<Semaphore>,
    history: Arc<RwLock<HashMap<String, Vec<AppliedEdit>>>>,
    stats: Arc<RwLock<EditStats>>,
}

impl EditOperationManager {
    pub fn new(config: EditConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_parallel_edits.max(1))),
            history: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(EditStats::default())),
        }
    }

    /// Execute the actions of all elaborated steps under the edit
    /// concurrency ceiling, recording applied edits under `batch_id` for
    /// rollback. A destructive step that fails permanently aborts with an
    /// error once its siblings have finished.
    pub async fn execute_with_multi_edit(
        &self,
        batch_id: &str,
        steps: Vec<EnhancedStep>,
        executors: Arc<ExecutorSet>,
        ctx: &ExecutionContext,
    ) -> Result<MultiEditOutcome> {
        let identities: Vec<(String, String)> = steps
            .iter()
            .map(|e| (e.step.task_id.clone(), e.step.id.clone()))
            .collect();

        let handles: Vec<_> = steps
            .into_iter()
            .map(|enhanced| {
                let semaphore = Arc::clone(&self.semaphore);
                let history = Arc::clone(&self.history);
                let executors = Arc::clone(&executors);
                let ctx = ctx.clone();
                let batch_id = batch_id.to_string();

                tokio::spawn(async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return failed_execution(enhanced.step, "edit semaphore closed");
                        }
                    };
                    run_step(&batch_id, enhanced.step, &executors, &ctx, &history).await
                })
            })
            .collect();

        let joined = join_all(handles).await;
        let executions: Vec<StepExecution> = joined
            .into_iter()
            .zip(identities)
            .map(|(result, (task_id, step_id))| match result {
                Ok(execution) => execution,
                Err(e) => {
                    error!(step_id = %step_id, error = %e, "Step panicked during execution");
                    StepExecution {
                        task_id: task_id.clone(),
                        step_id: step_id.clone(),
                        action: Action::Custom {
                            name: "panicked".into(),
                            params: serde_json::Value::Null,
                        },
                        destructive: false,
                        record: StepRecord {
                            task_id,
                            step_id,
                            success: false,
                            output: format!("step panicked: {}", e),
                            attempts: 1,
                            data: serde_json::Value::Null,
                        },
                    }
                }
            })
            .collect();

        let mut per_task: HashMap<String, Vec<EditOperation>> = HashMap::new();
        for execution in &executions {
            if execution.action.is_edit() {
                per_task
                    .entry(execution.task_id.clone())
                    .or_default()
                    .push(EditOperation {
                        step_id: execution.step_id.clone(),
                        action: execution.action.clone(),
                        success: execution.record.success,
                    });
            }
        }

        let batches: Vec<EditBatch> = per_task
            .into_iter()
            .map(|(task_id, operations)| build_edit_batch(task_id, operations))
            .collect();

        {
            let mut stats = self.stats.write();
            for batch in &batches {
                for op in &batch.operations {
                    if op.success {
                        stats.edits_applied += 1;
                    } else {
                        stats.edit_failures += 1;
                    }
                }
                if batch.status == EditBatchStatus::Applied {
                    stats.batches_applied += 1;
                }
            }
        }

        if let Some(failed) = executions
            .iter()
            .find(|e| e.destructive && !e.record.success)
        {
            return Err(ConvoyError::DestructiveStepFailed {
                step_id: failed.step_id.clone(),
                message: failed.record.output.clone(),
            });
        }

        Ok(MultiEditOutcome {
            batches,
            records: executions.into_iter().map(|e| e.record).collect(),
        })
    }

    /// Apply a small group of corrective actions sequentially under
    /// `group_id`. Stops at the first failure; the returned batch carries
    /// `Failed` status so the caller can roll the group back.
    pub async fn apply_actions(
        &self,
        group_id: &str,
        changes: &[(String, Action)],
        executors: &ExecutorSet,
        ctx: &ExecutionContext,
    ) -> Result<EditBatch> {
        let mut operations = Vec::with_capacity(changes.len());
        let mut all_ok = true;

        for (change_id, action) in changes {
            let prior = if action.is_edit() {
                capture_prior(action.target_path()).await
            } else {
                None
            };

            let success = match executors.execute(action, ctx).await {
                Ok(outcome) if outcome.success => true,
                Ok(outcome) => {
                    warn!(
                        change_id = %change_id,
                        output = %outcome.output,
                        "Amendment change failed"
                    );
                    false
                }
                Err(e) => {
                    warn!(change_id = %change_id, error = %e, "Amendment change errored");
                    false
                }
            };

            if success {
                if let Some((path, prior)) = prior {
                    self.history
                        .write()
                        .entry(group_id.to_string())
                        .or_default()
                        .push(AppliedEdit {
                            step_id: change_id.clone(),
                            path,
                            prior,
                        });
                }
                if action.is_edit() {
                    self.stats.write().edits_applied += 1;
                }
            }

            operations.push(EditOperation {
                step_id: change_id.clone(),
                action: action.clone(),
                success,
            });

            if !success {
                all_ok = false;
                self.stats.write().edit_failures += 1;
                break;
            }
        }

        let mut batch = build_edit_batch(group_id.to_string(), operations);
        if !all_ok {
            batch.status = EditBatchStatus::Failed;
        } else {
            self.stats.write().batches_applied += 1;
        }
        Ok(batch)
    }

    /// Restore pre-edit state for everything recorded under `batch_id`,
    /// newest edit first. Failures are counted, not raised. Returns how
    /// many edits were restored.
    pub async fn rollback_batch(&self, batch_id: &str) -> usize {
        let edits = self.history.write().remove(batch_id).unwrap_or_default();
        if edits.is_empty() {
            return 0;
        }

        let total = edits.len();
        let mut restored = 0;
        for edit in edits.into_iter().rev() {
            match restore(&edit).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    error!(
                        batch_id = %batch_id,
                        step_id = %edit.step_id,
                        path = %edit.path.display(),
                        error = %e,
                        "Rollback failed for edit"
                    );
                    self.stats.write().rollback_failures += 1;
                }
            }
        }

        self.stats.write().batches_rolled_back += 1;
        debug!(batch_id = %batch_id, restored, total, "Batch rolled back");
        restored
    }

    pub fn has_recorded_edits(&self, batch_id: &str) -> bool {
        self.history
            .read()
            .get(batch_id)
            .is_some_and(|edits| !edits.is_empty())
    }

    pub fn stats(&self) -> EditStats {
        self.stats.read().clone()
    }
}

fn build_edit_batch(group_id: String, operations: Vec<EditOperation>) -> EditBatch {
    let mut affected_paths: Vec<PathBuf> = operations
        .iter()
        .filter_map(|op| op.action.target_path().map(Path::to_path_buf))
        .collect();
    affected_paths.sort();
    affected_paths.dedup();

    let status = if operations.iter().all(|op| op.success) {
        EditBatchStatus::Applied
    } else {
        EditBatchStatus::Failed
    };

    EditBatch {
        id: uuid::Uuid::new_v4().to_string(),
        group_id,
        affected_paths,
        operations,
        status,
    }
}

async fn run_step(
    batch_id: &str,
    step: AgentStep,
    executors: &ExecutorSet,
    ctx: &ExecutionContext,
    history: &RwLock<HashMap<String, Vec<AppliedEdit>>>,
) -> StepExecution {
    let destructive = step.action.is_destructive();
    let is_edit = step.action.is_edit();
    let prior = if is_edit {
        capture_prior(step.action.target_path()).await
    } else {
        None
    };

    let mut attempt = step;
    loop {
        attempt = attempt.started();
        let failure = match executors.execute(&attempt.action, ctx).await {
            Ok(outcome) if outcome.success => {
                if is_edit {
                    if let Some((path, prior)) = prior {
                        history
                            .write()
                            .entry(batch_id.to_string())
                            .or_default()
                            .push(AppliedEdit {
                                step_id: attempt.id.clone(),
                                path,
                                prior,
                            });
                    }
                }
                let attempt = attempt.completed();
                return StepExecution {
                    task_id: attempt.task_id.clone(),
                    step_id: attempt.id.clone(),
                    destructive,
                    record: StepRecord {
                        task_id: attempt.task_id.clone(),
                        step_id: attempt.id.clone(),
                        success: true,
                        output: outcome.output,
                        attempts: attempt.retry_count + 1,
                        data: outcome.data,
                    },
                    action: attempt.action,
                };
            }
            Ok(outcome) => outcome.output,
            Err(e) => e.to_string(),
        };

        if attempt.can_retry() {
            debug!(
                step_id = %attempt.id,
                attempt = attempt.retry_count + 1,
                error = %failure,
                "Step failed; retrying"
            );
            attempt = attempt.next_attempt();
        } else {
            warn!(
                step_id = %attempt.id,
                attempts = attempt.retry_count + 1,
                error = %failure,
                "Step failed permanently"
            );
            let attempts = attempt.retry_count + 1;
            let attempt = attempt.failed();
            return StepExecution {
                task_id: attempt.task_id.clone(),
                step_id: attempt.id.clone(),
                destructive,
                record: StepRecord {
                    task_id: attempt.task_id.clone(),
                    step_id: attempt.id.clone(),
                    success: false,
                    output: failure,
                    attempts,
                    data: serde_json::Value::Null,
                },
                action: attempt.action,
            };
        }
    }
}

fn failed_execution(step: AgentStep, message: &str) -> StepExecution {
    StepExecution {
        task_id: step.task_id.clone(),
        step_id: step.id.clone(),
        destructive: step.action.is_destructive(),
        record: StepRecord {
            task_id: step.task_id.clone(),
            step_id: step.id.clone(),
            success: false,
            output: message.to_string(),
            attempts: 1,
            data: serde_json::Value::Null,
        },
        action: step.action,
    }
}

async fn capture_prior(path: Option<&Path>) -> Option<(PathBuf, PriorState)> {
    let path = path?;
    let state = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => PriorState::Directory,
        Ok(_) => match tokio::fs::read(path).await {
            Ok(content) => PriorState::File(content),
            Err(_) => PriorState::Missing,
        },
        Err(_) => PriorState::Missing,
    };
    Some((path.to_path_buf(), state))
}

async fn restore(edit: &AppliedEdit) -> std::io::Result<()> {
    match &edit.prior {
        PriorState::File(content) => tokio::fs::write(&edit.path, content).await,
        // The directory existed before the edit; nothing to undo.
        PriorState::Directory => Ok(()),
        PriorState::Missing => match tokio::fs::metadata(&edit.path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&edit.path).await,
            Ok(_) => tokio::fs::remove_file(&edit.path).await,
            Err(_) => Ok(()),
        },
    }
}
