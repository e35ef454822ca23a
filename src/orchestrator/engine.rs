//! Top-level batch coordinator.
//!
//! Owns the batch lifecycle (pending -> executing -> reviewing ->
//! completed, failed from anywhere), wires the sub-components together,
//! tracks active batches in a registry, and exposes cooperative
//! cancellation. All mutation of a given batch happens from the one
//! driver task running it; the registry holds snapshots for concurrent
//! status reads.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::amendment::AmendmentProcessor;
use crate::confidence::{estimate_success_rate, ConfidenceEstimator, FallbackPlanGenerator};
use crate::config::ConvoyConfig;
use crate::edit::{EditBatch, EditOperationManager};
use crate::error::{ConvoyError, Result};
use crate::executor::{ExecutionContext, ExecutorSet};
use crate::memory::PatternMemory;
use crate::planning::{
    enforce_approval_policy, manual_fallback_task, PlanElaborator, TaskChunker, WorkspaceContext,
};
use crate::review::{ReviewEngine, ReviewPerspective};
use crate::task::{
    AgentTask, BatchStatus, EnhancedStep, StepRecord, StepStatus, TaskBatch, TaskStatus,
};

use super::SignalHandler;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub batches_started: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub batches_cancelled: u64,
    pub tasks_executed: u64,
    pub steps_executed: u64,
    pub steps_awaiting_approval: u64,
}

pub struct Orchestrator {
    config: ConvoyConfig,
    chunker: TaskChunker,
    estimator: ConfidenceEstimator,
    fallback: FallbackPlanGenerator,
    edit_manager: Arc<EditOperationManager>,
    review_engine: ReviewEngine,
    amendments: AmendmentProcessor,
    elaborator: Arc<dyn PlanElaborator>,
    memory: Arc<dyn PatternMemory>,
    executors: Arc<ExecutorSet>,
    workspace: WorkspaceContext,
    registry: DashMap<String, TaskBatch>,
    signals: DashMap<String, SignalHandler>,
    stats: RwLock<OrchestratorStats>,
}

impl Orchestrator {
    pub fn new(
        config: ConvoyConfig,
        elaborator: Arc<dyn PlanElaborator>,
        memory: Arc<dyn PatternMemory>,
        executors: Arc<ExecutorSet>,
        workspace: WorkspaceContext,
    ) -> Self {
        Self {
            chunker: TaskChunker::new(config.orchestrator.max_parallel_tasks),
            estimator: ConfidenceEstimator::new(config.confidence.clone()),
            fallback: FallbackPlanGenerator::new(),
            edit_manager: Arc::new(EditOperationManager::new(config.edits.clone())),
            review_engine: ReviewEngine::new(config.review.clone()),
            amendments: AmendmentProcessor::new(config.amendments.clone()),
            config,
            elaborator,
            memory,
            executors,
            workspace,
            registry: DashMap::new(),
            signals: DashMap::new(),
            stats: RwLock::new(OrchestratorStats::default()),
        }
    }

    pub fn with_review_perspective(mut self, perspective: Arc<dyn ReviewPerspective>) -> Self {
        self.review_engine.add_perspective(perspective);
        self
    }

    pub fn edit_manager(&self) -> &EditOperationManager {
        &self.edit_manager
    }

    pub fn amendment_processor(&self) -> &AmendmentProcessor {
        &self.amendments
    }

    /// Execute a set of tasks as one supervised batch. On a batch-fatal
    /// error the registry retains the failed snapshot (rolled back when
    /// enabled) and the error propagates to the caller.
    pub async fn execute_multi_task(&self, tasks: Vec<AgentTask>) -> Result<TaskBatch> {
        let mut batch = TaskBatch::new(tasks);
        let signal = SignalHandler::new();
        self.signals.insert(batch.id.clone(), signal.clone());
        self.registry.insert(batch.id.clone(), batch.clone());
        self.stats.write().batches_started += 1;
        info!(
            batch_id = %batch.id,
            tasks = batch.tasks.len(),
            "Starting multi-task batch"
        );

        let driven = self.drive(&mut batch, &signal).await;
        self.signals.remove(&batch.id);

        match driven {
            Ok(()) => {
                batch.complete();
                {
                    let mut stats = self.stats.write();
                    stats.batches_completed += 1;
                    stats.tasks_executed += batch.tasks.len() as u64;
                    stats.steps_executed +=
                        batch.results.values().filter(|r| r.attempts > 0).count() as u64;
                }
                self.registry.insert(batch.id.clone(), batch.clone());
                info!(
                    batch_id = %batch.id,
                    review_score = ?batch.review_score,
                    "Batch completed"
                );
                Ok(batch)
            }
            Err(e) => {
                if self.config.orchestrator.enable_rollback {
                    let restored = self.edit_manager.rollback_batch(&batch.id).await;
                    if restored > 0 {
                        info!(
                            batch_id = %batch.id,
                            restored,
                            "Rolled back edits after batch failure"
                        );
                    }
                }

                let cancelled = matches!(e, ConvoyError::Cancelled(_));
                batch.fail(e.to_string());
                batch.recommendations = e.remediation_hints();
                if !cancelled {
                    // Cancellation was already counted by cancel_batch.
                    self.stats.write().batches_failed += 1;
                }
                error!(batch_id = %batch.id, error = %e, "Batch failed");
                self.registry.insert(batch.id.clone(), batch.clone());
                Err(e)
            }
        }
    }

    async fn drive(&self, batch: &mut TaskBatch, signal: &SignalHandler) -> Result<()> {
        batch.transition(BatchStatus::Executing)?;
        self.sync(batch);

        let ctx = ExecutionContext::new(&batch.id, &self.workspace.root);

        // Phase 1: bounded-parallel elaboration and enrichment. Each
        // group is a barrier: the next group starts only when the whole
        // group has finished.
        let tasks = std::mem::take(&mut batch.tasks);
        let mut elaborated_tasks = Vec::with_capacity(tasks.len());
        let mut enhanced_steps: Vec<EnhancedStep> = Vec::new();

        for group in self.chunker.chunk(tasks) {
            self.ensure_not_cancelled(&batch.id, signal)?;
            debug!(
                batch_id = %batch.id,
                group = batch.chunks_executed + 1,
                size = group.len(),
                "Elaborating task group"
            );
            let results = join_all(group.into_iter().map(|task| self.elaborate_task(task))).await;
            batch.chunks_executed += 1;
            for result in results {
                let (task, enhanced) = result?;
                enhanced_steps.extend(enhanced);
                elaborated_tasks.push(task);
            }
            self.sync(batch);
        }

        if !enhanced_steps.is_empty() {
            let avg = enhanced_steps
                .iter()
                .map(|e| e.confidence.score as f64)
                .sum::<f64>()
                / enhanced_steps.len() as f64;
            let memory_ratio = enhanced_steps
                .iter()
                .filter(|e| e.confidence.memory_backed)
                .count() as f64
                / enhanced_steps.len() as f64;
            batch.predicted_success_rate = Some(estimate_success_rate(avg, memory_ratio));
        }

        // Phase 2: park approval-gated steps, execute the rest under the
        // edit concurrency ceiling.
        let auto_approve = self.config.orchestrator.auto_approve;
        let mut parked = 0u64;
        let mut executable = Vec::with_capacity(enhanced_steps.len());
        for enhanced in enhanced_steps {
            if enhanced.step.requires_approval && !auto_approve {
                parked += 1;
                batch.record(StepRecord {
                    task_id: enhanced.step.task_id.clone(),
                    step_id: enhanced.step.id.clone(),
                    success: false,
                    output: "awaiting user approval".into(),
                    attempts: 0,
                    data: serde_json::Value::Null,
                });
            } else {
                executable.push(enhanced);
            }
        }
        self.stats.write().steps_awaiting_approval += parked;

        let edit_batches: Vec<EditBatch> = if executable.is_empty() {
            Vec::new()
        } else {
            self.ensure_not_cancelled(&batch.id, signal)?;
            let outcome = self
                .edit_manager
                .execute_with_multi_edit(
                    &batch.id,
                    executable,
                    Arc::clone(&self.executors),
                    &ctx,
                )
                .await?;
            for record in outcome.records {
                batch.record(record);
            }
            outcome.batches
        };

        for task in &mut elaborated_tasks {
            apply_step_outcomes(task, batch);
        }
        batch.tasks = elaborated_tasks;
        self.sync(batch);

        // Phase 3: review, and amendments when the score falls short.
        if self.config.orchestrator.enable_review && self.review_engine.has_perspectives() {
            self.ensure_not_cancelled(&batch.id, signal)?;
            batch.transition(BatchStatus::Reviewing)?;
            self.sync(batch);

            let reviews = self
                .review_engine
                .perform_multi_review(&batch.tasks, &edit_batches)
                .await?;
            let score = self.review_engine.aggregate_scores(&reviews);
            batch.review_score = Some(score);
            info!(batch_id = %batch.id, score, "Batch review aggregated");

            if score < self.config.review.failure_threshold
                && self.config.orchestrator.enable_amendments
            {
                let mut amendment_batches = self.amendments.generate_amendments(&reviews);
                if !amendment_batches.is_empty() {
                    let applied = self
                        .amendments
                        .apply_atomic_amendments(
                            &mut amendment_batches,
                            &self.edit_manager,
                            &self.executors,
                            &ctx,
                        )
                        .await?;
                    info!(
                        batch_id = %batch.id,
                        applied,
                        generated = amendment_batches.len(),
                        "Applied corrective amendments"
                    );
                }
            }
        }

        Ok(())
    }

    /// Elaborate one task into enriched steps. A malformed plan is
    /// replaced by an approval-gated manual task; other elaboration
    /// errors are batch-fatal.
    async fn elaborate_task(&self, mut task: AgentTask) -> Result<(AgentTask, Vec<EnhancedStep>)> {
        task.status = TaskStatus::InProgress;

        let steps: Vec<_> = match self.elaborator.elaborate(&task, &self.workspace).await {
            Ok(steps) if !steps.is_empty() => {
                steps.into_iter().map(enforce_approval_policy).collect()
            }
            Ok(_) => {
                task = manual_fallback_task(task, "elaboration returned no steps");
                task.steps.clone()
            }
            Err(ConvoyError::PlanFormat(reason)) => {
                task = manual_fallback_task(task, &reason);
                task.steps.clone()
            }
            Err(e) => return Err(e),
        };

        let mut enhanced = Vec::with_capacity(steps.len());
        for step in steps {
            let confidence = self.estimator.estimate(&step, self.memory.as_ref()).await;
            let fallbacks = self.fallback.generate(&step, &confidence);
            enhanced.push(EnhancedStep {
                step,
                confidence,
                fallbacks,
            });
        }
        task.steps = enhanced.iter().map(|e| e.step.clone()).collect();

        Ok((task, enhanced))
    }

    /// Forced transition to failed with rollback, same path a batch-fatal
    /// error takes. Cooperative: an in-flight driver notices at its next
    /// barrier. Returns false for unknown or already-terminal batches.
    pub async fn cancel_batch(&self, id: &str) -> bool {
        {
            let Some(mut entry) = self.registry.get_mut(id) else {
                return false;
            };
            if !entry.is_active() {
                return false;
            }
            entry.fail("cancelled by user");
            entry.recommendations = ConvoyError::Cancelled(id.to_string()).remediation_hints();
        }

        if let Some(signal) = self.signals.get(id) {
            signal.cancel();
        }
        if self.config.orchestrator.enable_rollback {
            self.edit_manager.rollback_batch(id).await;
        }
        self.stats.write().batches_cancelled += 1;
        info!(batch_id = %id, "Batch cancelled");
        true
    }

    pub fn get_batch_status(&self, id: &str) -> Option<BatchStatus> {
        self.registry.get(id).map(|batch| batch.status)
    }

    pub fn get_batch(&self, id: &str) -> Option<TaskBatch> {
        self.registry.get(id).map(|batch| batch.clone())
    }

    pub fn get_active_batches(&self) -> Vec<TaskBatch> {
        self.registry
            .iter()
            .filter(|entry| entry.is_active())
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn get_stats(&self) -> OrchestratorStats {
        self.stats.read().clone()
    }

    /// Drop terminal batches from the registry; returns how many were
    /// removed.
    pub fn clear_finished(&self) -> usize {
        let before = self.registry.len();
        self.registry.retain(|_, batch| batch.is_active());
        before - self.registry.len()
    }

    fn sync(&self, batch: &TaskBatch) {
        self.registry.insert(batch.id.clone(), batch.clone());
    }

    fn ensure_not_cancelled(&self, batch_id: &str, signal: &SignalHandler) -> Result<()> {
        if signal.is_cancelled() {
            return Err(ConvoyError::Cancelled(batch_id.to_string()));
        }
        Ok(())
    }
}

/// Fold the batch results map back into step and task statuses.
fn apply_step_outcomes(task: &mut AgentTask, batch: &TaskBatch) {
    for step in &mut task.steps {
        let key = format!("{}/{}", task.id, step.id);
        if let Some(record) = batch.results.get(&key) {
            step.status = if record.attempts == 0 {
                StepStatus::AwaitingApproval
            } else if record.success {
                StepStatus::Completed
            } else {
                StepStatus::Failed
            };
        }
    }

    task.status = if task
        .steps
        .iter()
        .any(|s| s.status == StepStatus::Failed)
    {
        TaskStatus::Failed
    } else if task
        .steps
        .iter()
        .any(|s| s.status == StepStatus::AwaitingApproval)
    {
        TaskStatus::AwaitingApproval
    } else {
        TaskStatus::Completed
    };
}
