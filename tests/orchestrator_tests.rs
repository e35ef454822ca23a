use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use convoy::executor::{ActionExecutor, ActionOutcome, ExecutionContext, ExecutorSet};
use convoy::planning::{PlanElaborator, WorkspaceContext, MANUAL_TASK_MARKER};
use convoy::review::{ReviewBatch, ReviewPerspective};
use convoy::{
    Action, ActionKind, AgentStep, AgentTask, BatchStatus, ConvoyConfig, ConvoyError, EditBatch,
    NoMemory, Orchestrator, Result, StepStatus, TaskStatus,
};

/// Elaborates every task into a single read-only step.
struct ReadOnlyElaborator;

#[async_trait]
impl PlanElaborator for ReadOnlyElaborator {
    async fn elaborate(&self, task: &AgentTask, _ctx: &WorkspaceContext) -> Result<Vec<AgentStep>> {
        Ok(vec![AgentStep::new(
            &task.id,
            0,
            format!("Read for {}", task.title),
            Action::ReadFile {
                path: PathBuf::from("src/lib.rs"),
            },
        )])
    }
}

/// Always reports malformed service output.
struct MalformedElaborator;

#[async_trait]
impl PlanElaborator for MalformedElaborator {
    async fn elaborate(
        &self,
        _task: &AgentTask,
        _ctx: &WorkspaceContext,
    ) -> Result<Vec<AgentStep>> {
        Err(ConvoyError::PlanFormat(
            "response was prose, not JSON".into(),
        ))
    }
}

/// Succeeds at everything and counts invocations per action kind.
#[derive(Default)]
struct CountingExecutor {
    generate_code: AtomicUsize,
    total: AtomicUsize,
}

#[async_trait]
impl ActionExecutor for CountingExecutor {
    async fn execute(&self, action: &Action, _ctx: &ExecutionContext) -> Result<ActionOutcome> {
        self.total.fetch_add(1, Ordering::SeqCst);
        if action.kind() == ActionKind::GenerateCode {
            self.generate_code.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ActionOutcome::ok("done"))
    }
}

fn orchestrator_with(
    config: ConvoyConfig,
    elaborator: Arc<dyn PlanElaborator>,
    executor: Arc<dyn ActionExecutor>,
) -> Orchestrator {
    Orchestrator::new(
        config,
        elaborator,
        Arc::new(NoMemory),
        Arc::new(ExecutorSet::with_universal(executor)),
        WorkspaceContext::new("."),
    )
}

fn trivial_tasks(count: usize) -> Vec<AgentTask> {
    (0..count)
        .map(|i| AgentTask::new(format!("task-{}", i), "read something"))
        .collect()
}

#[tokio::test]
async fn test_twelve_tasks_run_in_three_sequential_chunks() {
    let mut config = ConvoyConfig::default();
    config.orchestrator.max_parallel_tasks = 5;

    let executor = Arc::new(CountingExecutor::default());
    let orchestrator = orchestrator_with(config, Arc::new(ReadOnlyElaborator), executor.clone());

    let batch = orchestrator
        .execute_multi_task(trivial_tasks(12))
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.chunks_executed, 3);
    assert_eq!(batch.results.len(), 12);
    assert_eq!(executor.total.load(Ordering::SeqCst), 12);
    assert!(batch.ended_at.is_some());
    assert!(batch.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(batch.results.values().all(|r| r.success));

    // Registry retains the completed batch until cleared.
    assert_eq!(
        orchestrator.get_batch_status(&batch.id),
        Some(BatchStatus::Completed)
    );
    assert!(orchestrator.get_active_batches().is_empty());

    let stats = orchestrator.get_stats();
    assert_eq!(stats.batches_started, 1);
    assert_eq!(stats.batches_completed, 1);
    assert_eq!(stats.tasks_executed, 12);
    assert_eq!(stats.steps_executed, 12);
}

#[tokio::test]
async fn test_predicted_success_rate_is_set() {
    let orchestrator = orchestrator_with(
        ConvoyConfig::default(),
        Arc::new(ReadOnlyElaborator),
        Arc::new(CountingExecutor::default()),
    );

    let batch = orchestrator
        .execute_multi_task(trivial_tasks(3))
        .await
        .unwrap();

    // No memory store attached: projection equals the raw baseline average.
    assert_eq!(batch.predicted_success_rate, Some(50.0));
}

#[tokio::test]
async fn test_malformed_plan_becomes_manual_task() {
    let orchestrator = orchestrator_with(
        ConvoyConfig::default(),
        Arc::new(MalformedElaborator),
        Arc::new(CountingExecutor::default()),
    );

    let batch = orchestrator
        .execute_multi_task(trivial_tasks(1))
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.tasks.len(), 1);

    let task = &batch.tasks[0];
    assert!(task.title.starts_with(MANUAL_TASK_MARKER));
    assert_eq!(task.status, TaskStatus::AwaitingApproval);
    assert_eq!(task.steps.len(), 1);

    let step = &task.steps[0];
    assert_eq!(step.action.kind(), ActionKind::Custom);
    assert!(step.requires_approval);
    assert_eq!(step.status, StepStatus::AwaitingApproval);

    // The parked step is reported, not executed.
    let record = batch.results.get(&format!("{}/{}", task.id, step.id)).unwrap();
    assert_eq!(record.attempts, 0);
    assert_eq!(orchestrator.get_stats().steps_awaiting_approval, 1);
}

#[tokio::test]
async fn test_cancel_unknown_batch_returns_false() {
    let orchestrator = orchestrator_with(
        ConvoyConfig::default(),
        Arc::new(ReadOnlyElaborator),
        Arc::new(CountingExecutor::default()),
    );
    assert!(!orchestrator.cancel_batch("no-such-batch").await);
}

/// Blocks inside elaboration until released, so tests can cancel a batch
/// that is genuinely in flight.
struct BlockingElaborator {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl PlanElaborator for BlockingElaborator {
    async fn elaborate(&self, task: &AgentTask, _ctx: &WorkspaceContext) -> Result<Vec<AgentStep>> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(vec![AgentStep::new(
            &task.id,
            0,
            "Read",
            Action::ReadFile {
                path: PathBuf::from("src/lib.rs"),
            },
        )])
    }
}

#[tokio::test]
async fn test_cancel_in_flight_batch() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let elaborator = Arc::new(BlockingElaborator {
        started: started.clone(),
        release: release.clone(),
    });

    let orchestrator = Arc::new(orchestrator_with(
        ConvoyConfig::default(),
        elaborator,
        Arc::new(CountingExecutor::default()),
    ));

    let runner = Arc::clone(&orchestrator);
    let handle =
        tokio::spawn(async move { runner.execute_multi_task(trivial_tasks(1)).await });

    started.notified().await;
    let active = orchestrator.get_active_batches();
    assert_eq!(active.len(), 1);
    let batch_id = active[0].id.clone();

    assert!(orchestrator.cancel_batch(&batch_id).await);
    release.notify_one();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(ConvoyError::Cancelled(_))));
    assert_eq!(
        orchestrator.get_batch_status(&batch_id),
        Some(BatchStatus::Failed)
    );
    assert_eq!(orchestrator.get_stats().batches_cancelled, 1);
    assert_eq!(orchestrator.get_stats().batches_failed, 0);
}

/// Writes files for real; fails every delete.
struct FailingDeleteExecutor;

#[async_trait]
impl ActionExecutor for FailingDeleteExecutor {
    async fn execute(&self, action: &Action, _ctx: &ExecutionContext) -> Result<ActionOutcome> {
        match action {
            Action::WriteFile { path, content } => {
                tokio::fs::write(path, content).await?;
                Ok(ActionOutcome::ok("written"))
            }
            Action::DeleteFile { .. } => Ok(ActionOutcome::failed("permission denied")),
            _ => Ok(ActionOutcome::ok("done")),
        }
    }
}

struct WriteThenDeleteElaborator {
    target: PathBuf,
}

#[async_trait]
impl PlanElaborator for WriteThenDeleteElaborator {
    async fn elaborate(&self, task: &AgentTask, _ctx: &WorkspaceContext) -> Result<Vec<AgentStep>> {
        Ok(vec![
            AgentStep::new(
                &task.id,
                0,
                "Write scratch file",
                Action::WriteFile {
                    path: self.target.clone(),
                    content: "scratch".into(),
                },
            ),
            AgentStep::new(
                &task.id,
                1,
                "Remove old artifact",
                Action::DeleteFile {
                    path: self.target.with_extension("old"),
                },
            )
            .with_max_retries(0),
        ])
    }
}

#[tokio::test]
async fn test_destructive_failure_fails_batch_and_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("scratch.txt");

    let mut config = ConvoyConfig::default();
    // Let the destructive delete run instead of parking it for approval.
    config.orchestrator.auto_approve = true;
    config.edits.max_parallel_edits = 1;

    let orchestrator = orchestrator_with(
        config,
        Arc::new(WriteThenDeleteElaborator {
            target: target.clone(),
        }),
        Arc::new(FailingDeleteExecutor),
    );

    let result = orchestrator.execute_multi_task(trivial_tasks(1)).await;
    assert!(matches!(
        result,
        Err(ConvoyError::DestructiveStepFailed { .. })
    ));

    // The write that succeeded before the failure was reverted.
    assert!(!target.exists());

    let batches = orchestrator.get_active_batches();
    assert!(batches.is_empty());
    let stats = orchestrator.get_stats();
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(orchestrator.edit_manager().stats().batches_rolled_back, 1);
}

/// A perspective that always scores low and suggests two fixes.
struct HarshPerspective;

#[async_trait]
impl ReviewPerspective for HarshPerspective {
    fn name(&self) -> &str {
        "functionality"
    }

    async fn review(&self, _tasks: &[AgentTask], _edits: &[EditBatch]) -> Result<ReviewBatch> {
        Ok(ReviewBatch {
            perspective: "functionality".into(),
            score: 0.3,
            feedback: vec!["add input validation".into(), "missing tests".into()],
        })
    }
}

#[tokio::test]
async fn test_low_review_score_triggers_amendments() {
    let executor = Arc::new(CountingExecutor::default());
    let orchestrator = orchestrator_with(
        ConvoyConfig::default(),
        Arc::new(ReadOnlyElaborator),
        executor.clone(),
    )
    .with_review_perspective(Arc::new(HarshPerspective));

    let batch = orchestrator
        .execute_multi_task(trivial_tasks(2))
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.review_score, Some(0.3));

    // Two feedback items became two corrective generate_code changes.
    assert_eq!(executor.generate_code.load(Ordering::SeqCst), 2);
    let amendment_stats = orchestrator.amendment_processor().stats();
    assert_eq!(amendment_stats.batches_generated, 1);
    assert_eq!(amendment_stats.batches_applied, 1);
    assert_eq!(amendment_stats.batches_failed, 0);
}

#[tokio::test]
async fn test_high_review_score_skips_amendments() {
    struct Satisfied;

    #[async_trait]
    impl ReviewPerspective for Satisfied {
        fn name(&self) -> &str {
            "functionality"
        }

        async fn review(&self, _tasks: &[AgentTask], _edits: &[EditBatch]) -> Result<ReviewBatch> {
            Ok(ReviewBatch {
                perspective: "functionality".into(),
                score: 0.95,
                feedback: Vec::new(),
            })
        }
    }

    let executor = Arc::new(CountingExecutor::default());
    let orchestrator = orchestrator_with(
        ConvoyConfig::default(),
        Arc::new(ReadOnlyElaborator),
        executor.clone(),
    )
    .with_review_perspective(Arc::new(Satisfied));

    let batch = orchestrator
        .execute_multi_task(trivial_tasks(1))
        .await
        .unwrap();

    assert_eq!(batch.review_score, Some(0.95));
    assert_eq!(executor.generate_code.load(Ordering::SeqCst), 0);
    assert_eq!(
        orchestrator.amendment_processor().stats().batches_generated,
        0
    );
}

#[tokio::test]
async fn test_clear_finished_empties_registry() {
    let orchestrator = orchestrator_with(
        ConvoyConfig::default(),
        Arc::new(ReadOnlyElaborator),
        Arc::new(CountingExecutor::default()),
    );

    let batch = orchestrator
        .execute_multi_task(trivial_tasks(2))
        .await
        .unwrap();
    assert!(orchestrator.get_batch(&batch.id).is_some());

    assert_eq!(orchestrator.clear_finished(), 1);
    assert!(orchestrator.get_batch(&batch.id).is_none());
}
