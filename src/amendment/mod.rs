//! Corrective amendments generated from low-scoring reviews.
//!
//! A large correction is split into several independently-appliable
//! groups, each capped at the configured atomic size. Applying a group is
//! all-or-nothing through the edit manager: a failure rolls the group
//! back and marks it unapplied; partial application is never observable.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AmendmentConfig;
use crate::edit::{EditBatchStatus, EditOperationManager};
use crate::error::Result;
use crate::executor::{ExecutionContext, ExecutorSet};
use crate::review::ReviewBatch;
use crate::task::Action;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub id: String,
    pub description: String,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmendmentBatch {
    pub id: String,
    /// The review perspective this batch corrects.
    pub category: String,
    pub changes: Vec<ProposedChange>,
    pub applied: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmendmentStats {
    pub batches_generated: u64,
    pub changes_generated: u64,
    pub batches_applied: u64,
    pub batches_failed: u64,
}

pub struct AmendmentProcessor {
    config: AmendmentConfig,
    stats: RwLock<AmendmentStats>,
}

impl AmendmentProcessor {
    pub fn new(config: AmendmentConfig) -> Self {
        Self {
            config,
            stats: RwLock::new(AmendmentStats::default()),
        }
    }

    /// Turn reviews scoring below the quality bar into corrective change
    /// batches, each capped at the configured atomic size.
    pub fn generate_amendments(&self, reviews: &[ReviewBatch]) -> Vec<AmendmentBatch> {
        let mut batches = Vec::new();

        for review in reviews {
            if review.score >= self.config.quality_bar {
                continue;
            }

            let changes: Vec<ProposedChange> = review
                .feedback
                .iter()
                .map(|feedback| ProposedChange {
                    id: uuid::Uuid::new_v4().to_string(),
                    description: feedback.clone(),
                    action: Action::GenerateCode {
                        prompt: format!(
                            "Address {} review feedback: {}",
                            review.perspective, feedback
                        ),
                        target: None,
                    },
                })
                .collect();

            for group in changes.chunks(self.config.atomic_batch_size.max(1)) {
                batches.push(AmendmentBatch {
                    id: uuid::Uuid::new_v4().to_string(),
                    category: review.perspective.clone(),
                    changes: group.to_vec(),
                    applied: false,
                });
            }
        }

        let mut stats = self.stats.write();
        stats.batches_generated += batches.len() as u64;
        stats.changes_generated += batches.iter().map(|b| b.changes.len() as u64).sum::<u64>();
        debug!(
            batches = batches.len(),
            "Generated amendment batches from low-scoring reviews"
        );

        batches
    }

    /// Apply batches in order, each all-or-nothing. Returns how many
    /// batches were applied; failed batches are rolled back (when
    /// enabled) and left unapplied.
    pub async fn apply_atomic_amendments(
        &self,
        batches: &mut [AmendmentBatch],
        edit_manager: &EditOperationManager,
        executors: &ExecutorSet,
        ctx: &ExecutionContext,
    ) -> Result<usize> {
        let mut applied = 0;

        for batch in batches.iter_mut() {
            let changes: Vec<(String, Action)> = batch
                .changes
                .iter()
                .map(|change| (change.id.clone(), change.action.clone()))
                .collect();

            let edit_batch = edit_manager
                .apply_actions(&batch.id, &changes, executors, ctx)
                .await?;

            if edit_batch.status == EditBatchStatus::Applied {
                batch.applied = true;
                applied += 1;
                self.stats.write().batches_applied += 1;
            } else {
                if self.config.enable_rollback {
                    let restored = edit_manager.rollback_batch(&batch.id).await;
                    debug!(
                        amendment_id = %batch.id,
                        restored,
                        "Rolled back partially applied amendment batch"
                    );
                }
                batch.applied = false;
                self.stats.write().batches_failed += 1;
                warn!(
                    amendment_id = %batch.id,
                    category = %batch.category,
                    "Amendment batch failed; left unapplied"
                );
            }
        }

        info!(
            applied,
            total = batches.len(),
            "Atomic amendment application finished"
        );
        Ok(applied)
    }

    pub fn stats(&self) -> AmendmentStats {
        self.stats.read().clone()
    }

    pub fn clear(&self) {
        *self.stats.write() = AmendmentStats::default();
    }
}
