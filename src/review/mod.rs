//! Multi-perspective review of executed work.
//!
//! Perspectives are read-only and side-effect-free, so they run
//! concurrently with no ordering guarantee. The engine only reports the
//! aggregate score; acting on it is the orchestrator's call.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ReviewConfig;
use crate::edit::EditBatch;
use crate::error::{ConvoyError, Result};
use crate::task::AgentTask;

/// One perspective's verdict over a batch of executed work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewBatch {
    pub perspective: String,
    /// 0.0 - 1.0; higher is better.
    pub score: f32,
    pub feedback: Vec<String>,
}

/// A named review pass (functionality, security, ...). Implementations
/// must not mutate the work under review.
#[async_trait]
pub trait ReviewPerspective: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, tasks: &[AgentTask], edits: &[EditBatch]) -> Result<ReviewBatch>;
}

pub struct ReviewEngine {
    config: ReviewConfig,
    perspectives: Vec<Arc<dyn ReviewPerspective>>,
}

impl ReviewEngine {
    pub fn new(config: ReviewConfig) -> Self {
        Self {
            config,
            perspectives: Vec::new(),
        }
    }

    pub fn with_perspective(mut self, perspective: Arc<dyn ReviewPerspective>) -> Self {
        self.perspectives.push(perspective);
        self
    }

    pub fn add_perspective(&mut self, perspective: Arc<dyn ReviewPerspective>) {
        self.perspectives.push(perspective);
    }

    pub fn has_perspectives(&self) -> bool {
        !self.perspectives.is_empty()
    }

    /// Run every configured perspective concurrently. A perspective that
    /// errors is skipped with a warning; the review only fails when no
    /// perspective produced a verdict.
    pub async fn perform_multi_review(
        &self,
        tasks: &[AgentTask],
        edits: &[EditBatch],
    ) -> Result<Vec<ReviewBatch>> {
        if self.perspectives.is_empty() {
            return Ok(Vec::new());
        }

        let futures = self
            .perspectives
            .iter()
            .map(|perspective| perspective.review(tasks, edits));
        let results = join_all(futures).await;

        let mut reviews = Vec::with_capacity(results.len());
        for (perspective, result) in self.perspectives.iter().zip(results) {
            match result {
                Ok(review) => {
                    debug!(
                        perspective = perspective.name(),
                        score = review.score,
                        "Perspective review complete"
                    );
                    reviews.push(review);
                }
                Err(e) => {
                    warn!(
                        perspective = perspective.name(),
                        error = %e,
                        "Perspective errored; skipping"
                    );
                }
            }
        }

        if reviews.is_empty() {
            return Err(ConvoyError::Review(
                "all review perspectives failed".into(),
            ));
        }
        Ok(reviews)
    }

    /// Weighted aggregate of perspective scores, normalized by the weight
    /// sum; a plain average when no weights are configured. Perspectives
    /// without a configured weight count at 1.0.
    pub fn aggregate_scores(&self, reviews: &[ReviewBatch]) -> f32 {
        if reviews.is_empty() {
            return 1.0;
        }

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        for review in reviews {
            let weight = if self.config.weights.is_empty() {
                1.0
            } else {
                self.config
                    .weights
                    .get(&review.perspective)
                    .copied()
                    .unwrap_or(1.0)
            };
            weighted_sum += review.score * weight;
            weight_sum += weight;
        }

        (weighted_sum / weight_sum).clamp(0.0, 1.0)
    }
}
