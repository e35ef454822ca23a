use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{ConvoyError, Result};

/// Engine-wide configuration, constructed once and injected; components
/// never consult ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub orchestrator: OrchestratorConfig,
    pub confidence: ConfidenceConfig,
    pub edits: EditConfig,
    pub review: ReviewConfig,
    pub amendments: AmendmentConfig,
}

impl ConvoyConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConvoyError::Config(e.to_string()))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.orchestrator.max_parallel_tasks == 0 {
            errors.push("orchestrator.max_parallel_tasks must be greater than 0");
        }
        if self.edits.max_parallel_edits == 0 {
            errors.push("edits.max_parallel_edits must be greater than 0");
        }

        if self.confidence.baseline > 100 {
            errors.push("confidence.baseline must be between 0 and 100");
        }
        if !(0.0..=1.0).contains(&self.confidence.min_relevance) {
            errors.push("confidence.min_relevance must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.confidence.min_success_rate) {
            errors.push("confidence.min_success_rate must be between 0.0 and 1.0");
        }
        if self.confidence.memory_bonus == 0 {
            errors.push("confidence.memory_bonus must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.review.failure_threshold) {
            errors.push("review.failure_threshold must be between 0.0 and 1.0");
        }
        if self.review.weights.values().any(|w| *w <= 0.0) {
            errors.push("review.weights entries must be positive");
        }

        if self.amendments.atomic_batch_size == 0 {
            errors.push("amendments.atomic_batch_size must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.amendments.quality_bar) {
            errors.push("amendments.quality_bar must be between 0.0 and 1.0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConvoyError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Concurrency ceiling for plan elaboration; one chunk of this size
    /// runs at a time.
    pub max_parallel_tasks: usize,
    /// Default retry budget stamped onto elaborated steps.
    pub default_max_retries: u32,
    pub enable_review: bool,
    pub enable_amendments: bool,
    /// Revert all edits recorded under a batch when the batch fails.
    pub enable_rollback: bool,
    /// Execute approval-gated steps without waiting for a human.
    /// Destructive actions still carry their approval flag in results.
    pub auto_approve: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 5,
            default_max_retries: 2,
            enable_review: true,
            enable_amendments: true,
            enable_rollback: true,
            auto_approve: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Starting score before factors are applied.
    pub baseline: u8,
    /// Impact magnitude of the "Complex Action" factor.
    pub complex_penalty: u32,
    /// Impact magnitude of the "Destructive Action" factor.
    pub destructive_penalty: u32,
    /// Impact magnitude of the "Missing Parameters" factor.
    pub missing_params_penalty: u32,
    /// Maximum positive impact of a memory match; scaled by
    /// relevance x success rate.
    pub memory_bonus: u32,
    /// Minimum relevance for a pattern to count as a memory match.
    pub min_relevance: f64,
    /// Minimum historical success rate for a pattern to count.
    pub min_success_rate: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            baseline: 50,
            complex_penalty: 15,
            destructive_penalty: 10,
            missing_params_penalty: 10,
            memory_bonus: 30,
            min_relevance: 0.5,
            min_success_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Concurrency ceiling for edit application, independent of the
    /// elaboration ceiling.
    pub max_parallel_edits: usize,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            max_parallel_edits: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Aggregate scores below this trigger amendments. Consumed by the
    /// orchestrator; the review engine only reports the number.
    pub failure_threshold: f32,
    /// Per-perspective aggregation weights. Empty means plain average.
    pub weights: HashMap<String, f32>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.6,
            weights: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmendmentConfig {
    /// Maximum proposed changes per atomic amendment batch.
    pub atomic_batch_size: usize,
    /// Reviews scoring below this produce amendments.
    pub quality_bar: f32,
    /// Roll back a partially applied amendment batch on failure.
    pub enable_rollback: bool,
}

impl Default for AmendmentConfig {
    fn default() -> Self {
        Self {
            atomic_batch_size: 5,
            quality_bar: 0.7,
            enable_rollback: true,
        }
    }
}
