//! Pre-execution confidence scoring for individual steps.
//!
//! Scoring starts from a configured baseline and applies additive factors:
//! a memory match from historical patterns pushes the score up, while
//! complexity, destructiveness, and missing parameters pull it down. The
//! result is deterministic for a given memory snapshot and has no side
//! effects.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfidenceConfig;
use crate::memory::PatternMemory;
use crate::task::AgentStep;

/// Ceiling on the predicted batch success rate; history never promises
/// more than this.
const MAX_PREDICTED_RATE: f64 = 95.0;

/// Boost applied at full memory coverage when projecting batch success.
const MEMORY_SUCCESS_BONUS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Pure function of the score: low at 70+, high below 40.
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::Low
        } else if score >= 40 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn is_low(&self) -> bool {
        matches!(self, Self::Low)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One named contribution to a step's score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceFactor {
    pub name: String,
    pub description: String,
    /// Signed contribution to the score.
    pub impact: i32,
}

impl ConfidenceFactor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, impact: i32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            impact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfidence {
    /// 0-100 inclusive; baseline plus factor impacts, clamped.
    pub score: u8,
    pub risk: RiskLevel,
    pub memory_backed: bool,
    pub factors: Vec<ConfidenceFactor>,
}

impl StepConfidence {
    pub fn from_factors(baseline: u8, factors: Vec<ConfidenceFactor>, memory_backed: bool) -> Self {
        let raw: i32 = baseline as i32 + factors.iter().map(|f| f.impact).sum::<i32>();
        let score = raw.clamp(0, 100) as u8;
        Self {
            score,
            risk: RiskLevel::from_score(score),
            memory_backed,
            factors,
        }
    }
}

pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
}

impl ConfidenceEstimator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Score a step against the historical pattern store. A memory failure
    /// degrades to the no-memory baseline rather than raising.
    pub async fn estimate(&self, step: &AgentStep, memory: &dyn PatternMemory) -> StepConfidence {
        let mut factors = Vec::new();
        let mut memory_backed = false;

        match memory.query_patterns(step).await {
            Ok(matches) => {
                if let Some(best) = matches.first() {
                    if best.relevance >= self.config.min_relevance
                        && best.success_rate >= self.config.min_success_rate
                    {
                        let impact = (best.relevance
                            * best.success_rate
                            * self.config.memory_bonus as f64)
                            .round() as i32;
                        if impact > 0 {
                            factors.push(ConfidenceFactor::new(
                                "Memory Match",
                                format!(
                                    "similar work '{}' succeeded {:.0}% of the time",
                                    best.pattern,
                                    best.success_rate * 100.0
                                ),
                                impact,
                            ));
                            memory_backed = true;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(step_id = %step.id, error = %e, "Memory lookup failed; scoring without history");
            }
        }

        if step.action.is_complex() {
            factors.push(ConfidenceFactor::new(
                "Complex Action",
                format!("'{}' outcomes are hard to predict", step.action.kind()),
                -(self.config.complex_penalty as i32),
            ));
        }

        if step.action.is_destructive() {
            factors.push(ConfidenceFactor::new(
                "Destructive Action",
                "changes are not trivially reversible",
                -(self.config.destructive_penalty as i32),
            ));
        }

        if step.action.has_missing_params() {
            factors.push(ConfidenceFactor::new(
                "Missing Parameters",
                "action is missing required parameters",
                -(self.config.missing_params_penalty as i32),
            ));
        }

        let confidence = StepConfidence::from_factors(self.config.baseline, factors, memory_backed);
        debug!(
            step_id = %step.id,
            score = confidence.score,
            risk = %confidence.risk,
            memory_backed = confidence.memory_backed,
            "Step confidence estimated"
        );
        confidence
    }
}

/// Project a batch success rate from the average step confidence and the
/// fraction of steps backed by memory. Monotone in the memory ratio, equal
/// to the average at ratio zero, and never above 95.
pub fn estimate_success_rate(avg_confidence: f64, memory_ratio: f64) -> f64 {
    let base = avg_confidence.clamp(0.0, MAX_PREDICTED_RATE);
    let ratio = memory_ratio.clamp(0.0, 1.0);
    (base + ratio * MEMORY_SUCCESS_BONUS).min(MAX_PREDICTED_RATE)
}
