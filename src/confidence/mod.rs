//! Confidence scoring and contingency planning.

mod estimator;
mod fallback;

pub use estimator::{
    estimate_success_rate, ConfidenceEstimator, ConfidenceFactor, RiskLevel, StepConfidence,
};
pub use fallback::{FallbackPlan, FallbackPlanGenerator};
