//! Read-only boundary to the historical success-pattern store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::task::AgentStep;

/// One historical pattern matched against a step, ranked by relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: String,
    /// How closely the pattern matches the step (0.0 - 1.0).
    pub relevance: f64,
    /// Historical success rate of work matching this pattern (0.0 - 1.0).
    pub success_rate: f64,
}

impl PatternMatch {
    pub fn new(pattern: impl Into<String>, relevance: f64, success_rate: f64) -> Self {
        Self {
            pattern: pattern.into(),
            relevance: relevance.clamp(0.0, 1.0),
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

/// External memory collaborator. Implementations must not mutate anything
/// observable; ranked results come back most relevant first and may be empty.
#[async_trait]
pub trait PatternMemory: Send + Sync {
    async fn query_patterns(&self, step: &AgentStep) -> Result<Vec<PatternMatch>>;
}

/// Memory that never matches; used when no store is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

#[async_trait]
impl PatternMemory for NoMemory {
    async fn query_patterns(&self, _step: &AgentStep) -> Result<Vec<PatternMatch>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_match_clamps_inputs() {
        let m = PatternMatch::new("file edit", 1.7, -0.2);
        assert_eq!(m.relevance, 1.0);
        assert_eq!(m.success_rate, 0.0);
    }
}
