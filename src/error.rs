use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which normalization limit a predicate conversion blew through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplosionKind {
    TermLimit,
    MaxDepth,
}

/// Planner errors.
///
/// Every variant carries structured data rather than preformatted strings so
/// callers can react programmatically, and the whole enum serializes for
/// diagnostic transport. Cost estimation and rewriting never produce errors;
/// invalid inputs are defended at the analyzer and configuration boundaries.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PlannerError {
    /// DNF/CNF conversion exceeded a normalization limit. Recovered locally by
    /// planning against the original predicate.
    #[error("normalization explosion ({kind:?}): reached {reached}, limit {limit}")]
    NormalizationExplosion {
        kind: ExplosionKind,
        limit: usize,
        reached: usize,
    },

    /// The winning plan is too complex to accept.
    #[error("plan complexity {complexity} exceeds threshold {threshold}")]
    PlanComplexityExceeded {
        complexity: usize,
        threshold: usize,
        plan: String,
        suggestions: Vec<String>,
    },

    /// Candidate enumeration hit its cap before any candidate existed.
    #[error("plan enumeration limit {limit} exceeded")]
    PlanEnumerationsExceeded { limit: usize },

    /// Rewrite rule applications hit their cap before any candidate existed.
    #[error("rule application limit {limit} exceeded")]
    RuleApplicationsExceeded { limit: usize },

    /// The wall-clock budget expired before any candidate existed.
    #[error("planning timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    TimeoutExceeded { elapsed_ms: u64, budget_ms: u64 },

    /// A configuration option failed validation.
    #[error("invalid configuration option `{option}`: {reason}")]
    InvalidConfiguration { option: String, reason: String },

    /// The query failed analyzer-boundary validation.
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Bitmap operation on operands of different lengths.
    #[error("bitmap operand length mismatch: {left} vs {right}")]
    BitmapOperandMismatch { left: usize, right: usize },
}

pub type Result<T> = std::result::Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_round_trip_through_serde() {
        let err = PlannerError::NormalizationExplosion {
            kind: ExplosionKind::TermLimit,
            limit: 100,
            reached: 128,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PlannerError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn test_complexity_error_carries_suggestions() {
        let err = PlannerError::PlanComplexityExceeded {
            complexity: 40,
            threshold: 10,
            plan: "Union(8 children, dedup: true)".to_string(),
            suggestions: vec!["raise complexity_threshold".to_string()],
        };
        match err {
            PlannerError::PlanComplexityExceeded { suggestions, .. } => {
                assert!(!suggestions.is_empty());
            }
            _ => panic!("wrong variant"),
        }
    }
}
