// Plan Selection
//
// Applies planner hints, rewrites the surviving candidates, orders them by
// total cost with deterministic tie-breaks, and validates the winner against
// the complexity threshold. Hint filters that would empty the candidate set
// fall back to the unconstrained set: the selector only fails when there are
// zero candidates at all or the winner is too complex.

use crate::config::{PlannerConfig, PlanningBudget};
use crate::cost::estimator::CostEstimator;
use crate::enumerator::CandidatePlan;
use crate::error::{PlannerError, Result};
use crate::analyzer::QueryAnalysis;
use crate::plan::PlanOperator;
use crate::rewriter::Rewriter;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Caller-supplied planning hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerHints {
    /// Keep only table-scan plans.
    pub force_table_scan: bool,
    /// Prefer candidates driving this index; fall back to all when none do.
    pub preferred_index: Option<String>,
    /// Prune candidates whose total cost exceeds this bound.
    pub max_index_cost: Option<f64>,
}

impl PlannerHints {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse `key=value` hint strings: `force_table_scan=true`,
    /// `preferred_index=idx_status`, `max_index_cost=1000`.
    pub fn parse(entries: &[&str]) -> Result<Self> {
        let mut hints = Self::default();
        for entry in entries {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                PlannerError::InvalidConfiguration {
                    option: entry.to_string(),
                    reason: "hints use key=value form".to_string(),
                }
            })?;
            match key.trim() {
                "force_table_scan" => {
                    hints.force_table_scan =
                        value.trim().parse().map_err(|_| PlannerError::InvalidConfiguration {
                            option: key.to_string(),
                            reason: "expected true or false".to_string(),
                        })?;
                }
                "preferred_index" => hints.preferred_index = Some(value.trim().to_string()),
                "max_index_cost" => {
                    hints.max_index_cost =
                        Some(value.trim().parse().map_err(|_| {
                            PlannerError::InvalidConfiguration {
                                option: key.to_string(),
                                reason: "expected a number".to_string(),
                            }
                        })?);
                }
                other => {
                    return Err(PlannerError::InvalidConfiguration {
                        option: other.to_string(),
                        reason: "unrecognized hint".to_string(),
                    });
                }
            }
        }
        Ok(hints)
    }
}

/// Outcome of selection, with the rewrite count for diagnostics.
#[derive(Debug, Clone)]
pub struct Selection {
    pub winner: CandidatePlan,
    pub rules_applied: usize,
    pub candidates_considered: usize,
}

/// The plan selector.
pub struct PlanSelector<'a> {
    config: &'a PlannerConfig,
    estimator: &'a CostEstimator<'a>,
    rewriter: Rewriter,
}

impl<'a> PlanSelector<'a> {
    pub fn new(config: &'a PlannerConfig, estimator: &'a CostEstimator<'a>) -> Self {
        Self {
            config,
            estimator,
            rewriter: Rewriter::standard(),
        }
    }

    /// Select the winning plan from the candidate set.
    pub fn select(
        &self,
        candidates: Vec<CandidatePlan>,
        analysis: &QueryAnalysis,
        hints: &PlannerHints,
        budget: &mut PlanningBudget,
    ) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(match budget.breached() {
                Some(breach) => budget.breach_error(breach),
                None => PlannerError::InvalidQuery {
                    reason: "no candidate plans".to_string(),
                },
            });
        }

        let candidates = Self::apply_hints(candidates, hints);
        let candidates_considered = candidates.len();

        // Rewrite each surviving candidate and re-estimate its cost.
        let mut rules_applied = 0;
        let mut rewritten: Vec<CandidatePlan> = Vec::with_capacity(candidates.len());
        let mut pending = candidates.into_iter();
        while let Some(candidate) = pending.next() {
            let (root, applications) = self.rewriter.rewrite(candidate.root, budget);
            rules_applied += applications;
            let cost = self.estimator.estimate(&root, analysis);
            rewritten.push(CandidatePlan {
                total_cost: self.estimator.model().total_cost(&cost),
                complexity: root.complexity(),
                enumeration_index: candidate.enumeration_index,
                root,
                cost,
            });
            if budget.breached().is_some() {
                // Best-so-far: stop rewriting and keep the remaining
                // candidates as enumerated.
                rewritten.extend(pending);
                break;
            }
        }

        let winner = if self.config.enable_cost_based_optimization {
            rewritten
                .into_iter()
                .min_by(Self::candidate_order)
                .expect("non-empty candidate set")
        } else {
            // Cost-based selection disabled: the first valid plan wins.
            rewritten
                .into_iter()
                .min_by_key(|c| c.enumeration_index)
                .expect("non-empty candidate set")
        };

        self.validate_complexity(&winner)?;
        debug!(
            total_cost = winner.total_cost,
            complexity = winner.complexity,
            candidates = candidates_considered,
            plan = %winner.root,
            "plan selected"
        );
        Ok(Selection {
            winner,
            rules_applied,
            candidates_considered,
        })
    }

    /// Deterministic candidate ordering: total cost, then complexity, then
    /// enumeration order.
    fn candidate_order(a: &CandidatePlan, b: &CandidatePlan) -> Ordering {
        a.total_cost
            .total_cmp(&b.total_cost)
            .then_with(|| a.complexity.cmp(&b.complexity))
            .then_with(|| a.enumeration_index.cmp(&b.enumeration_index))
    }

    /// Apply hint filters, each falling back to the unfiltered set when it
    /// would leave nothing.
    fn apply_hints(candidates: Vec<CandidatePlan>, hints: &PlannerHints) -> Vec<CandidatePlan> {
        let mut current = candidates;

        if hints.force_table_scan {
            current = Self::retain_or_keep(current, |c| {
                matches!(c.root.leaf_access(), PlanOperator::TableScan { .. })
            });
        }
        if let Some(index) = &hints.preferred_index {
            current = Self::retain_or_keep(current, |c| c.root.references_index(index));
        }
        if let Some(max_cost) = hints.max_index_cost {
            current = Self::retain_or_keep(current, |c| c.total_cost <= max_cost);
        }
        current
    }

    fn retain_or_keep(
        candidates: Vec<CandidatePlan>,
        keep: impl Fn(&CandidatePlan) -> bool,
    ) -> Vec<CandidatePlan> {
        let filtered: Vec<CandidatePlan> =
            candidates.iter().filter(|c| keep(c)).cloned().collect();
        if filtered.is_empty() {
            candidates
        } else {
            filtered
        }
    }

    fn validate_complexity(&self, winner: &CandidatePlan) -> Result<()> {
        if winner.complexity <= self.config.complexity_threshold {
            return Ok(());
        }
        let mut suggestions = vec![
            "raise complexity_threshold in the planner configuration".to_string(),
            "reduce the number of OR branches or IN-list values".to_string(),
        ];
        if matches!(winner.root.leaf_access(), PlanOperator::TableScan { .. }) {
            suggestions.push("add an index covering the filtered fields".to_string());
        }
        Err(PlannerError::PlanComplexityExceeded {
            complexity: winner.complexity,
            threshold: self.config.complexity_threshold,
            plan: winner.root.explain(),
            suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Query, QueryAnalyzer};
    use crate::common::{IndexDescriptor, IndexField, Value};
    use crate::cost::CostModel;
    use crate::enumerator::PlanEnumerator;
    use crate::predicate::Predicate;
    use crate::stats::{StatisticsSnapshot, TableStatistics};

    fn snapshot() -> StatisticsSnapshot {
        StatisticsSnapshot::new().with_table(TableStatistics::new("users", 10_000))
    }

    fn run_selection(
        query: &Query,
        indexes: &[IndexDescriptor],
        hints: &PlannerHints,
        config: &PlannerConfig,
    ) -> Result<Selection> {
        let analysis = QueryAnalyzer::new().analyze(query).unwrap();
        let model = CostModel::default();
        let stats = snapshot();
        let estimator = CostEstimator::new(&model, &stats, "users");
        let mut budget = PlanningBudget::from_config(config);
        let outcome = PlanEnumerator::new(config, &estimator).enumerate(
            "users",
            &analysis,
            indexes,
            &mut budget,
        );
        PlanSelector::new(config, &estimator).select(
            outcome.candidates,
            &analysis,
            hints,
            &mut budget,
        )
    }

    fn status_query() -> Query {
        Query::filtered(Predicate::eq("status", Value::String("active".into())))
    }

    fn status_index() -> IndexDescriptor {
        IndexDescriptor::btree("idx_status", vec![IndexField::ascending("status")])
    }

    #[test]
    fn test_minimum_cost_wins() {
        let config = PlannerConfig::default();
        let selection = run_selection(
            &status_query(),
            &[status_index()],
            &PlannerHints::none(),
            &config,
        )
        .unwrap();
        // The index access beats the table scan on a selective predicate.
        assert!(!matches!(
            selection.winner.root.leaf_access(),
            PlanOperator::TableScan { .. }
        ));
    }

    #[test]
    fn test_force_table_scan_hint() {
        let config = PlannerConfig::default();
        let hints = PlannerHints {
            force_table_scan: true,
            ..PlannerHints::none()
        };
        let selection =
            run_selection(&status_query(), &[status_index()], &hints, &config).unwrap();
        assert!(matches!(
            selection.winner.root.leaf_access(),
            PlanOperator::TableScan { .. }
        ));
    }

    #[test]
    fn test_preferred_index_falls_back_when_unknown() {
        let config = PlannerConfig::default();
        let hints = PlannerHints {
            preferred_index: Some("no_such_index".to_string()),
            ..PlannerHints::none()
        };
        // Filtering to an unknown index would empty the set; the selector
        // must fall back to the full set instead of failing.
        let selection =
            run_selection(&status_query(), &[status_index()], &hints, &config).unwrap();
        assert!(selection.candidates_considered > 0);
    }

    #[test]
    fn test_preferred_index_is_honored() {
        let config = PlannerConfig::default();
        let hints = PlannerHints {
            preferred_index: Some("idx_status".to_string()),
            ..PlannerHints::none()
        };
        let selection =
            run_selection(&status_query(), &[status_index()], &hints, &config).unwrap();
        assert!(selection.winner.root.references_index("idx_status"));
    }

    #[test]
    fn test_complexity_threshold_enforced() {
        let mut config = PlannerConfig::default();
        config.complexity_threshold = 1;
        let query = Query::filtered(Predicate::and(vec![
            Predicate::eq("status", Value::String("active".into())),
            Predicate::gt("age", Value::Integer(21)),
        ]));
        let result = run_selection(&query, &[], &PlannerHints::none(), &config);
        match result {
            Err(PlannerError::PlanComplexityExceeded {
                complexity,
                threshold,
                plan,
                suggestions,
            }) => {
                assert!(complexity > threshold);
                assert!(!plan.is_empty());
                assert!(!suggestions.is_empty());
            }
            other => panic!("expected complexity error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_candidate_set_is_an_error() {
        let config = PlannerConfig::default();
        let analysis = QueryAnalyzer::new().analyze(&Query::new()).unwrap();
        let model = CostModel::default();
        let stats = snapshot();
        let estimator = CostEstimator::new(&model, &stats, "users");
        let mut budget = PlanningBudget::from_config(&config);
        let result = PlanSelector::new(&config, &estimator).select(
            Vec::new(),
            &analysis,
            &PlannerHints::none(),
            &mut budget,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_hint_parsing() {
        let hints = PlannerHints::parse(&[
            "force_table_scan=true",
            "preferred_index=idx_a",
            "max_index_cost=500",
        ])
        .unwrap();
        assert!(hints.force_table_scan);
        assert_eq!(hints.preferred_index.as_deref(), Some("idx_a"));
        assert_eq!(hints.max_index_cost, Some(500.0));

        assert!(PlannerHints::parse(&["bogus"]).is_err());
        assert!(PlannerHints::parse(&["unknown=1"]).is_err());
    }

    #[test]
    fn test_first_valid_plan_wins_without_cbo() {
        let mut config = PlannerConfig::default();
        config.enable_cost_based_optimization = false;
        let selection = run_selection(
            &status_query(),
            &[status_index()],
            &PlannerHints::none(),
            &config,
        )
        .unwrap();
        // Enumeration emits the table scan first.
        assert_eq!(selection.winner.enumeration_index, 0);
    }
}
