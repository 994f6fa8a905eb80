// Query Planner Facade
//
// Wires the pipeline together: analyze, snapshot the statistics cache,
// enumerate candidates under budget, rewrite and select, then package the
// winner with its cost breakdown and planning diagnostics.

use crate::analyzer::{Query, QueryAnalyzer, QueryPattern};
use crate::common::IndexDescriptor;
use crate::config::{PlannerConfig, PlanningBudget};
use crate::cost::estimator::CostEstimator;
use crate::cost::{CostBreakdown, CostModel, PlanCost};
use crate::enumerator::PlanEnumerator;
use crate::error::Result;
use crate::plan::PlanOperator;
use crate::selector::{PlanSelector, PlannerHints};
use crate::stats::{StatisticsCache, StatisticsSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Counters describing how a planning run went.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningDiagnostics {
    pub candidates_enumerated: usize,
    pub candidates_considered: usize,
    pub rules_applied: usize,
    /// A budget breach cut enumeration short.
    pub enumeration_truncated: bool,
    /// DNF conversion failed; OR expansion was skipped.
    pub dnf_unavailable: bool,
    pub elapsed_ms: u64,
}

/// The chosen plan plus everything a caller needs to execute or explain it.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub plan: PlanOperator,
    pub cost: PlanCost,
    pub breakdown: CostBreakdown,
    pub complexity: usize,
    pub patterns: BTreeSet<QueryPattern>,
    pub diagnostics: PlanningDiagnostics,
}

impl PlannedQuery {
    /// Indented plan tree followed by the cost breakdown.
    pub fn explain(&self) -> String {
        format!("{}cost: {}\n", self.plan.explain(), self.breakdown)
    }
}

/// The planner: one instance per record store, shared across queries.
///
/// Planning is synchronous and deterministic for a given query, statistics
/// snapshot, and configuration. The statistics cache snapshot is taken once
/// at plan start and held for the whole run.
pub struct QueryPlanner {
    config: PlannerConfig,
    model: Arc<CostModel>,
    statistics: Arc<StatisticsCache>,
}

impl QueryPlanner {
    pub fn new(
        config: PlannerConfig,
        model: CostModel,
        statistics: Arc<StatisticsCache>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model: Arc::new(model),
            statistics,
        })
    }

    /// Planner with default configuration and cost model over an empty
    /// statistics cache.
    pub fn with_defaults() -> Self {
        Self {
            config: PlannerConfig::default(),
            model: Arc::new(CostModel::default()),
            statistics: Arc::new(StatisticsCache::new(StatisticsSnapshot::new())),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn statistics(&self) -> &StatisticsCache {
        &self.statistics
    }

    /// Plan a query over one record type.
    pub fn plan(
        &self,
        record_type: &str,
        query: &Query,
        indexes: &[IndexDescriptor],
        hints: &PlannerHints,
    ) -> Result<PlannedQuery> {
        let snapshot = self.statistics.snapshot();
        let mut budget = PlanningBudget::from_config(&self.config);

        let analysis = QueryAnalyzer::new().analyze(query)?;
        let estimator = CostEstimator::new(&self.model, snapshot.as_ref(), record_type);

        let enumerator = PlanEnumerator::new(&self.config, &estimator);
        let outcome = enumerator.enumerate(record_type, &analysis, indexes, &mut budget);
        let candidates_enumerated = outcome.candidates.len();
        debug!(
            record_type,
            candidates = candidates_enumerated,
            truncated = outcome.truncated,
            "enumeration finished"
        );

        let selector = PlanSelector::new(&self.config, &estimator);
        let selection = selector.select(outcome.candidates, &analysis, hints, &mut budget)?;

        let breakdown = self.model.breakdown(&selection.winner.cost);
        Ok(PlannedQuery {
            breakdown,
            complexity: selection.winner.complexity,
            patterns: analysis.patterns.clone(),
            diagnostics: PlanningDiagnostics {
                candidates_enumerated,
                candidates_considered: selection.candidates_considered,
                rules_applied: selection.rules_applied,
                enumeration_truncated: outcome.truncated,
                dnf_unavailable: outcome.dnf_unavailable,
                elapsed_ms: budget.elapsed_ms(),
            },
            cost: selection.winner.cost,
            plan: selection.winner.root,
        })
    }
}
