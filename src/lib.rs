// Strata Planner - Cost-based query planner core for the Strata record store
//
// Given a declarative query over a record type (predicate tree, sort
// descriptors, optional limit/offset), the planner produces a cost-ranked
// physical plan: which indexes to use, how to combine them, what residual
// filtering and sorting remain, and whether index-only evaluation applies.
// Storage readers, executors, and statistics collection are external; this
// crate is the decision core.

pub mod analyzer;
pub mod bitmap;
pub mod common;
pub mod config;
pub mod cost;
pub mod enumerator;
pub mod error;
pub mod plan;
pub mod planner;
pub mod predicate;
pub mod rewriter;
pub mod selector;
pub mod stats;

pub use analyzer::{Query, QueryAnalysis, QueryAnalyzer, QueryPattern};
pub use common::{
    IndexDescriptor, IndexField, IndexKind, SortDescriptor, SortOrder, Value, ValueRange,
};
pub use config::PlannerConfig;
pub use cost::{CostBreakdown, CostModel, PlanCost};
pub use error::{PlannerError, Result};
pub use plan::PlanOperator;
pub use planner::{PlannedQuery, PlanningDiagnostics, QueryPlanner};
pub use predicate::{ComparisonOp, Predicate};
pub use selector::PlannerHints;
pub use stats::{StatisticsCache, StatisticsProvider, StatisticsSnapshot};
