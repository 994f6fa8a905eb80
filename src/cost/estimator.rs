// Cost Estimation
//
// Per-predicate selectivity composition and per-operator cost contracts.
// Estimation never fails: fields without collected statistics fall back to
// the cost model defaults, and every selectivity is clamped to [0, 1].

use crate::analyzer::QueryAnalysis;
use crate::common::IndexDescriptor;
use crate::cost::{CostModel, PlanCost};
use crate::plan::{BitmapCombineOp, PlanOperator};
use crate::predicate::condition::{
    BoundCondition, ConditionTree, FieldCondition, SpatialCondition,
};
use crate::predicate::Predicate;
use crate::stats::StatisticsProvider;

/// Estimated fraction of the smallest input surviving an index intersection.
///
/// A constant heuristic; statistics-driven estimation would need multi-column
/// correlation data the collection layer does not produce yet.
pub const INTERSECTION_SURVIVAL_RATIO: f64 = 0.1;

/// Scale factor of the HNSW traversal estimate.
const VECTOR_TRAVERSAL_FACTOR: f64 = 0.1;

/// Cost and selectivity estimator bound to one record type and one
/// statistics snapshot.
pub struct CostEstimator<'a> {
    model: &'a CostModel,
    stats: &'a dyn StatisticsProvider,
    record_type: &'a str,
}

impl<'a> CostEstimator<'a> {
    pub fn new(
        model: &'a CostModel,
        stats: &'a dyn StatisticsProvider,
        record_type: &'a str,
    ) -> Self {
        Self {
            model,
            stats,
            record_type,
        }
    }

    pub fn model(&self) -> &CostModel {
        self.model
    }

    // ------------------------------------------------------------------
    // Cardinalities
    // ------------------------------------------------------------------

    /// Estimated table row count, falling back to the model default.
    pub fn row_count(&self) -> f64 {
        self.stats
            .estimated_row_count(self.record_type)
            .unwrap_or(self.model.default_row_count) as f64
    }

    /// Estimated distinct values of a field, when collected.
    pub fn distinct_values(&self, field: &str) -> Option<u64> {
        self.stats.estimated_distinct_values(self.record_type, field)
    }

    /// Estimated entry count of an index, falling back to the row count.
    pub fn index_entries(&self, index: &IndexDescriptor) -> f64 {
        self.stats
            .estimated_index_entries(self.record_type, &index.name)
            .map(|e| e as f64)
            .unwrap_or_else(|| self.row_count())
    }

    fn avg_entries_per_key(&self, index: &IndexDescriptor) -> f64 {
        if index.unique {
            return 1.0;
        }
        if let Some(stats) = self.stats.index_statistics(self.record_type, &index.name) {
            if stats.avg_entries_per_key > 0.0 {
                return stats.avg_entries_per_key;
            }
        }
        if let Some(leading) = index.leading_field() {
            if let Some(distinct) = self.stats.estimated_distinct_values(self.record_type, leading)
            {
                if distinct > 0 {
                    return (self.row_count() / distinct as f64).max(1.0);
                }
            }
        }
        (self.row_count() * self.model.default_equality_selectivity).max(1.0)
    }

    // ------------------------------------------------------------------
    // Selectivity
    // ------------------------------------------------------------------

    /// Selectivity of one bound condition: fraction of rows that pass.
    pub fn condition_selectivity(&self, bound: &BoundCondition) -> f64 {
        let field = bound.field_name();
        let selectivity = match &bound.condition {
            FieldCondition::Equals(value) => self
                .stats
                .equality_selectivity(self.record_type, field, Some(value))
                .unwrap_or(self.model.default_equality_selectivity),
            FieldCondition::NotEquals(value) => {
                1.0 - self
                    .stats
                    .equality_selectivity(self.record_type, field, Some(value))
                    .unwrap_or(self.model.default_equality_selectivity)
            }
            FieldCondition::Range(range) => self
                .stats
                .range_selectivity(self.record_type, field, range)
                .unwrap_or(self.model.default_range_selectivity),
            FieldCondition::In(values) => self
                .stats
                .in_selectivity(self.record_type, field, values)
                .unwrap_or_else(|| {
                    self.model.default_in_item_selectivity * values.len() as f64
                }),
            FieldCondition::NotIn(values) => {
                1.0 - self
                    .stats
                    .in_selectivity(self.record_type, field, values)
                    .unwrap_or_else(|| {
                        self.model.default_in_item_selectivity * values.len() as f64
                    })
            }
            FieldCondition::IsNull(true) => self
                .stats
                .null_selectivity(self.record_type, field)
                .unwrap_or(self.model.default_null_selectivity),
            FieldCondition::IsNull(false) => {
                1.0 - self
                    .stats
                    .null_selectivity(self.record_type, field)
                    .unwrap_or(self.model.default_null_selectivity)
            }
            FieldCondition::TextSearch { .. } => self.model.default_text_search_selectivity,
            FieldCondition::Spatial(SpatialCondition::Within(region)) => {
                let area = region.area_fraction();
                if area > 0.0 {
                    area
                } else {
                    self.model.default_spatial_selectivity
                }
            }
            FieldCondition::VectorSimilarity { k, .. } => {
                let rows = self.row_count();
                if rows > 0.0 {
                    *k as f64 / rows
                } else {
                    0.0
                }
            }
            FieldCondition::StringPattern { .. } => self.model.default_pattern_selectivity,
        };
        let selectivity = if bound.negated {
            1.0 - selectivity
        } else {
            selectivity
        };
        selectivity.clamp(0.0, 1.0)
    }

    /// Selectivity of a normalized condition tree. Conjunctions multiply
    /// under independence; disjunctions use inclusion-exclusion.
    pub fn condition_tree_selectivity(&self, tree: &ConditionTree) -> f64 {
        let selectivity = match tree {
            ConditionTree::AlwaysTrue => 1.0,
            ConditionTree::AlwaysFalse => 0.0,
            ConditionTree::Field(bound) => self.condition_selectivity(bound),
            ConditionTree::Conjunction(children) => children
                .iter()
                .map(|c| self.condition_tree_selectivity(c))
                .product(),
            ConditionTree::Disjunction(children) => {
                1.0 - children
                    .iter()
                    .map(|c| 1.0 - self.condition_tree_selectivity(c))
                    .product::<f64>()
            }
        };
        selectivity.clamp(0.0, 1.0)
    }

    /// Selectivity of a raw predicate.
    pub fn predicate_selectivity(&self, predicate: &Predicate) -> f64 {
        match ConditionTree::from_predicate(predicate) {
            Ok(tree) => self.condition_tree_selectivity(&tree),
            // Defended at the analyzer boundary; estimation itself never fails.
            Err(_) => 0.5,
        }
    }

    fn satisfied_selectivity(&self, satisfied: &[BoundCondition]) -> f64 {
        satisfied
            .iter()
            .map(|c| self.condition_selectivity(c))
            .product::<f64>()
            .clamp(0.0, 1.0)
    }

    // ------------------------------------------------------------------
    // Operator Costs
    // ------------------------------------------------------------------

    /// Estimate the cost of a plan subtree.
    pub fn estimate(&self, operator: &PlanOperator, analysis: &QueryAnalysis) -> PlanCost {
        match operator {
            PlanOperator::TableScan { .. } => {
                let rows = self.row_count();
                let selectivity = self.predicate_selectivity(&analysis.predicate);
                PlanCost {
                    index_reads: 0.0,
                    record_fetches: rows,
                    post_filter_count: rows * (1.0 - selectivity),
                    requires_sort: analysis.has_sort(),
                    additional_cost: 0.0,
                }
            }

            PlanOperator::IndexScan {
                index,
                satisfied,
                reverse,
            } => self.index_scan_cost(index, satisfied, *reverse, analysis, true),

            PlanOperator::IndexOnlyScan {
                index,
                satisfied,
                reverse,
            } => self.index_scan_cost(index, satisfied, *reverse, analysis, false),

            PlanOperator::IndexSeek { index, keys, .. } => {
                let key_count = keys.len() as f64;
                let fetches = if index.unique {
                    key_count
                } else {
                    key_count * self.avg_entries_per_key(index)
                };
                let additional = if keys.len() > 1 {
                    self.model.in_join_weight * key_count
                } else {
                    0.0
                };
                PlanCost {
                    index_reads: key_count,
                    record_fetches: fetches,
                    post_filter_count: 0.0,
                    requires_sort: keys.len() > 1 && analysis.has_sort(),
                    additional_cost: additional,
                }
            }

            PlanOperator::Union {
                children,
                deduplicate,
            } => {
                // Children execute sequentially; their costs sum. Each child
                // carries its own range initiation.
                let mut cost = PlanCost::ZERO;
                for child in children {
                    cost += self.estimate(child, analysis);
                }
                if *deduplicate {
                    cost.additional_cost += self.model.dedup_weight * cost.record_fetches;
                }
                // Union output is unordered.
                cost.requires_sort = analysis.has_sort();
                cost
            }

            PlanOperator::Intersection { children } => {
                let child_costs: Vec<PlanCost> = children
                    .iter()
                    .map(|c| self.estimate(c, analysis))
                    .collect();
                let index_reads: f64 = child_costs.iter().map(|c| c.index_reads).sum();
                let min_fetches = child_costs
                    .iter()
                    .map(|c| c.record_fetches)
                    .fold(f64::INFINITY, f64::min);
                let result_size = if min_fetches.is_finite() {
                    min_fetches * INTERSECTION_SURVIVAL_RATIO
                } else {
                    0.0
                };
                let additional: f64 = child_costs.iter().map(|c| c.additional_cost).sum::<f64>()
                    + self.model.intersection_weight * index_reads
                    + self.model.intersection_fetch_weight * result_size;
                PlanCost {
                    index_reads,
                    record_fetches: result_size,
                    post_filter_count: 0.0,
                    requires_sort: analysis.has_sort(),
                    additional_cost: additional,
                }
            }

            PlanOperator::Filter {
                input, selectivity, ..
            } => {
                let mut cost = self.estimate(input, analysis);
                cost.additional_cost +=
                    self.model.filter_cost(cost.record_fetches, *selectivity);
                cost
            }

            PlanOperator::Sort { input, .. } => {
                let mut cost = self.estimate(input, analysis);
                cost.additional_cost += self.model.sort_cost(cost.record_fetches);
                cost.requires_sort = false;
                cost
            }

            PlanOperator::Limit {
                input,
                limit,
                offset,
            } => {
                let cost = self.estimate(input, analysis);
                match limit {
                    // Early termination only applies when the input arrives
                    // ordered; an unsorted input must be consumed entirely.
                    Some(limit) if !cost.requires_sort && cost.record_fetches > 0.0 => {
                        let wanted = (limit + offset.unwrap_or(0)) as f64;
                        cost.scaled((wanted / cost.record_fetches).min(1.0))
                    }
                    _ => cost,
                }
            }

            PlanOperator::Project { input, .. } => self.estimate(input, analysis),

            PlanOperator::FullTextScan { field, terms, mode, .. } => {
                let bound = BoundCondition::new(
                    field.clone(),
                    FieldCondition::TextSearch {
                        terms: terms.clone(),
                        mode: *mode,
                    },
                );
                let matches = self.row_count() * self.condition_selectivity(&bound);
                PlanCost {
                    index_reads: matches,
                    record_fetches: matches,
                    post_filter_count: 0.0,
                    requires_sort: analysis.has_sort(),
                    additional_cost: self.model.range_initiation_weight,
                }
            }

            PlanOperator::SpatialScan { field, region, .. } => {
                let bound = BoundCondition::new(
                    field.clone(),
                    FieldCondition::Spatial(SpatialCondition::Within(region.clone())),
                );
                let matches = self.row_count() * self.condition_selectivity(&bound);
                PlanCost {
                    // R-tree traversal touches interior and leaf levels.
                    index_reads: 2.0 * matches,
                    record_fetches: matches,
                    post_filter_count: 0.0,
                    requires_sort: analysis.has_sort(),
                    additional_cost: self.model.range_initiation_weight,
                }
            }

            PlanOperator::VectorSearch { k, ef_search, .. } => {
                let rows = self.row_count().max(2.0);
                PlanCost {
                    index_reads: rows.log2() * *ef_search as f64 * VECTOR_TRAVERSAL_FACTOR,
                    record_fetches: *k as f64,
                    post_filter_count: 0.0,
                    // Results arrive in similarity order.
                    requires_sort: false,
                    additional_cost: self.model.range_initiation_weight,
                }
            }

            PlanOperator::Aggregation { group_by, .. } => PlanCost {
                index_reads: (group_by.len() + 1) as f64,
                record_fetches: 0.0,
                post_filter_count: 0.0,
                requires_sort: false,
                additional_cost: self.model.range_initiation_weight,
            },

            PlanOperator::BitmapScan { condition, .. } => {
                let rows = self.row_count();
                let selectivity = self.condition_selectivity(condition);
                PlanCost {
                    index_reads: 0.0,
                    record_fetches: rows * selectivity,
                    post_filter_count: 0.0,
                    requires_sort: analysis.has_sort(),
                    additional_cost: self.bitmap_word_cost(rows)
                        + rows * selectivity * self.model.bitmap_to_row_id_weight,
                }
            }

            PlanOperator::BitmapCombine { op, children } => {
                let rows = self.row_count();
                let selectivities: Vec<f64> = children
                    .iter()
                    .map(|c| self.bitmap_child_selectivity(c))
                    .collect();
                let combined = match op {
                    BitmapCombineOp::And => selectivities.iter().product::<f64>(),
                    BitmapCombineOp::Or => {
                        1.0 - selectivities.iter().map(|s| 1.0 - s).product::<f64>()
                    }
                }
                .clamp(0.0, 1.0);
                // One word pass per child bitmap, N-1 passes to combine, one
                // row-id materialization of the combined result.
                let word_cost = self.bitmap_word_cost(rows) * children.len() as f64
                    + self.bitmap_word_cost(rows) * (children.len().saturating_sub(1)) as f64;
                PlanCost {
                    index_reads: 0.0,
                    record_fetches: rows * combined,
                    post_filter_count: 0.0,
                    requires_sort: analysis.has_sort(),
                    additional_cost: word_cost
                        + rows * combined * self.model.bitmap_to_row_id_weight,
                }
            }
        }
    }

    fn index_scan_cost(
        &self,
        index: &IndexDescriptor,
        satisfied: &[BoundCondition],
        reverse: bool,
        analysis: &QueryAnalysis,
        fetch_records: bool,
    ) -> PlanCost {
        let satisfied_selectivity = self.satisfied_selectivity(satisfied);
        let entries = self.index_entries(index) * satisfied_selectivity;
        let total_selectivity = self.predicate_selectivity(&analysis.predicate);
        let residual_fraction = if satisfied_selectivity > 0.0 {
            (1.0 - total_selectivity / satisfied_selectivity).max(0.0)
        } else {
            0.0
        };
        PlanCost {
            index_reads: entries,
            record_fetches: if fetch_records { entries } else { 0.0 },
            post_filter_count: entries * residual_fraction,
            requires_sort: !crate::plan::scan_ordering_satisfied(
                index,
                satisfied,
                reverse,
                &analysis.sort,
            ),
            additional_cost: self.model.range_initiation_weight,
        }
    }

    fn bitmap_word_cost(&self, rows: f64) -> f64 {
        (rows / 64.0) * self.model.bit_op_weight
    }

    fn bitmap_child_selectivity(&self, child: &PlanOperator) -> f64 {
        match child {
            PlanOperator::BitmapScan { condition, .. } => self.condition_selectivity(condition),
            // Non-bitmap children only appear in malformed trees; stay neutral.
            _ => 0.5,
        }
    }
}
