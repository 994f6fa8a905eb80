// Cost Model
//
// Weights for the physical cost components, default selectivities for fields
// with no collected statistics, and the `PlanCost` record every operator
// estimate produces. `additional_cost` is always pre-weighted by whoever adds
// it; the total formula never multiplies it again.

pub mod estimator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Cost weights and fallback selectivities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Weight per index entry read.
    pub index_read_weight: f64,
    /// Weight per record fetched from the primary store.
    pub record_fetch_weight: f64,
    /// Weight per record discarded by residual filtering.
    pub post_filter_weight: f64,
    /// Weight per record when an explicit sort is still required.
    pub sort_weight: f64,
    /// Fixed cost of initiating one index range read.
    pub range_initiation_weight: f64,
    /// Weight per record passing through union deduplication.
    pub dedup_weight: f64,
    /// Weight per index read during intersection matching.
    pub intersection_weight: f64,
    /// Weight per record surviving an intersection.
    pub intersection_fetch_weight: f64,
    /// CPU weight per record evaluated by a filter.
    pub filter_cpu_weight: f64,
    /// CPU weight per comparison during an explicit sort.
    pub sort_cpu_weight: f64,
    /// Weight per 64-bit word touched by a bitmap operation.
    pub bit_op_weight: f64,
    /// Weight per row id materialized out of a bitmap.
    pub bitmap_to_row_id_weight: f64,
    /// Weight per probed key of an in-join seek.
    pub in_join_weight: f64,

    // Fallback selectivities for fields without collected statistics.
    pub default_equality_selectivity: f64,
    pub default_range_selectivity: f64,
    pub default_in_item_selectivity: f64,
    pub default_pattern_selectivity: f64,
    pub default_null_selectivity: f64,
    pub default_text_search_selectivity: f64,
    pub default_spatial_selectivity: f64,
    /// Row count assumed for tables with no collected statistics.
    pub default_row_count: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            index_read_weight: 0.1,
            record_fetch_weight: 1.0,
            post_filter_weight: 0.2,
            sort_weight: 0.3,
            range_initiation_weight: 5.0,
            dedup_weight: 0.05,
            intersection_weight: 0.05,
            intersection_fetch_weight: 0.5,
            filter_cpu_weight: 0.01,
            sort_cpu_weight: 0.05,
            bit_op_weight: 0.001,
            bitmap_to_row_id_weight: 0.1,
            in_join_weight: 1.5,
            default_equality_selectivity: 0.005,
            default_range_selectivity: 0.33,
            default_in_item_selectivity: 0.005,
            default_pattern_selectivity: 0.05,
            default_null_selectivity: 0.01,
            default_text_search_selectivity: 0.02,
            default_spatial_selectivity: 0.05,
            default_row_count: 1000,
        }
    }
}

impl CostModel {
    /// Total cost of a [`PlanCost`] under this model.
    pub fn total_cost(&self, cost: &PlanCost) -> f64 {
        let sort = if cost.requires_sort {
            cost.record_fetches * self.sort_weight
        } else {
            0.0
        };
        cost.index_reads * self.index_read_weight
            + cost.record_fetches * self.record_fetch_weight
            + cost.post_filter_count * self.post_filter_weight
            + sort
            + cost.additional_cost
    }

    /// Pre-weighted CPU cost of filtering `input_rows` records.
    pub fn filter_cost(&self, input_rows: f64, _selectivity: f64) -> f64 {
        input_rows.max(0.0) * self.filter_cpu_weight
    }

    /// Pre-weighted cost of an explicit sort of `rows` records.
    pub fn sort_cost(&self, rows: f64) -> f64 {
        let rows = rows.max(0.0);
        if rows <= 1.0 {
            return 0.0;
        }
        rows * rows.log2() * self.sort_cpu_weight
    }

    /// Full breakdown for diagnostics.
    pub fn breakdown(&self, cost: &PlanCost) -> CostBreakdown {
        CostBreakdown {
            index_reads: cost.index_reads,
            record_fetches: cost.record_fetches,
            post_filter_count: cost.post_filter_count,
            requires_sort: cost.requires_sort,
            additional_cost: cost.additional_cost,
            total_cost: self.total_cost(cost),
        }
    }
}

// ============================================================================
// Plan Cost
// ============================================================================

/// Cost components of one plan subtree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanCost {
    pub index_reads: f64,
    pub record_fetches: f64,
    pub post_filter_count: f64,
    pub requires_sort: bool,
    pub additional_cost: f64,
}

impl PlanCost {
    pub const ZERO: PlanCost = PlanCost {
        index_reads: 0.0,
        record_fetches: 0.0,
        post_filter_count: 0.0,
        requires_sort: false,
        additional_cost: 0.0,
    };

    /// Scale every numeric component. Used by limit early termination.
    pub fn scaled(mut self, factor: f64) -> PlanCost {
        let factor = factor.clamp(0.0, 1.0);
        self.index_reads *= factor;
        self.record_fetches *= factor;
        self.post_filter_count *= factor;
        self.additional_cost *= factor;
        self
    }
}

impl Add for PlanCost {
    type Output = PlanCost;

    fn add(self, rhs: PlanCost) -> PlanCost {
        PlanCost {
            index_reads: self.index_reads + rhs.index_reads,
            record_fetches: self.record_fetches + rhs.record_fetches,
            post_filter_count: self.post_filter_count + rhs.post_filter_count,
            requires_sort: self.requires_sort || rhs.requires_sort,
            additional_cost: self.additional_cost + rhs.additional_cost,
        }
    }
}

impl AddAssign for PlanCost {
    fn add_assign(&mut self, rhs: PlanCost) {
        *self = *self + rhs;
    }
}

/// Serializable cost breakdown for explain output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub index_reads: f64,
    pub record_fetches: f64,
    pub post_filter_count: f64,
    pub requires_sort: bool,
    pub additional_cost: f64,
    pub total_cost: f64,
}

impl fmt::Display for CostBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{index_reads: {:.1}, record_fetches: {:.1}, post_filter_count: {:.1}, \
             requires_sort: {}, additional_cost: {:.1}, total_cost: {:.1}}}",
            self.index_reads,
            self.record_fetches,
            self.post_filter_count,
            self.requires_sort,
            self.additional_cost,
            self.total_cost
        )
    }
}
