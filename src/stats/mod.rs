// Statistics
//
// Table, field, and index statistics the planner consumes, the combined
// MCV + histogram selectivity estimator, the provider interface exposed to
// the cost layer, and the snapshot cache shared with background collection.
//
// Layering follows PostgreSQL semantics with one deliberate twist: histogram
// buckets exclude MCV values at construction, so their estimates are relative
// to the whole population and MCV + histogram combine by direct sum.

pub mod histogram;
pub mod hll;
pub mod mcv;

use crate::common::{Value, ValueRange};
use crate::error::{PlannerError, Result};
use self::histogram::EquiDepthHistogram;
use self::mcv::McvList;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Statistics Records
// ============================================================================

/// Per-index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub entry_count: u64,
    pub distinct_keys: u64,
    pub avg_entries_per_key: f64,
}

/// Per-field statistics: distinct count, null accounting, extrema, MCV list,
/// and the MCV-free equi-depth histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub distinct_count: u64,
    pub null_count: u64,
    pub total_count: u64,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub mcv: McvList,
    pub histogram: Option<EquiDepthHistogram>,
}

impl FieldStatistics {
    pub fn non_null_count(&self) -> u64 {
        self.total_count.saturating_sub(self.null_count)
    }

    /// Combined equality estimate: the stored MCV frequency when the value is
    /// tracked, otherwise the histogram estimate.
    pub fn equality_selectivity(&self, value: &Value) -> f64 {
        if let Some(frequency) = self.mcv.frequency(value) {
            return frequency.clamp(0.0, 1.0);
        }
        match &self.histogram {
            Some(histogram) => histogram.equality_selectivity(value).clamp(0.0, 1.0),
            None => self.uniform_equality_selectivity(),
        }
    }

    /// Equality estimate with no literal value (bound parameters): uniform
    /// over the distinct count.
    pub fn uniform_equality_selectivity(&self) -> f64 {
        if self.distinct_count == 0 || self.total_count == 0 {
            return 0.0;
        }
        let non_null_fraction = self.non_null_count() as f64 / self.total_count as f64;
        (non_null_fraction / self.distinct_count as f64).clamp(0.0, 1.0)
    }

    /// Combined range estimate: direct sum of MCV coverage and histogram
    /// coverage inside the range.
    pub fn range_selectivity(&self, range: &ValueRange) -> f64 {
        let mcv_part = self.mcv.range_frequency(range);
        let histogram_part = self
            .histogram
            .as_ref()
            .map(|h| h.range_selectivity(range))
            .unwrap_or(0.0);
        (mcv_part + histogram_part).clamp(0.0, 1.0)
    }

    /// IN-list estimate: sum of per-value equality estimates, capped at 1.
    pub fn in_selectivity(&self, values: &[Value]) -> f64 {
        values
            .iter()
            .map(|v| self.equality_selectivity(v))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    pub fn null_selectivity(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        (self.null_count as f64 / self.total_count as f64).clamp(0.0, 1.0)
    }

    /// Check the cross-structure invariants: null accounting and the
    /// MCV/histogram no-double-count rule.
    pub fn validate(&self) -> Result<()> {
        if self.null_count > self.total_count {
            return Err(PlannerError::InvalidQuery {
                reason: format!(
                    "null count {} exceeds total count {}",
                    self.null_count, self.total_count
                ),
            });
        }
        if let Some(histogram) = &self.histogram {
            // Buckets exclude MCV values, so the bound values themselves must
            // not be tracked in the MCV list.
            for bucket in histogram.buckets() {
                if self.mcv.contains(&bucket.lower) || self.mcv.contains(&bucket.upper) {
                    return Err(PlannerError::InvalidQuery {
                        reason: "histogram bucket bound is an MCV value".to_string(),
                    });
                }
            }
            let coverage = self.mcv.total_frequency() + histogram.total_coverage();
            if coverage > 1.0 + 1e-6 {
                return Err(PlannerError::InvalidQuery {
                    reason: format!("MCV + histogram coverage {coverage} exceeds 1"),
                });
            }
        }
        Ok(())
    }
}

/// Per-record-type statistics snapshot entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub record_type: String,
    pub row_count: u64,
    pub avg_row_size: f64,
    pub sample_size: u64,
    pub sample_rate: f64,
    pub collected_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldStatistics>,
    pub indexes: BTreeMap<String, IndexStatistics>,
}

impl TableStatistics {
    pub fn new(record_type: impl Into<String>, row_count: u64) -> Self {
        Self {
            record_type: record_type.into(),
            row_count,
            avg_row_size: 0.0,
            sample_size: row_count,
            sample_rate: 1.0,
            collected_at: Utc::now(),
            fields: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, stats: FieldStatistics) -> Self {
        self.fields.insert(name.into(), stats);
        self
    }

    pub fn with_index(mut self, name: impl Into<String>, stats: IndexStatistics) -> Self {
        self.indexes.insert(name.into(), stats);
        self
    }
}

// ============================================================================
// Provider Interface
// ============================================================================

/// Read interface the cost layer plans against.
///
/// Every operation returns `None` when the statistic was never collected; the
/// cost model's defaults then apply.
pub trait StatisticsProvider {
    fn estimated_row_count(&self, record_type: &str) -> Option<u64>;
    fn estimated_distinct_values(&self, record_type: &str, field: &str) -> Option<u64>;
    fn equality_selectivity(
        &self,
        record_type: &str,
        field: &str,
        value: Option<&Value>,
    ) -> Option<f64>;
    fn range_selectivity(&self, record_type: &str, field: &str, range: &ValueRange)
        -> Option<f64>;
    fn in_selectivity(&self, record_type: &str, field: &str, values: &[Value]) -> Option<f64>;
    fn null_selectivity(&self, record_type: &str, field: &str) -> Option<f64>;
    fn estimated_index_entries(&self, record_type: &str, index: &str) -> Option<u64>;
    fn index_statistics(&self, record_type: &str, index: &str) -> Option<IndexStatistics>;
}

/// Immutable statistics snapshot covering every record type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    tables: BTreeMap<String, TableStatistics>,
}

impl StatisticsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, stats: TableStatistics) -> Self {
        self.tables.insert(stats.record_type.clone(), stats);
        self
    }

    pub fn table(&self, record_type: &str) -> Option<&TableStatistics> {
        self.tables.get(record_type)
    }

    fn field(&self, record_type: &str, field: &str) -> Option<&FieldStatistics> {
        self.tables.get(record_type)?.fields.get(field)
    }
}

impl StatisticsProvider for StatisticsSnapshot {
    fn estimated_row_count(&self, record_type: &str) -> Option<u64> {
        self.tables.get(record_type).map(|t| t.row_count)
    }

    fn estimated_distinct_values(&self, record_type: &str, field: &str) -> Option<u64> {
        self.field(record_type, field).map(|f| f.distinct_count)
    }

    fn equality_selectivity(
        &self,
        record_type: &str,
        field: &str,
        value: Option<&Value>,
    ) -> Option<f64> {
        let stats = self.field(record_type, field)?;
        Some(match value {
            Some(v) => stats.equality_selectivity(v),
            None => stats.uniform_equality_selectivity(),
        })
    }

    fn range_selectivity(
        &self,
        record_type: &str,
        field: &str,
        range: &ValueRange,
    ) -> Option<f64> {
        self.field(record_type, field)
            .map(|f| f.range_selectivity(range))
    }

    fn in_selectivity(&self, record_type: &str, field: &str, values: &[Value]) -> Option<f64> {
        self.field(record_type, field)
            .map(|f| f.in_selectivity(values))
    }

    fn null_selectivity(&self, record_type: &str, field: &str) -> Option<f64> {
        self.field(record_type, field).map(|f| f.null_selectivity())
    }

    fn estimated_index_entries(&self, record_type: &str, index: &str) -> Option<u64> {
        self.tables
            .get(record_type)?
            .indexes
            .get(index)
            .map(|i| i.entry_count)
    }

    fn index_statistics(&self, record_type: &str, index: &str) -> Option<IndexStatistics> {
        self.tables.get(record_type)?.indexes.get(index).cloned()
    }
}

// ============================================================================
// Snapshot Cache
// ============================================================================

/// Read-mostly statistics cache.
///
/// Planner code grabs an `Arc` to the current snapshot at plan start and holds
/// it for the query's lifetime; background collection swaps whole snapshots
/// atomically. Critical sections are limited to the pointer swap.
#[derive(Debug, Default)]
pub struct StatisticsCache {
    current: RwLock<Arc<StatisticsSnapshot>>,
}

impl StatisticsCache {
    pub fn new(snapshot: StatisticsSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot, by reference count.
    pub fn snapshot(&self) -> Arc<StatisticsSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Atomically install a freshly collected snapshot.
    pub fn replace(&self, snapshot: StatisticsSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Run a short read closure against the current snapshot.
    pub fn with_read<R>(&self, f: impl FnOnce(&StatisticsSnapshot) -> R) -> R {
        let guard = self.current.read();
        f(&guard)
    }
}
