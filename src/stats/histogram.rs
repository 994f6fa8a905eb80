// Equi-Depth Histogram
//
// Value-range buckets of roughly equal row count over the non-MCV population.
// Because MCV values are excluded at construction time, bucket counts are
// already relative to the whole table: combining histogram and MCV estimates
// is a direct sum, never the classical `mcv + hist * (1 - total_mcv)` form.

use crate::common::{Value, ValueRange};
use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One histogram bucket covering `[lower, upper]`.
///
/// Interior buckets are treated as upper-exclusive during lookup so adjacent
/// buckets sharing a boundary never double count; the last bucket is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: Value,
    pub upper: Value,
    pub count: u64,
    /// Distinct values inside the bucket, when the collector tracked it.
    pub distinct: Option<u64>,
}

/// Equi-depth histogram relative to the whole-table row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquiDepthHistogram {
    buckets: Vec<HistogramBucket>,
    total_rows: u64,
}

impl EquiDepthHistogram {
    /// Validate bucket ordering (`lower <= upper`, monotonic across buckets)
    /// and build the histogram.
    pub fn new(buckets: Vec<HistogramBucket>, total_rows: u64) -> Result<Self> {
        for bucket in &buckets {
            if bucket.lower > bucket.upper {
                return Err(PlannerError::InvalidQuery {
                    reason: format!(
                        "histogram bucket with lower {} above upper {}",
                        bucket.lower, bucket.upper
                    ),
                });
            }
        }
        for pair in buckets.windows(2) {
            if pair[0].upper > pair[1].lower {
                return Err(PlannerError::InvalidQuery {
                    reason: "histogram buckets out of order".to_string(),
                });
            }
        }
        Ok(Self {
            buckets,
            total_rows,
        })
    }

    /// Build equi-depth buckets from a sorted, MCV-free sample.
    ///
    /// `total_rows` is the whole-table count the resulting selectivities are
    /// relative to; `represented_rows` is how many rows the sample stands for.
    pub fn from_sorted_values(
        values: &[Value],
        bucket_count: usize,
        total_rows: u64,
        represented_rows: u64,
    ) -> Result<Self> {
        if values.is_empty() || bucket_count == 0 {
            return Self::new(Vec::new(), total_rows);
        }
        let per_bucket = values.len().div_ceil(bucket_count);
        let rows_per_value = represented_rows as f64 / values.len() as f64;
        let mut buckets = Vec::with_capacity(bucket_count);
        for chunk in values.chunks(per_bucket) {
            let mut distinct = 1u64;
            for pair in chunk.windows(2) {
                if pair[0] != pair[1] {
                    distinct += 1;
                }
            }
            buckets.push(HistogramBucket {
                lower: chunk.first().cloned().unwrap(),
                upper: chunk.last().cloned().unwrap(),
                count: (chunk.len() as f64 * rows_per_value).round() as u64,
                distinct: Some(distinct),
            });
        }
        Self::new(buckets, total_rows)
    }

    pub fn buckets(&self) -> &[HistogramBucket] {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Fraction of the whole table the histogram covers.
    pub fn total_coverage(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        self.buckets.iter().map(|b| b.count).sum::<u64>() as f64 / self.total_rows as f64
    }

    /// Whether the value falls inside any bucket span. Used to verify the
    /// MCV-exclusion invariant.
    pub fn covers_value(&self, value: &Value) -> bool {
        self.bucket_index(value).is_some()
    }

    fn bucket_index(&self, value: &Value) -> Option<usize> {
        let last = self.buckets.len().checked_sub(1)?;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            if value < &bucket.lower {
                return None;
            }
            // A boundary value shared with the next bucket belongs to the
            // next bucket; interiors are upper-exclusive.
            let upper_ok = match value.cmp(&bucket.upper) {
                Ordering::Less => true,
                Ordering::Equal => idx == last || self.buckets[idx + 1].lower != bucket.upper,
                Ordering::Greater => false,
            };
            if upper_ok {
                return Some(idx);
            }
        }
        None
    }

    /// Equality selectivity for a non-MCV value, relative to the whole table.
    pub fn equality_selectivity(&self, value: &Value) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        match self.bucket_index(value) {
            Some(idx) => {
                let bucket = &self.buckets[idx];
                let fraction = bucket.count as f64 / self.total_rows as f64;
                let distinct = bucket.distinct.unwrap_or(bucket.count).max(1);
                fraction / distinct as f64
            }
            None => 0.0,
        }
    }

    /// Range selectivity relative to the whole table: full buckets contribute
    /// their whole fraction, partially overlapped buckets interpolate
    /// linearly when the bounds are numeric (half the bucket otherwise).
    pub fn range_selectivity(&self, range: &ValueRange) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        let mut selectivity = 0.0;
        for bucket in &self.buckets {
            let fraction = bucket.count as f64 / self.total_rows as f64;
            selectivity += fraction * Self::bucket_overlap(bucket, range);
        }
        selectivity.clamp(0.0, 1.0)
    }

    /// Fraction of a bucket covered by the range, in `[0, 1]`.
    fn bucket_overlap(bucket: &HistogramBucket, range: &ValueRange) -> f64 {
        let lower_in = range.contains(&bucket.lower);
        let upper_in = range.contains(&bucket.upper);
        if lower_in && upper_in {
            return 1.0;
        }

        // Disjoint when the range sits entirely below or above the bucket.
        if let Some(upper) = &range.upper {
            if upper < &bucket.lower || (upper == &bucket.lower && !range.upper_inclusive) {
                return 0.0;
            }
        }
        if let Some(lower) = &range.lower {
            if lower > &bucket.upper || (lower == &bucket.upper && !range.lower_inclusive) {
                return 0.0;
            }
        }

        // Partial overlap: interpolate on numeric spans.
        if let (Some(lo), Some(hi)) = (bucket.lower.as_f64(), bucket.upper.as_f64()) {
            if hi > lo {
                let span = hi - lo;
                let clip_lo = range
                    .lower
                    .as_ref()
                    .and_then(Value::as_f64)
                    .map_or(lo, |v| v.max(lo));
                let clip_hi = range
                    .upper
                    .as_ref()
                    .and_then(Value::as_f64)
                    .map_or(hi, |v| v.min(hi));
                return ((clip_hi - clip_lo) / span).clamp(0.0, 1.0);
            }
        }
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram() -> EquiDepthHistogram {
        // 4 buckets of 2000 rows each over values 0..80, relative to a
        // 10_000-row table (the remaining 2000 rows live in the MCV list).
        EquiDepthHistogram::new(
            vec![
                HistogramBucket {
                    lower: Value::Integer(0),
                    upper: Value::Integer(20),
                    count: 2000,
                    distinct: Some(20),
                },
                HistogramBucket {
                    lower: Value::Integer(20),
                    upper: Value::Integer(40),
                    count: 2000,
                    distinct: Some(20),
                },
                HistogramBucket {
                    lower: Value::Integer(40),
                    upper: Value::Integer(60),
                    count: 2000,
                    distinct: Some(20),
                },
                HistogramBucket {
                    lower: Value::Integer(60),
                    upper: Value::Integer(80),
                    count: 2000,
                    distinct: Some(20),
                },
            ],
            10_000,
        )
        .unwrap()
    }

    #[test]
    fn test_bucket_validation() {
        let err = EquiDepthHistogram::new(
            vec![HistogramBucket {
                lower: Value::Integer(10),
                upper: Value::Integer(5),
                count: 100,
                distinct: None,
            }],
            1000,
        );
        assert!(err.is_err());

        let out_of_order = EquiDepthHistogram::new(
            vec![
                HistogramBucket {
                    lower: Value::Integer(10),
                    upper: Value::Integer(20),
                    count: 100,
                    distinct: None,
                },
                HistogramBucket {
                    lower: Value::Integer(15),
                    upper: Value::Integer(30),
                    count: 100,
                    distinct: None,
                },
            ],
            1000,
        );
        assert!(out_of_order.is_err());
    }

    #[test]
    fn test_equality_selectivity() {
        let hist = histogram();
        let sel = hist.equality_selectivity(&Value::Integer(10));
        // bucket fraction 0.2 over 20 distinct values
        assert!((sel - 0.01).abs() < 1e-9);
        assert_eq!(hist.equality_selectivity(&Value::Integer(999)), 0.0);
    }

    #[test]
    fn test_shared_boundary_counts_once() {
        let hist = histogram();
        // 20 is the boundary between buckets 0 and 1; it must resolve to
        // exactly one bucket.
        let sel = hist.equality_selectivity(&Value::Integer(20));
        assert!(sel > 0.0);
        assert!(sel <= 0.2 / 20.0 + 1e-9);
    }

    #[test]
    fn test_full_range_coverage() {
        let hist = histogram();
        let range = ValueRange::between(Value::Integer(0), Value::Integer(80));
        let sel = hist.range_selectivity(&range);
        assert!((sel - 0.8).abs() < 1e-9);
        assert!((hist.total_coverage() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_partial_range_interpolates() {
        let hist = histogram();
        // Half of the first bucket.
        let range = ValueRange::between(Value::Integer(0), Value::Integer(10));
        let sel = hist.range_selectivity(&range);
        assert!((sel - 0.1).abs() < 0.02);
    }

    #[test]
    fn test_unbounded_range() {
        let hist = histogram();
        let range = ValueRange::at_least(Value::Integer(40), true);
        let sel = hist.range_selectivity(&range);
        assert!((sel - 0.4).abs() < 0.02);
    }

    #[test]
    fn test_from_sorted_values() {
        let values: Vec<Value> = (0..100).map(Value::Integer).collect();
        let hist = EquiDepthHistogram::from_sorted_values(&values, 4, 1000, 800).unwrap();
        assert_eq!(hist.buckets().len(), 4);
        assert!((hist.total_coverage() - 0.8).abs() < 1e-9);
    }
}
