// Most Common Values
//
// Tabulated high-frequency values with explicit frequencies. MCV entries are
// removed from the histogram population, so frequencies here are always
// relative to the whole table and combine with histogram estimates by direct
// sum.

use crate::common::{Value, ValueRange};
use serde::{Deserialize, Serialize};

/// Default ceiling on tracked MCV entries.
pub const DEFAULT_MCV_MAX_SIZE: usize = 32;
/// Values below this frequency are not worth tracking individually.
pub const DEFAULT_MCV_MIN_FREQUENCY: f64 = 0.001;

/// One most-common-value entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McvEntry {
    pub value: Value,
    /// Fraction of all rows carrying this value, in `[0, 1]`.
    pub frequency: f64,
    /// Absolute row count behind the frequency.
    pub count: u64,
}

/// Ordered most-common-value list, sorted by frequency descending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McvList {
    entries: Vec<McvEntry>,
}

impl McvList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from entries, enforcing frequency-descending order and the
    /// total-frequency bound. Entries past the size cap or below the
    /// frequency floor are dropped.
    pub fn new(mut entries: Vec<McvEntry>, max_size: usize, min_frequency: f64) -> Self {
        entries.retain(|e| e.frequency >= min_frequency && e.frequency <= 1.0);
        entries.sort_by(|a, b| {
            b.frequency
                .total_cmp(&a.frequency)
                .then_with(|| a.value.cmp(&b.value))
        });
        entries.truncate(max_size);

        // Clip so the total never exceeds 1.
        let mut total = 0.0;
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if total + entry.frequency > 1.0 + f64::EPSILON {
                break;
            }
            total += entry.frequency;
            kept.push(entry);
        }
        Self { entries: kept }
    }

    /// Build from raw value counts.
    pub fn from_counts(
        counts: &[(Value, u64)],
        total_rows: u64,
        max_size: usize,
        min_frequency: f64,
    ) -> Self {
        if total_rows == 0 {
            return Self::empty();
        }
        let entries = counts
            .iter()
            .map(|(value, count)| McvEntry {
                value: value.clone(),
                frequency: *count as f64 / total_rows as f64,
                count: *count,
            })
            .collect();
        Self::new(entries, max_size, min_frequency)
    }

    pub fn entries(&self) -> &[McvEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.entries.iter().any(|e| &e.value == value)
    }

    /// Stored frequency of a value, if tracked.
    pub fn frequency(&self, value: &Value) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| &e.value == value)
            .map(|e| e.frequency)
    }

    /// Sum of frequencies of MCV values falling inside the range.
    pub fn range_frequency(&self, range: &ValueRange) -> f64 {
        self.entries
            .iter()
            .filter(|e| range.contains(&e.value))
            .map(|e| e.frequency)
            .sum()
    }

    /// Sum of all tracked frequencies; `≤ 1`.
    pub fn total_frequency(&self) -> f64 {
        self.entries.iter().map(|e| e.frequency).sum()
    }
}
