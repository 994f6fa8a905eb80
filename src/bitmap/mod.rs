// Bitmap Core
//
// Word-packed bitmaps for low-cardinality planning: boolean algebra over
// equal-length operands, a per-value bitmap index model, and the cardinality
// analysis the enumerator consults before emitting bitmap candidates.

use crate::common::Value;
use crate::config::DEFAULT_BITMAP_MAX_CARDINALITY;
use crate::error::{PlannerError, Result};
use crate::predicate::condition::FieldCondition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const WORD_BITS: usize = 64;

/// Fixed-length bitmap packed into 64-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedBitmap {
    words: Vec<u64>,
    bit_count: usize,
}

impl CompressedBitmap {
    pub fn new(bit_count: usize) -> Self {
        Self {
            words: vec![0; bit_count.div_ceil(WORD_BITS)],
            bit_count,
        }
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn set(&mut self, position: usize) -> Result<()> {
        if position >= self.bit_count {
            return Err(PlannerError::BitmapOperandMismatch {
                left: position,
                right: self.bit_count,
            });
        }
        self.words[position / WORD_BITS] |= 1u64 << (position % WORD_BITS);
        Ok(())
    }

    pub fn get(&self, position: usize) -> bool {
        if position >= self.bit_count {
            return false;
        }
        self.words[position / WORD_BITS] & (1u64 << (position % WORD_BITS)) != 0
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Positions of all set bits, ascending.
    pub fn ones(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.cardinality());
        for (word_idx, &word) in self.words.iter().enumerate() {
            let mut bits = word;
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                out.push(word_idx * WORD_BITS + bit);
                bits &= bits - 1;
            }
        }
        out
    }

    fn check_length(&self, other: &CompressedBitmap) -> Result<()> {
        if self.bit_count != other.bit_count {
            return Err(PlannerError::BitmapOperandMismatch {
                left: self.bit_count,
                right: other.bit_count,
            });
        }
        Ok(())
    }

    pub fn and(&self, other: &CompressedBitmap) -> Result<CompressedBitmap> {
        self.check_length(other)?;
        Ok(self.zip_words(other, |a, b| a & b))
    }

    pub fn or(&self, other: &CompressedBitmap) -> Result<CompressedBitmap> {
        self.check_length(other)?;
        Ok(self.zip_words(other, |a, b| a | b))
    }

    pub fn xor(&self, other: &CompressedBitmap) -> Result<CompressedBitmap> {
        self.check_length(other)?;
        Ok(self.zip_words(other, |a, b| a ^ b))
    }

    pub fn and_not(&self, other: &CompressedBitmap) -> Result<CompressedBitmap> {
        self.check_length(other)?;
        Ok(self.zip_words(other, |a, b| a & !b))
    }

    /// Complement. Bits beyond `bit_count` in the last word stay clear so the
    /// cardinality never counts padding.
    pub fn not(&self) -> CompressedBitmap {
        let mut result = CompressedBitmap {
            words: self.words.iter().map(|w| !w).collect(),
            bit_count: self.bit_count,
        };
        result.mask_trailing();
        result
    }

    fn zip_words(&self, other: &CompressedBitmap, f: impl Fn(u64, u64) -> u64) -> CompressedBitmap {
        let mut result = CompressedBitmap {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            bit_count: self.bit_count,
        };
        result.mask_trailing();
        result
    }

    fn mask_trailing(&mut self) {
        let tail_bits = self.bit_count % WORD_BITS;
        if tail_bits != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail_bits) - 1;
            }
        }
    }
}

// ============================================================================
// Per-Value Bitmap Index
// ============================================================================

/// Bitmap index model: one bitmap per distinct column value plus a null
/// bitmap. The planner uses this shape for cardinality analysis and the
/// executor mirror uses it to resolve supported conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueBitmapIndex {
    bitmaps: BTreeMap<Value, CompressedBitmap>,
    nulls: Option<CompressedBitmap>,
    row_count: usize,
}

impl ValueBitmapIndex {
    pub fn new(row_count: usize) -> Self {
        Self {
            bitmaps: BTreeMap::new(),
            nulls: None,
            row_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn distinct_values(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn insert(&mut self, value: Value, row_id: usize) -> Result<()> {
        if row_id >= self.row_count {
            return Err(PlannerError::BitmapOperandMismatch {
                left: row_id,
                right: self.row_count,
            });
        }
        if value.is_null() {
            let nulls = self
                .nulls
                .get_or_insert_with(|| CompressedBitmap::new(self.row_count));
            return nulls.set(row_id);
        }
        self.bitmaps
            .entry(value)
            .or_insert_with(|| CompressedBitmap::new(self.row_count))
            .set(row_id)
    }

    /// Rows equal to the value. Absent values yield an empty bitmap.
    pub fn equals(&self, value: &Value) -> CompressedBitmap {
        self.bitmaps
            .get(value)
            .cloned()
            .unwrap_or_else(|| CompressedBitmap::new(self.row_count))
    }

    /// Rows matching any of the given values.
    pub fn in_list(&self, values: &[Value]) -> Result<CompressedBitmap> {
        let mut result = CompressedBitmap::new(self.row_count);
        for value in values {
            if let Some(bitmap) = self.bitmaps.get(value) {
                result = result.or(bitmap)?;
            }
        }
        Ok(result)
    }

    /// Rows not equal to the value (null rows excluded).
    pub fn not_equals(&self, value: &Value) -> Result<CompressedBitmap> {
        let mut result = self.equals(value).not();
        if let Some(nulls) = &self.nulls {
            result = result.and_not(nulls)?;
        }
        Ok(result)
    }

    /// Null or non-null rows.
    pub fn is_null(&self, null: bool) -> CompressedBitmap {
        let nulls = self
            .nulls
            .clone()
            .unwrap_or_else(|| CompressedBitmap::new(self.row_count));
        if null {
            nulls
        } else {
            nulls.not()
        }
    }
}

// ============================================================================
// Usability Analysis
// ============================================================================

/// Whether bitmap planning supports the condition shape at all.
pub fn condition_supported(condition: &FieldCondition) -> bool {
    matches!(
        condition,
        FieldCondition::Equals(_) | FieldCondition::In(_) | FieldCondition::IsNull(_)
    )
}

/// Whether a column qualifies for bitmap access: supported condition and a
/// distinct count at or below the cardinality ceiling. An unknown distinct
/// count disqualifies the column rather than guessing.
pub fn bitmap_usable(
    condition: &FieldCondition,
    distinct_count: Option<u64>,
    max_cardinality: u64,
) -> bool {
    if !condition_supported(condition) {
        return false;
    }
    match distinct_count {
        Some(distinct) => distinct <= max_cardinality,
        None => false,
    }
}

/// Usability check with the default cardinality ceiling.
pub fn bitmap_usable_default(condition: &FieldCondition, distinct_count: Option<u64>) -> bool {
    bitmap_usable(condition, distinct_count, DEFAULT_BITMAP_MAX_CARDINALITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ValueRange;

    #[test]
    fn test_set_get_cardinality() {
        let mut bitmap = CompressedBitmap::new(100);
        bitmap.set(0).unwrap();
        bitmap.set(63).unwrap();
        bitmap.set(64).unwrap();
        bitmap.set(99).unwrap();
        assert!(bitmap.get(63));
        assert!(!bitmap.get(50));
        assert_eq!(bitmap.cardinality(), 4);
        assert_eq!(bitmap.ones(), vec![0, 63, 64, 99]);
        assert!(bitmap.set(100).is_err());
    }

    #[test]
    fn test_boolean_algebra() {
        let mut a = CompressedBitmap::new(10);
        let mut b = CompressedBitmap::new(10);
        a.set(1).unwrap();
        a.set(2).unwrap();
        b.set(2).unwrap();
        b.set(3).unwrap();

        assert_eq!(a.and(&b).unwrap().ones(), vec![2]);
        assert_eq!(a.or(&b).unwrap().ones(), vec![1, 2, 3]);
        assert_eq!(a.xor(&b).unwrap().ones(), vec![1, 3]);
        assert_eq!(a.and_not(&b).unwrap().ones(), vec![1]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let a = CompressedBitmap::new(10);
        let b = CompressedBitmap::new(20);
        assert!(matches!(
            a.and(&b),
            Err(PlannerError::BitmapOperandMismatch { left: 10, right: 20 })
        ));
    }

    #[test]
    fn test_not_masks_padding_bits() {
        // 70 bits leaves 58 padding bits in the second word; NOT must not
        // count them.
        let bitmap = CompressedBitmap::new(70);
        let complement = bitmap.not();
        assert_eq!(complement.cardinality(), 70);
        assert!(!complement.get(70));
        assert_eq!(complement.not().cardinality(), 0);
    }

    #[test]
    fn test_value_index_equals_and_in() {
        let mut index = ValueBitmapIndex::new(6);
        index.insert(Value::String("a".into()), 0).unwrap();
        index.insert(Value::String("a".into()), 3).unwrap();
        index.insert(Value::String("b".into()), 1).unwrap();
        index.insert(Value::String("c".into()), 2).unwrap();
        index.insert(Value::Null, 4).unwrap();
        index.insert(Value::String("b".into()), 5).unwrap();

        assert_eq!(index.equals(&Value::String("a".into())).ones(), vec![0, 3]);
        assert!(index.equals(&Value::String("zz".into())).is_empty());

        let either = index
            .in_list(&[Value::String("a".into()), Value::String("c".into())])
            .unwrap();
        assert_eq!(either.ones(), vec![0, 2, 3]);
        assert_eq!(index.distinct_values(), 3);
    }

    #[test]
    fn test_not_equals_excludes_nulls() {
        let mut index = ValueBitmapIndex::new(4);
        index.insert(Value::Integer(1), 0).unwrap();
        index.insert(Value::Integer(2), 1).unwrap();
        index.insert(Value::Null, 2).unwrap();
        index.insert(Value::Integer(1), 3).unwrap();

        let not_one = index.not_equals(&Value::Integer(1)).unwrap();
        assert_eq!(not_one.ones(), vec![1]);

        assert_eq!(index.is_null(true).ones(), vec![2]);
        assert_eq!(index.is_null(false).ones(), vec![0, 1, 3]);
    }

    #[test]
    fn test_usability_analysis() {
        let eq = FieldCondition::Equals(Value::Integer(1));
        assert!(bitmap_usable(&eq, Some(3), 100));
        assert!(!bitmap_usable(&eq, Some(101), 100));
        assert!(!bitmap_usable(&eq, None, 100));
        assert!(bitmap_usable_default(&eq, Some(100)));

        let range = FieldCondition::Range(ValueRange::at_least(Value::Integer(0), true));
        assert!(!bitmap_usable(&range, Some(3), 100));
    }
}
