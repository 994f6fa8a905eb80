// HyperLogLog++
//
// Probabilistic distinct-count sketch with dense 6-bit-equivalent registers
// (stored one per byte). Values hash through SHA-256 over their canonical
// encoding, so sketches built on different platforms or releases agree
// exactly. With a 64-bit hash the large-range correction of the original
// paper is unnecessary; the small-range regime falls back to linear counting.

use crate::common::Value;
use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default precision: 2^14 registers, ~0.8% standard error.
pub const DEFAULT_HLL_PRECISION: u8 = 14;

const MIN_PRECISION: u8 = 4;
const MAX_PRECISION: u8 = 16;

/// HyperLogLog++ cardinality sketch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new(DEFAULT_HLL_PRECISION).expect("default precision is valid")
    }
}

impl HyperLogLog {
    pub fn new(precision: u8) -> Result<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(PlannerError::InvalidConfiguration {
                option: "hll_precision".to_string(),
                reason: format!(
                    "precision {} outside [{}, {}]",
                    precision, MIN_PRECISION, MAX_PRECISION
                ),
            });
        }
        Ok(Self {
            precision,
            registers: vec![0; 1 << precision],
        })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Stable 64-bit hash of a value.
    pub fn hash_value(value: &Value) -> u64 {
        let digest = Sha256::digest(value.canonical_encoding().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }

    pub fn insert(&mut self, value: &Value) {
        self.insert_hash(Self::hash_value(value));
    }

    pub fn insert_hash(&mut self, hash: u64) {
        let index = (hash >> (64 - self.precision)) as usize;
        let remainder = hash << self.precision;
        // Rank of the first set bit in the remaining stream, 1-based; an
        // all-zero remainder gets the maximum rank.
        let rank = if remainder == 0 {
            (64 - self.precision) + 1
        } else {
            remainder.leading_zeros() as u8 + 1
        };
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Estimated distinct count.
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-i32::from(r)))
            .sum();
        let raw = Self::alpha(self.registers.len()) * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw <= 2.5 * m && zeros > 0 {
            // Linear counting for the small-range regime.
            m * (m / zeros as f64).ln()
        } else {
            raw
        }
    }

    /// Merge another sketch of the same precision into this one.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<()> {
        if self.precision != other.precision {
            return Err(PlannerError::InvalidConfiguration {
                option: "hll_precision".to_string(),
                reason: format!(
                    "cannot merge precision {} into {}",
                    other.precision, self.precision
                ),
            });
        }
        for (mine, theirs) in self.registers.iter_mut().zip(other.registers.iter()) {
            if theirs > mine {
                *mine = *theirs;
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    fn alpha(m: usize) -> f64 {
        match m {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_bounds() {
        assert!(HyperLogLog::new(3).is_err());
        assert!(HyperLogLog::new(17).is_err());
        assert!(HyperLogLog::new(14).is_ok());
    }

    #[test]
    fn test_empty_estimates_zero() {
        let hll = HyperLogLog::default();
        assert!(hll.is_empty());
        assert_eq!(hll.estimate(), 0.0);
    }

    #[test]
    fn test_small_cardinality_is_accurate() {
        let mut hll = HyperLogLog::default();
        for i in 0..100 {
            hll.insert(&Value::Integer(i));
        }
        let estimate = hll.estimate();
        assert!((estimate - 100.0).abs() < 5.0, "estimate {estimate}");
    }

    #[test]
    fn test_duplicates_do_not_inflate() {
        let mut hll = HyperLogLog::default();
        for _ in 0..50 {
            for i in 0..20 {
                hll.insert(&Value::Integer(i));
            }
        }
        let estimate = hll.estimate();
        assert!((estimate - 20.0).abs() < 3.0, "estimate {estimate}");
    }

    #[test]
    fn test_large_cardinality_within_error() {
        let mut hll = HyperLogLog::default();
        let n = 50_000;
        for i in 0..n {
            hll.insert(&Value::Integer(i));
        }
        let estimate = hll.estimate();
        let error = (estimate - n as f64).abs() / n as f64;
        assert!(error < 0.05, "relative error {error}");
    }

    #[test]
    fn test_merge_unions_sketches() {
        let mut a = HyperLogLog::new(12).unwrap();
        let mut b = HyperLogLog::new(12).unwrap();
        for i in 0..1000 {
            a.insert(&Value::Integer(i));
        }
        for i in 500..1500 {
            b.insert(&Value::Integer(i));
        }
        a.merge(&b).unwrap();
        let estimate = a.estimate();
        let error = (estimate - 1500.0).abs() / 1500.0;
        assert!(error < 0.08, "relative error {error}");
    }

    #[test]
    fn test_merge_rejects_mixed_precision() {
        let mut a = HyperLogLog::new(12).unwrap();
        let b = HyperLogLog::new(14).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_hash_is_stable() {
        let v = Value::String("stable".into());
        assert_eq!(HyperLogLog::hash_value(&v), HyperLogLog::hash_value(&v));
        assert_ne!(
            HyperLogLog::hash_value(&Value::Integer(1)),
            HyperLogLog::hash_value(&Value::Float(1.0))
        );
    }
}
