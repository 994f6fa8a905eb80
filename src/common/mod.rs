// # Common Types
//
// Shared types used across all planner modules: record values, sort
// descriptors, value ranges, and index descriptors. These are the vocabulary
// the planner shares with its external collaborators (storage reader,
// statistics collection, executors).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// Values
// ============================================================================

/// Semantic type of a record field, inferred from the values that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    String,
    Bytes,
    Timestamp,
    Array,
    Unknown,
}

/// A record field value.
///
/// Values of different variants order by type rank first, then by payload, so
/// that any two values have a deterministic total order. The planner relies on
/// this for histogram bucket lookup and for per-value bitmap maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean true/false
    Boolean(bool),

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Float(f64),

    /// Variable-length string (UTF-8)
    String(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// Timestamp (microseconds since epoch)
    Timestamp(i64),

    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Semantic type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Null => FieldType::Unknown,
            Value::Boolean(_) => FieldType::Boolean,
            Value::Integer(_) => FieldType::Integer,
            Value::Float(_) => FieldType::Float,
            Value::String(_) => FieldType::String,
            Value::Bytes(_) => FieldType::Bytes,
            Value::Timestamp(_) => FieldType::Timestamp,
            Value::Array(_) => FieldType::Array,
        }
    }

    /// Rank used to order values of different variants.
    pub fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Array(_) => 7,
        }
    }

    /// Numeric view of the value, used for histogram bucket interpolation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Timestamp(t) => Some(*t as f64),
            _ => None,
        }
    }

    /// Canonical textual encoding.
    ///
    /// Stable across platforms and releases: used as the hash input for
    /// distinct-count sketches and as the building block of predicate
    /// canonical keys. Floats encode via their bit pattern so that the
    /// encoding never depends on formatting.
    pub fn canonical_encoding(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => format!("b:{}", b),
            Value::Integer(i) => format!("i:{}", i),
            Value::Float(f) => format!("f:{:016x}", f.to_bits()),
            Value::String(s) => format!("s:{}", s),
            Value::Bytes(b) => {
                let mut out = String::with_capacity(2 + b.len() * 2);
                out.push_str("x:");
                for byte in b {
                    out.push_str(&format!("{:02x}", byte));
                }
                out
            }
            Value::Timestamp(t) => format!("t:{}", t),
            Value::Array(vs) => {
                let inner: Vec<String> = vs.iter().map(Value::canonical_encoding).collect();
                format!("a:[{}]", inner.join(","))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(t) => write!(f, "@{}", t),
            Value::Array(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

// ============================================================================
// Sorting
// ============================================================================

/// Sort direction for a field or an index key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// One component of a query's requested ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub field: String,
    pub order: SortOrder,
}

impl SortDescriptor {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

impl fmt::Display for SortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        write!(f, "{} {}", self.field, dir)
    }
}

// ============================================================================
// Value Ranges
// ============================================================================

/// A half-open or closed range constraint over field values.
///
/// Either bound may be absent; absent bounds are unbounded in that direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub lower: Option<Value>,
    pub upper: Option<Value>,
    pub lower_inclusive: bool,
    pub upper_inclusive: bool,
}

impl ValueRange {
    pub fn at_least(value: Value, inclusive: bool) -> Self {
        Self {
            lower: Some(value),
            upper: None,
            lower_inclusive: inclusive,
            upper_inclusive: false,
        }
    }

    pub fn at_most(value: Value, inclusive: bool) -> Self {
        Self {
            lower: None,
            upper: Some(value),
            lower_inclusive: false,
            upper_inclusive: inclusive,
        }
    }

    pub fn between(lower: Value, upper: Value) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_inclusive: true,
            upper_inclusive: true,
        }
    }

    /// Whether a value falls inside the range.
    pub fn contains(&self, value: &Value) -> bool {
        if let Some(lower) = &self.lower {
            match value.cmp(lower) {
                Ordering::Less => return false,
                Ordering::Equal if !self.lower_inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match value.cmp(upper) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.upper_inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// Merge another range into this one, tightening bounds.
    pub fn intersect(&mut self, other: &ValueRange) {
        match (&self.lower, &other.lower) {
            (None, Some(_)) => {
                self.lower = other.lower.clone();
                self.lower_inclusive = other.lower_inclusive;
            }
            (Some(a), Some(b)) if b > a || (b == a && !other.lower_inclusive) => {
                self.lower = other.lower.clone();
                self.lower_inclusive = other.lower_inclusive;
            }
            _ => {}
        }
        match (&self.upper, &other.upper) {
            (None, Some(_)) => {
                self.upper = other.upper.clone();
                self.upper_inclusive = other.upper_inclusive;
            }
            (Some(a), Some(b)) if b < a || (b == a && !other.upper_inclusive) => {
                self.upper = other.upper.clone();
                self.upper_inclusive = other.upper_inclusive;
            }
            _ => {}
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Some(v) => write!(f, "{}{}", if self.lower_inclusive { "[" } else { "(" }, v)?,
            None => write!(f, "(-inf")?,
        }
        write!(f, ", ")?;
        match &self.upper {
            Some(v) => write!(f, "{}{}", v, if self.upper_inclusive { "]" } else { ")" }),
            None => write!(f, "+inf)"),
        }
    }
}

// ============================================================================
// Spatial
// ============================================================================

/// Axis-aligned bounding box for spatial containment queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Fraction of the unit square this box covers, clamped to [0, 1].
    pub fn area_fraction(&self) -> f64 {
        let w = (self.max_x - self.min_x).max(0.0);
        let h = (self.max_y - self.min_y).max(0.0);
        (w * h).clamp(0.0, 1.0)
    }
}

// ============================================================================
// Index Descriptors
// ============================================================================

/// Kind of index structure backing an [`IndexDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Ordered key-value index (the default)
    BTree,
    /// Per-value bitmap index for low-cardinality columns
    Bitmap,
    /// Inverted text index
    FullText,
    /// R-tree spatial index
    Spatial,
    /// HNSW-style vector index
    Vector,
}

/// One key component of an index: field name plus stored direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub order: SortOrder,
}

impl IndexField {
    pub fn ascending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Descriptor of an index the storage layer exposes to the planner.
///
/// The planner never touches index contents; it only needs the shape: key
/// fields in order, extra covered fields, uniqueness, and the index kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub key_fields: Vec<IndexField>,
    pub covering_fields: Vec<String>,
    pub unique: bool,
    pub kind: IndexKind,
}

impl IndexDescriptor {
    pub fn btree(name: impl Into<String>, key_fields: Vec<IndexField>) -> Self {
        Self {
            name: name.into(),
            key_fields,
            covering_fields: Vec::new(),
            unique: false,
            kind: IndexKind::BTree,
        }
    }

    pub fn unique_btree(name: impl Into<String>, key_fields: Vec<IndexField>) -> Self {
        Self {
            unique: true,
            ..Self::btree(name, key_fields)
        }
    }

    pub fn with_covering(mut self, fields: Vec<String>) -> Self {
        self.covering_fields = fields;
        self
    }

    pub fn with_kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    /// Name of the leading key field, if any.
    pub fn leading_field(&self) -> Option<&str> {
        self.key_fields.first().map(|f| f.name.as_str())
    }

    /// Whether the index key and covering fields include every given field.
    pub fn covers<'a>(&self, mut fields: impl Iterator<Item = &'a str>) -> bool {
        fields.all(|f| {
            self.key_fields.iter().any(|k| k.name == f)
                || self.covering_fields.iter().any(|c| c == f)
        })
    }

    /// Whether scanning this index (optionally reversed) yields rows in the
    /// requested order.
    ///
    /// True when the leading key fields equal the sort fields pairwise by name
    /// and each direction matches after applying `reverse`. An empty sort is
    /// trivially satisfied.
    pub fn satisfies_ordering(&self, reverse: bool, sort: &[SortDescriptor]) -> bool {
        if sort.is_empty() {
            return true;
        }
        if sort.len() > self.key_fields.len() {
            return false;
        }
        sort.iter().zip(self.key_fields.iter()).all(|(s, k)| {
            let effective = if reverse { k.order.reversed() } else { k.order };
            s.field == k.name && s.order == effective
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_total_order() {
        assert!(Value::Null < Value::Boolean(false));
        assert!(Value::Integer(3) < Value::Integer(7));
        assert!(Value::Integer(100) < Value::Float(1.0)); // rank ordering
        assert!(Value::String("a".into()) < Value::String("b".into()));
    }

    #[test]
    fn test_value_canonical_encoding_distinguishes_types() {
        assert_ne!(
            Value::Integer(1).canonical_encoding(),
            Value::Float(1.0).canonical_encoding()
        );
        assert_eq!(
            Value::Float(1.5).canonical_encoding(),
            Value::Float(1.5).canonical_encoding()
        );
    }

    #[test]
    fn test_range_contains() {
        let range = ValueRange::between(Value::Integer(10), Value::Integer(20));
        assert!(range.contains(&Value::Integer(10)));
        assert!(range.contains(&Value::Integer(20)));
        assert!(!range.contains(&Value::Integer(9)));

        let open = ValueRange::at_least(Value::Integer(5), false);
        assert!(!open.contains(&Value::Integer(5)));
        assert!(open.contains(&Value::Integer(6)));
    }

    #[test]
    fn test_range_intersect_tightens() {
        let mut range = ValueRange::at_least(Value::Integer(1), true);
        range.intersect(&ValueRange::at_most(Value::Integer(9), true));
        assert!(range.contains(&Value::Integer(9)));
        assert!(!range.contains(&Value::Integer(10)));
    }

    #[test]
    fn test_index_ordering_check() {
        let idx = IndexDescriptor::btree(
            "idx_status_created",
            vec![
                IndexField::ascending("status"),
                IndexField::ascending("created_at"),
            ],
        );

        let sort = vec![SortDescriptor::ascending("status")];
        assert!(idx.satisfies_ordering(false, &sort));
        assert!(!idx.satisfies_ordering(true, &sort));

        let sort_desc = vec![SortDescriptor::descending("status")];
        assert!(idx.satisfies_ordering(true, &sort_desc));

        let wrong = vec![SortDescriptor::ascending("created_at")];
        assert!(!idx.satisfies_ordering(false, &wrong));
    }

    #[test]
    fn test_index_covering() {
        let idx = IndexDescriptor::btree("idx_a", vec![IndexField::ascending("a")])
            .with_covering(vec!["b".to_string()]);
        assert!(idx.covers(["a", "b"].into_iter()));
        assert!(!idx.covers(["a", "c"].into_iter()));
    }
}
