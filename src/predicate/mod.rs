// Predicate Model
//
// The logical predicate tree a query carries: comparisons over record fields,
// specialized search atoms (text, spatial, vector), and boolean combinators.
// Simplification and canonical keys live here; normal forms live in
// `normalize`, typed field conditions in `condition`.

pub mod condition;
pub mod normalize;

use crate::common::{BoundingBox, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Comparison Operators
// ============================================================================

/// Operator of a field comparison atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
    In,
    Contains,
    HasPrefix,
    HasSuffix,
}

impl ComparisonOp {
    /// Algebraic negation, where one exists.
    ///
    /// `In`, `Contains`, `HasPrefix`, and `HasSuffix` have no inverse in the
    /// operator set; NNF keeps a `Not` wrapper around them to preserve
    /// semantics.
    pub fn negated(self) -> Option<Self> {
        match self {
            ComparisonOp::Eq => Some(ComparisonOp::Ne),
            ComparisonOp::Ne => Some(ComparisonOp::Eq),
            ComparisonOp::Lt => Some(ComparisonOp::Ge),
            ComparisonOp::Ge => Some(ComparisonOp::Lt),
            ComparisonOp::Le => Some(ComparisonOp::Gt),
            ComparisonOp::Gt => Some(ComparisonOp::Le),
            ComparisonOp::IsNull => Some(ComparisonOp::IsNotNull),
            ComparisonOp::IsNotNull => Some(ComparisonOp::IsNull),
            ComparisonOp::In
            | ComparisonOp::Contains
            | ComparisonOp::HasPrefix
            | ComparisonOp::HasSuffix => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::IsNull => "IS NULL",
            ComparisonOp::IsNotNull => "IS NOT NULL",
            ComparisonOp::In => "IN",
            ComparisonOp::Contains => "CONTAINS",
            ComparisonOp::HasPrefix => "HAS PREFIX",
            ComparisonOp::HasSuffix => "HAS SUFFIX",
        }
    }
}

/// How multiple text-search terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextSearchMode {
    /// Every term must match.
    All,
    /// Any term may match.
    Any,
    /// Terms must match as a contiguous phrase.
    Phrase,
}

// ============================================================================
// Predicate Tree
// ============================================================================

/// A field comparison atom: `field op operands`.
///
/// `operands` is empty for null checks, a single value for binary operators,
/// and the value list for `In`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field: String,
    pub op: ComparisonOp,
    pub operands: Vec<Value>,
}

impl FieldComparison {
    /// The single operand of a binary comparison.
    pub fn operand(&self) -> Option<&Value> {
        self.operands.first()
    }
}

/// The logical predicate tree.
///
/// `And`/`Or` children are non-empty by construction; [`simplify`]
/// (Predicate::simplify) restores that invariant after algebraic rewrites by
/// collapsing empty conjunctions to `True` and empty disjunctions to `False`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    True,
    False,
    Comparison(FieldComparison),
    /// Full-text search atom.
    TextSearch {
        field: String,
        terms: Vec<String>,
        mode: TextSearchMode,
    },
    /// Spatial containment atom.
    WithinRegion { field: String, region: BoundingBox },
    /// Vector nearest-neighbor atom.
    NearestNeighbors {
        field: String,
        vector: Vec<f32>,
        k: usize,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    fn comparison(field: impl Into<String>, op: ComparisonOp, operands: Vec<Value>) -> Self {
        Predicate::Comparison(FieldComparison {
            field: field.into(),
            op,
            operands,
        })
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Eq, vec![value])
    }

    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Ne, vec![value])
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Lt, vec![value])
    }

    pub fn le(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Le, vec![value])
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Gt, vec![value])
    }

    pub fn ge(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(field, ComparisonOp::Ge, vec![value])
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::comparison(field, ComparisonOp::IsNull, vec![])
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::comparison(field, ComparisonOp::IsNotNull, vec![])
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::comparison(field, ComparisonOp::In, values)
    }

    pub fn contains(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::comparison(field, ComparisonOp::Contains, vec![Value::String(pattern.into())])
    }

    pub fn has_prefix(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::comparison(field, ComparisonOp::HasPrefix, vec![Value::String(pattern.into())])
    }

    pub fn has_suffix(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::comparison(field, ComparisonOp::HasSuffix, vec![Value::String(pattern.into())])
    }

    pub fn text_search(
        field: impl Into<String>,
        terms: Vec<String>,
        mode: TextSearchMode,
    ) -> Self {
        Predicate::TextSearch {
            field: field.into(),
            terms,
            mode,
        }
    }

    pub fn within_region(field: impl Into<String>, region: BoundingBox) -> Self {
        Predicate::WithinRegion {
            field: field.into(),
            region,
        }
    }

    pub fn nearest_neighbors(field: impl Into<String>, vector: Vec<f32>, k: usize) -> Self {
        Predicate::NearestNeighbors {
            field: field.into(),
            vector,
            k,
        }
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        match children.len() {
            0 => Predicate::True,
            1 => children.into_iter().next().unwrap(),
            _ => Predicate::And(children),
        }
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        match children.len() {
            0 => Predicate::False,
            1 => children.into_iter().next().unwrap(),
            _ => Predicate::Or(children),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Whether this node is an atom (no boolean structure underneath).
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Predicate::True
                | Predicate::False
                | Predicate::Comparison(_)
                | Predicate::TextSearch { .. }
                | Predicate::WithinRegion { .. }
                | Predicate::NearestNeighbors { .. }
        )
    }

    /// Whether this node is a literal: an atom or a negated atom.
    pub fn is_literal(&self) -> bool {
        match self {
            Predicate::Not(inner) => inner.is_atom(),
            _ => self.is_atom(),
        }
    }

    /// Collect every field name referenced anywhere in the tree.
    pub fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Predicate::True | Predicate::False => {}
            Predicate::Comparison(c) => {
                out.insert(c.field.clone());
            }
            Predicate::TextSearch { field, .. }
            | Predicate::WithinRegion { field, .. }
            | Predicate::NearestNeighbors { field, .. } => {
                out.insert(field.clone());
            }
            Predicate::Not(inner) => inner.collect_fields(out),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Canonical Keys
    // ------------------------------------------------------------------

    /// Deterministic recursive key for structural deduplication.
    ///
    /// Built lexicographically over sorted child keys so commutative
    /// rearrangements collapse: `And(a, b)` and `And(b, a)` share one key.
    /// The key is part of the crate's stability contract and never depends on
    /// `std::hash` internals.
    pub fn canonical_key(&self) -> String {
        match self {
            Predicate::True => "true".to_string(),
            Predicate::False => "false".to_string(),
            Predicate::Comparison(c) => {
                let operands: Vec<String> =
                    c.operands.iter().map(Value::canonical_encoding).collect();
                format!("cmp({}|{}|{})", c.field, c.op.symbol(), operands.join(","))
            }
            Predicate::TextSearch { field, terms, mode } => {
                format!("text({}|{:?}|{})", field, mode, terms.join(","))
            }
            Predicate::WithinRegion { field, region } => format!(
                "spatial({}|{:016x},{:016x},{:016x},{:016x})",
                field,
                region.min_x.to_bits(),
                region.min_y.to_bits(),
                region.max_x.to_bits(),
                region.max_y.to_bits()
            ),
            Predicate::NearestNeighbors { field, vector, k } => {
                let dims: Vec<String> =
                    vector.iter().map(|d| format!("{:08x}", d.to_bits())).collect();
                format!("vector({}|{}|{})", field, k, dims.join(","))
            }
            Predicate::Not(inner) => format!("not({})", inner.canonical_key()),
            Predicate::And(children) => {
                let mut keys: Vec<String> =
                    children.iter().map(Predicate::canonical_key).collect();
                keys.sort();
                format!("and({})", keys.join(","))
            }
            Predicate::Or(children) => {
                let mut keys: Vec<String> =
                    children.iter().map(Predicate::canonical_key).collect();
                keys.sort();
                format!("or({})", keys.join(","))
            }
        }
    }

    // ------------------------------------------------------------------
    // Simplification
    // ------------------------------------------------------------------

    /// Flatten nested like-kind nodes, absorb `True`/`False`, deduplicate
    /// children by canonical key, and collapse single-child combinators.
    pub fn simplify(self) -> Predicate {
        match self {
            Predicate::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                let mut seen = BTreeSet::new();
                for child in children {
                    match child.simplify() {
                        Predicate::True => {}
                        Predicate::False => return Predicate::False,
                        Predicate::And(grandchildren) => {
                            for gc in grandchildren {
                                if seen.insert(gc.canonical_key()) {
                                    flat.push(gc);
                                }
                            }
                        }
                        other => {
                            if seen.insert(other.canonical_key()) {
                                flat.push(other);
                            }
                        }
                    }
                }
                Predicate::and(flat)
            }
            Predicate::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                let mut seen = BTreeSet::new();
                for child in children {
                    match child.simplify() {
                        Predicate::False => {}
                        Predicate::True => return Predicate::True,
                        Predicate::Or(grandchildren) => {
                            for gc in grandchildren {
                                if seen.insert(gc.canonical_key()) {
                                    flat.push(gc);
                                }
                            }
                        }
                        other => {
                            if seen.insert(other.canonical_key()) {
                                flat.push(other);
                            }
                        }
                    }
                }
                Predicate::or(flat)
            }
            Predicate::Not(inner) => match inner.simplify() {
                Predicate::True => Predicate::False,
                Predicate::False => Predicate::True,
                simplified => Predicate::not(simplified),
            },
            atom => atom,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::False => write!(f, "FALSE"),
            Predicate::Comparison(c) => match c.op {
                ComparisonOp::IsNull | ComparisonOp::IsNotNull => {
                    write!(f, "{} {}", c.field, c.op.symbol())
                }
                ComparisonOp::In => {
                    write!(f, "{} IN (", c.field)?;
                    for (i, v) in c.operands.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", v)?;
                    }
                    write!(f, ")")
                }
                _ => write!(
                    f,
                    "{} {} {}",
                    c.field,
                    c.op.symbol(),
                    c.operands.first().map(|v| v.to_string()).unwrap_or_default()
                ),
            },
            Predicate::TextSearch { field, terms, mode } => {
                write!(f, "{} MATCHES({:?}, {})", field, mode, terms.join(" "))
            }
            Predicate::WithinRegion { field, .. } => write!(f, "{} WITHIN region", field),
            Predicate::NearestNeighbors { field, k, .. } => {
                write!(f, "{} NEAREST {} neighbors", field, k)
            }
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::And(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Predicate::Or(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " OR ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}
