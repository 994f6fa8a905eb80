// Plan Operator Algebra
//
// The physical operators candidate plans are built from. Plans are immutable
// owned trees: the enumerator builds them, the cost estimator walks them, and
// the rewriter returns replacements rather than mutating in place.

use crate::common::{BoundingBox, IndexDescriptor, IndexField, SortDescriptor, Value};
use crate::predicate::condition::{BoundCondition, FieldCondition};
use crate::predicate::{Predicate, TextSearchMode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an index scan with the given satisfied conditions yields rows in
/// the requested order.
///
/// Leading key fields pinned by an equality contribute a single value each,
/// so they drop out of the ordering comparison: a compound `(status,
/// created_at)` index scanned with `status = x` still delivers rows ordered
/// by `created_at`.
pub fn scan_ordering_satisfied(
    index: &IndexDescriptor,
    satisfied: &[BoundCondition],
    reverse: bool,
    sort: &[SortDescriptor],
) -> bool {
    if sort.is_empty() {
        return true;
    }
    let mut key_fields: &[IndexField] = &index.key_fields;
    while let Some((first, rest)) = key_fields.split_first() {
        let sort_leads_here = sort.first().map_or(false, |s| s.field == first.name);
        let pinned = satisfied.iter().any(|c| {
            !c.negated
                && c.field_name() == first.name
                && matches!(c.condition, FieldCondition::Equals(_))
        });
        if pinned && !sort_leads_here {
            key_fields = rest;
        } else {
            break;
        }
    }
    if sort.len() > key_fields.len() {
        return false;
    }
    sort.iter().zip(key_fields.iter()).all(|(s, k)| {
        let effective = if reverse { k.order.reversed() } else { k.order };
        s.field == k.name && s.order == effective
    })
}

/// How a bitmap combine merges its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitmapCombineOp {
    And,
    Or,
}

/// A physical plan operator.
///
/// Scan variants record the conditions the access enforces through its key
/// bounds (satisfied conditions), the driving index, and whether the scan
/// runs in reverse key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanOperator {
    /// Full scan of the primary record store.
    TableScan { record_type: String },

    /// Range scan over an index, fetching each matching record.
    IndexScan {
        index: IndexDescriptor,
        satisfied: Vec<BoundCondition>,
        reverse: bool,
    },

    /// Index scan answered entirely from index data; no record fetches.
    IndexOnlyScan {
        index: IndexDescriptor,
        satisfied: Vec<BoundCondition>,
        reverse: bool,
    },

    /// Point probes for an explicit list of key tuples.
    IndexSeek {
        index: IndexDescriptor,
        keys: Vec<Vec<Value>>,
        satisfied: Vec<BoundCondition>,
        reverse: bool,
    },

    Union {
        children: Vec<PlanOperator>,
        deduplicate: bool,
    },

    Intersection { children: Vec<PlanOperator> },

    Filter {
        input: Box<PlanOperator>,
        predicate: Predicate,
        /// Fraction of input records expected to pass.
        selectivity: f64,
    },

    Sort {
        input: Box<PlanOperator>,
        sort: Vec<SortDescriptor>,
    },

    Limit {
        input: Box<PlanOperator>,
        limit: Option<usize>,
        offset: Option<usize>,
    },

    Project {
        input: Box<PlanOperator>,
        fields: Vec<String>,
    },

    FullTextScan {
        index: IndexDescriptor,
        field: String,
        terms: Vec<String>,
        mode: TextSearchMode,
    },

    VectorSearch {
        index: IndexDescriptor,
        field: String,
        k: usize,
        ef_search: usize,
    },

    SpatialScan {
        index: IndexDescriptor,
        field: String,
        region: BoundingBox,
    },

    /// Pre-aggregated index lookup.
    Aggregation {
        index: IndexDescriptor,
        group_by: Vec<String>,
    },

    /// Per-value bitmap read for one supported condition.
    BitmapScan {
        index: IndexDescriptor,
        condition: BoundCondition,
    },

    /// Word-wise combination of bitmap scans feeding record fetches.
    BitmapCombine {
        op: BitmapCombineOp,
        children: Vec<PlanOperator>,
    },
}

impl PlanOperator {
    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Immediate children, in execution order.
    pub fn children(&self) -> Vec<&PlanOperator> {
        match self {
            PlanOperator::Union { children, .. }
            | PlanOperator::Intersection { children }
            | PlanOperator::BitmapCombine { children, .. } => children.iter().collect(),
            PlanOperator::Filter { input, .. }
            | PlanOperator::Sort { input, .. }
            | PlanOperator::Limit { input, .. }
            | PlanOperator::Project { input, .. } => vec![input.as_ref()],
            _ => Vec::new(),
        }
    }

    /// The access operator at the bottom of a wrapper chain. Multi-child
    /// operators return themselves.
    pub fn leaf_access(&self) -> &PlanOperator {
        match self {
            PlanOperator::Filter { input, .. }
            | PlanOperator::Sort { input, .. }
            | PlanOperator::Limit { input, .. }
            | PlanOperator::Project { input, .. } => input.leaf_access(),
            other => other,
        }
    }

    /// Whether any operator in the tree drives the named index.
    pub fn references_index(&self, name: &str) -> bool {
        let own = match self {
            PlanOperator::IndexScan { index, .. }
            | PlanOperator::IndexOnlyScan { index, .. }
            | PlanOperator::IndexSeek { index, .. }
            | PlanOperator::FullTextScan { index, .. }
            | PlanOperator::VectorSearch { index, .. }
            | PlanOperator::SpatialScan { index, .. }
            | PlanOperator::Aggregation { index, .. }
            | PlanOperator::BitmapScan { index, .. } => index.name == name,
            _ => false,
        };
        own || self.children().iter().any(|c| c.references_index(name))
    }

    /// Whether the subtree's output already satisfies the requested ordering.
    ///
    /// A single-key seek satisfies any ordering; a vector search is
    /// similarity-ordered by construction. Unions and intersections produce
    /// unordered output.
    pub fn satisfies_ordering(&self, sort: &[SortDescriptor]) -> bool {
        if sort.is_empty() {
            return true;
        }
        match self {
            PlanOperator::IndexScan {
                index,
                satisfied,
                reverse,
            }
            | PlanOperator::IndexOnlyScan {
                index,
                satisfied,
                reverse,
            } => scan_ordering_satisfied(index, satisfied, *reverse, sort),
            PlanOperator::IndexSeek {
                index,
                keys,
                satisfied,
                reverse,
            } => keys.len() <= 1 || scan_ordering_satisfied(index, satisfied, *reverse, sort),
            PlanOperator::VectorSearch { .. } => true,
            PlanOperator::Sort { sort: own, .. } => {
                sort.len() <= own.len() && own[..sort.len()] == *sort
            }
            PlanOperator::Filter { input, .. }
            | PlanOperator::Limit { input, .. }
            | PlanOperator::Project { input, .. } => input.satisfies_ordering(sort),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Complexity
    // ------------------------------------------------------------------

    /// Recursive complexity weight checked against `complexity_threshold`.
    pub fn complexity(&self) -> usize {
        match self {
            PlanOperator::TableScan { .. }
            | PlanOperator::IndexScan { .. }
            | PlanOperator::IndexOnlyScan { .. }
            | PlanOperator::IndexSeek { .. } => 1,
            PlanOperator::FullTextScan { .. }
            | PlanOperator::VectorSearch { .. }
            | PlanOperator::SpatialScan { .. }
            | PlanOperator::Aggregation { .. }
            | PlanOperator::BitmapScan { .. } => 2,
            PlanOperator::Filter { input, .. } | PlanOperator::Sort { input, .. } => {
                input.complexity() + 1
            }
            PlanOperator::Limit { input, .. } | PlanOperator::Project { input, .. } => {
                input.complexity()
            }
            PlanOperator::Union { children, .. }
            | PlanOperator::BitmapCombine { children, .. } => {
                children.iter().map(PlanOperator::complexity).sum::<usize>() + children.len()
            }
            PlanOperator::Intersection { children } => {
                2 * children.iter().map(PlanOperator::complexity).sum::<usize>()
            }
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// One-line human summary of this operator alone.
    pub fn summary(&self) -> String {
        match self {
            PlanOperator::TableScan { record_type } => format!("TableScan({})", record_type),
            PlanOperator::IndexScan {
                index,
                satisfied,
                reverse,
            } => format!(
                "IndexScan({}, satisfied: {}, reverse: {})",
                index.name,
                satisfied.len(),
                reverse
            ),
            PlanOperator::IndexOnlyScan {
                index,
                satisfied,
                reverse,
            } => format!(
                "IndexOnlyScan({}, satisfied: {}, reverse: {})",
                index.name,
                satisfied.len(),
                reverse
            ),
            PlanOperator::IndexSeek { index, keys, .. } => {
                format!("IndexSeek({}, keys: {})", index.name, keys.len())
            }
            PlanOperator::Union {
                children,
                deduplicate,
            } => format!("Union({} children, dedup: {})", children.len(), deduplicate),
            PlanOperator::Intersection { children } => {
                format!("Intersection({} children)", children.len())
            }
            PlanOperator::Filter {
                predicate,
                selectivity,
                ..
            } => format!("Filter({}, selectivity: {:.3})", predicate, selectivity),
            PlanOperator::Sort { sort, .. } => {
                let keys: Vec<String> = sort.iter().map(|s| s.to_string()).collect();
                format!("Sort({})", keys.join(", "))
            }
            PlanOperator::Limit { limit, offset, .. } => format!(
                "Limit(limit: {}, offset: {})",
                limit.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
                offset.map(|o| o.to_string()).unwrap_or_else(|| "-".into())
            ),
            PlanOperator::Project { fields, .. } => {
                format!("Project({})", fields.join(", "))
            }
            PlanOperator::FullTextScan { index, terms, .. } => {
                format!("FullTextScan({}, terms: {})", index.name, terms.len())
            }
            PlanOperator::VectorSearch {
                index, k, ef_search, ..
            } => format!("VectorSearch({}, k: {}, ef: {})", index.name, k, ef_search),
            PlanOperator::SpatialScan { index, .. } => format!("SpatialScan({})", index.name),
            PlanOperator::Aggregation { index, group_by } => {
                format!("Aggregation({}, groups: {})", index.name, group_by.len())
            }
            PlanOperator::BitmapScan { index, condition } => {
                format!("BitmapScan({}, {})", index.name, condition)
            }
            PlanOperator::BitmapCombine { op, children } => {
                format!("BitmapCombine({:?}, {} children)", op, children.len())
            }
        }
    }

    /// Indented multi-line rendering of the whole tree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&self.summary());
        out.push('\n');
        for child in self.children() {
            child.explain_into(out, depth + 1);
        }
    }
}

impl fmt::Display for PlanOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
