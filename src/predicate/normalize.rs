// Predicate Normalization
//
// NNF via De Morgan pushdown, then distribution into DNF (or CNF for index
// matching), then simplification. Distribution is guarded: the working term
// count and the recursion depth are checked before every extension, and a
// breach aborts with a structured error. The enumerator uses the tolerant
// `try_to_dnf` wrapper, which falls back to the original predicate.

use crate::config::{DEFAULT_MAX_DNF_DEPTH, DEFAULT_MAX_DNF_TERMS};
use crate::error::{ExplosionKind, PlannerError, Result};
use crate::predicate::Predicate;
use tracing::debug;

/// Normal-form converter with explosion protection.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_terms: usize,
    max_depth: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            max_terms: DEFAULT_MAX_DNF_TERMS,
            max_depth: DEFAULT_MAX_DNF_DEPTH,
        }
    }
}

impl Normalizer {
    pub fn new(max_terms: usize, max_depth: usize) -> Self {
        Self {
            max_terms,
            max_depth,
        }
    }

    // ------------------------------------------------------------------
    // Negation Normal Form
    // ------------------------------------------------------------------

    /// Push negations down to the atoms.
    ///
    /// Operators with an algebraic inverse are negated in place; the rest
    /// (`In`, `Contains`, prefix/suffix patterns, and the specialized search
    /// atoms) keep their `Not` wrapper, which preserves semantics.
    pub fn nnf(&self, predicate: &Predicate) -> Predicate {
        match predicate {
            Predicate::Not(inner) => self.nnf_negated(inner),
            Predicate::And(children) => {
                Predicate::And(children.iter().map(|c| self.nnf(c)).collect())
            }
            Predicate::Or(children) => {
                Predicate::Or(children.iter().map(|c| self.nnf(c)).collect())
            }
            atom => atom.clone(),
        }
    }

    fn nnf_negated(&self, inner: &Predicate) -> Predicate {
        match inner {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Not(grandchild) => self.nnf(grandchild),
            Predicate::And(children) => {
                Predicate::Or(children.iter().map(|c| self.nnf_negated(c)).collect())
            }
            Predicate::Or(children) => {
                Predicate::And(children.iter().map(|c| self.nnf_negated(c)).collect())
            }
            Predicate::Comparison(c) => match c.op.negated() {
                Some(negated_op) => {
                    let mut negated = c.clone();
                    negated.op = negated_op;
                    Predicate::Comparison(negated)
                }
                None => Predicate::not(inner.clone()),
            },
            atom => Predicate::not(atom.clone()),
        }
    }

    // ------------------------------------------------------------------
    // Disjunctive Normal Form
    // ------------------------------------------------------------------

    /// Convert to DNF: `Or` of `And` of literals, simplified.
    pub fn to_dnf(&self, predicate: &Predicate) -> Result<Predicate> {
        let nnf = self.nnf(predicate);
        let terms = self.dnf_terms(&nnf, 0)?;
        let disjuncts = terms.into_iter().map(Predicate::and).collect();
        Ok(Predicate::or(disjuncts).simplify())
    }

    /// Convert to CNF: `And` of `Or` of literals, simplified.
    pub fn to_cnf(&self, predicate: &Predicate) -> Result<Predicate> {
        let nnf = self.nnf(predicate);
        let clauses = self.cnf_clauses(&nnf, 0)?;
        let conjuncts = clauses.into_iter().map(Predicate::or).collect();
        Ok(Predicate::and(conjuncts).simplify())
    }

    /// Tolerant DNF conversion.
    ///
    /// On explosion the original predicate comes back unchanged together with
    /// `false`, signalling that DNF-based expansion is unavailable for this
    /// query. Planning continues either way.
    pub fn try_to_dnf(&self, predicate: &Predicate) -> (Predicate, bool) {
        match self.to_dnf(predicate) {
            Ok(converted) => (converted, true),
            Err(err) => {
                debug!(error = %err, "DNF conversion failed, keeping original predicate");
                (predicate.clone(), false)
            }
        }
    }

    /// Terms of the DNF: each inner vec is one conjunction of literals.
    ///
    /// `True` is the empty conjunction; `False` is the empty disjunction.
    fn dnf_terms(&self, predicate: &Predicate, depth: usize) -> Result<Vec<Vec<Predicate>>> {
        if depth > self.max_depth {
            return Err(PlannerError::NormalizationExplosion {
                kind: ExplosionKind::MaxDepth,
                limit: self.max_depth,
                reached: depth,
            });
        }
        match predicate {
            Predicate::True => Ok(vec![vec![]]),
            Predicate::False => Ok(vec![]),
            Predicate::Or(children) => {
                let mut terms: Vec<Vec<Predicate>> = Vec::new();
                for child in children {
                    for term in self.dnf_terms(child, depth + 1)? {
                        self.check_term_count(terms.len() + 1)?;
                        terms.push(term);
                    }
                }
                Ok(terms)
            }
            Predicate::And(children) => {
                // Distribute over child OR-term lists via Cartesian product.
                let mut acc: Vec<Vec<Predicate>> = vec![vec![]];
                for child in children {
                    let child_terms = self.dnf_terms(child, depth + 1)?;
                    if child_terms.is_empty() {
                        return Ok(vec![]);
                    }
                    let mut next = Vec::with_capacity(acc.len());
                    for base in &acc {
                        for term in &child_terms {
                            self.check_term_count(next.len() + 1)?;
                            let mut merged = base.clone();
                            merged.extend(term.iter().cloned());
                            next.push(merged);
                        }
                    }
                    acc = next;
                }
                Ok(acc)
            }
            // NNF guarantees anything else is a literal.
            literal => Ok(vec![vec![literal.clone()]]),
        }
    }

    /// Clauses of the CNF, dual to [`dnf_terms`](Self::dnf_terms).
    fn cnf_clauses(&self, predicate: &Predicate, depth: usize) -> Result<Vec<Vec<Predicate>>> {
        if depth > self.max_depth {
            return Err(PlannerError::NormalizationExplosion {
                kind: ExplosionKind::MaxDepth,
                limit: self.max_depth,
                reached: depth,
            });
        }
        match predicate {
            Predicate::True => Ok(vec![]),
            Predicate::False => Ok(vec![vec![]]),
            Predicate::And(children) => {
                let mut clauses: Vec<Vec<Predicate>> = Vec::new();
                for child in children {
                    for clause in self.cnf_clauses(child, depth + 1)? {
                        self.check_term_count(clauses.len() + 1)?;
                        clauses.push(clause);
                    }
                }
                Ok(clauses)
            }
            Predicate::Or(children) => {
                let mut acc: Vec<Vec<Predicate>> = vec![vec![]];
                for child in children {
                    let child_clauses = self.cnf_clauses(child, depth + 1)?;
                    if child_clauses.is_empty() {
                        return Ok(vec![]);
                    }
                    let mut next = Vec::with_capacity(acc.len());
                    for base in &acc {
                        for clause in &child_clauses {
                            self.check_term_count(next.len() + 1)?;
                            let mut merged = base.clone();
                            merged.extend(clause.iter().cloned());
                            next.push(merged);
                        }
                    }
                    acc = next;
                }
                Ok(acc)
            }
            literal => Ok(vec![vec![literal.clone()]]),
        }
    }

    fn check_term_count(&self, count: usize) -> Result<()> {
        if count > self.max_terms {
            return Err(PlannerError::NormalizationExplosion {
                kind: ExplosionKind::TermLimit,
                limit: self.max_terms,
                reached: count,
            });
        }
        Ok(())
    }
}
