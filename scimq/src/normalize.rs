//! Normalization of filter trees into disjunctive normal form.
//!
//! Negation is pushed into the leaves first, then AND is distributed over OR
//! until every disjunction is outermost. Products and the DNF itself are sets,
//! so logically equivalent rearrangements normalize to equal values.

use crate::ast::{CompareOp, Filter};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Operators of a normalized term.
///
/// The ordering comparisons complement into each other under negation
/// (`Eq↔Ne`, `Lt↔Ge`, `Le↔Gt`); the string and presence tests keep an explicit
/// negated mark because the store expresses them directly
/// (`NOT begins_with(...)`, `attribute_not_exists(...)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TermOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Sw,
    NotSw,
    Co,
    NotCo,
    Pr,
    NotPr,
}

impl TermOp {
    pub fn complement(self) -> TermOp {
        match self {
            TermOp::Eq => TermOp::Ne,
            TermOp::Ne => TermOp::Eq,
            TermOp::Lt => TermOp::Ge,
            TermOp::Ge => TermOp::Lt,
            TermOp::Le => TermOp::Gt,
            TermOp::Gt => TermOp::Le,
            TermOp::Sw => TermOp::NotSw,
            TermOp::NotSw => TermOp::Sw,
            TermOp::Co => TermOp::NotCo,
            TermOp::NotCo => TermOp::Co,
            TermOp::Pr => TermOp::NotPr,
            TermOp::NotPr => TermOp::Pr,
        }
    }

    pub fn takes_value(self) -> bool { !matches!(self, TermOp::Pr | TermOp::NotPr) }
}

impl From<CompareOp> for TermOp {
    fn from(op: CompareOp) -> Self {
        match op {
            CompareOp::Eq => TermOp::Eq,
            CompareOp::Ne => TermOp::Ne,
            CompareOp::Lt => TermOp::Lt,
            CompareOp::Le => TermOp::Le,
            CompareOp::Gt => TermOp::Gt,
            CompareOp::Ge => TermOp::Ge,
            CompareOp::Sw => TermOp::Sw,
            CompareOp::Co => TermOp::Co,
        }
    }
}

/// A single binary term of a normalized product. `value` is `None` only for
/// the presence operators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub attr: String,
    pub op: TermOp,
    pub value: Option<Value>,
}

impl Term {
    pub fn new(attr: impl Into<String>, op: TermOp, value: Option<Value>) -> Self {
        Term { attr: attr.into(), op, value }
    }

    pub fn complement(&self) -> Term {
        Term { attr: self.attr.clone(), op: self.op.complement(), value: self.value.clone() }
    }

    fn to_filter(&self) -> Filter {
        match self.op {
            TermOp::Pr => Filter::pr(self.attr.clone()),
            TermOp::NotPr => Filter::pr(self.attr.clone()).not(),
            TermOp::NotSw => positive(&self.attr, CompareOp::Sw, &self.value).not(),
            TermOp::NotCo => positive(&self.attr, CompareOp::Co, &self.value).not(),
            TermOp::Eq => positive(&self.attr, CompareOp::Eq, &self.value),
            TermOp::Ne => positive(&self.attr, CompareOp::Ne, &self.value),
            TermOp::Lt => positive(&self.attr, CompareOp::Lt, &self.value),
            TermOp::Le => positive(&self.attr, CompareOp::Le, &self.value),
            TermOp::Gt => positive(&self.attr, CompareOp::Gt, &self.value),
            TermOp::Ge => positive(&self.attr, CompareOp::Ge, &self.value),
            TermOp::Sw => positive(&self.attr, CompareOp::Sw, &self.value),
            TermOp::Co => positive(&self.attr, CompareOp::Co, &self.value),
        }
    }
}

fn positive(attr: &str, op: CompareOp, value: &Option<Value>) -> Filter {
    Filter::Compare { attr: attr.to_string(), op, value: value.clone().unwrap_or(Value::Null) }
}

/// A conjunction of terms, stored as a set for canonical comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Product(pub BTreeSet<Term>);

impl Product {
    pub fn single(term: Term) -> Self {
        let mut set = BTreeSet::new();
        set.insert(term);
        Product(set)
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> { self.0.iter() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    fn conjoin(&self, other: &Product) -> Product {
        let mut set = self.0.clone();
        set.extend(other.0.iter().cloned());
        Product(set)
    }

    /// Best-effort contradiction detection: a term alongside its exact
    /// complement, or two distinct `Eq` values on one attribute.
    fn is_contradiction(&self) -> bool {
        for term in &self.0 {
            if self.0.contains(&term.complement()) {
                return true;
            }
        }
        let mut eq_values: HashMap<&str, &Option<Value>> = HashMap::new();
        for term in self.0.iter().filter(|t| t.op == TermOp::Eq) {
            if let Some(previous) = eq_values.insert(term.attr.as_str(), &term.value) {
                if previous != &term.value {
                    return true;
                }
            }
        }
        false
    }

    fn to_filter(&self) -> Option<Filter> {
        self.0.iter().map(Term::to_filter).reduce(Filter::and)
    }
}

/// Disjunctive normal form: a set of products whose union reproduces the
/// original filter's truth set. An empty DNF means the filter reduced to a
/// contradiction and can match nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dnf {
    pub products: BTreeSet<Product>,
}

impl Dnf {
    pub fn len(&self) -> usize { self.products.len() }

    pub fn is_empty(&self) -> bool { self.products.is_empty() }

    /// Reconstruct a filter tree with the same truth set. `None` for the
    /// empty DNF, which has no tree representation.
    pub fn to_filter(&self) -> Option<Filter> {
        self.products.iter().filter_map(Product::to_filter).reduce(Filter::or)
    }
}

pub const DEFAULT_MAX_PRODUCTS: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("filter expands to {products} disjuncts, more than the permitted {limit}")]
    TooComplex { products: usize, limit: usize },
}

pub fn normalize(filter: &Filter) -> Result<Dnf, NormalizeError> {
    normalize_with_limit(filter, DEFAULT_MAX_PRODUCTS)
}

pub fn normalize_with_limit(filter: &Filter, limit: usize) -> Result<Dnf, NormalizeError> {
    let products = disjuncts(filter, false, limit)?;
    let before = products.len();
    let products: BTreeSet<Product> = products.into_iter().filter(|p| !p.is_contradiction()).collect();
    if products.len() < before {
        tracing::debug!(dropped = before - products.len(), "pruned contradictory products");
    }
    Ok(Dnf { products })
}

/// Compute the set of products for `filter`, with negation threaded down the
/// walk instead of rewriting the tree (De Morgan falls out of the match arms).
fn disjuncts(filter: &Filter, negated: bool, limit: usize) -> Result<BTreeSet<Product>, NormalizeError> {
    let products = match filter {
        Filter::Compare { attr, op, value } => {
            let mut op = TermOp::from(*op);
            if negated {
                op = op.complement();
            }
            let mut set = BTreeSet::new();
            set.insert(Product::single(Term::new(attr.clone(), op, Some(value.clone()))));
            set
        }
        Filter::Present { attr } => {
            let op = if negated { TermOp::NotPr } else { TermOp::Pr };
            let mut set = BTreeSet::new();
            set.insert(Product::single(Term::new(attr.clone(), op, None)));
            set
        }
        Filter::And(a, b) if !negated => cross(&disjuncts(a, false, limit)?, &disjuncts(b, false, limit)?, limit)?,
        Filter::And(a, b) => union(disjuncts(a, true, limit)?, disjuncts(b, true, limit)?),
        Filter::Or(a, b) if !negated => union(disjuncts(a, false, limit)?, disjuncts(b, false, limit)?),
        Filter::Or(a, b) => cross(&disjuncts(a, true, limit)?, &disjuncts(b, true, limit)?, limit)?,
        Filter::Not(inner) => disjuncts(inner, !negated, limit)?,
    };
    if products.len() > limit {
        return Err(NormalizeError::TooComplex { products: products.len(), limit });
    }
    Ok(products)
}

fn union(mut left: BTreeSet<Product>, right: BTreeSet<Product>) -> BTreeSet<Product> {
    left.extend(right);
    left
}

fn cross(
    left: &BTreeSet<Product>,
    right: &BTreeSet<Product>,
    limit: usize,
) -> Result<BTreeSet<Product>, NormalizeError> {
    let mut out = BTreeSet::new();
    for l in left {
        for r in right {
            out.insert(l.conjoin(r));
            if out.len() > limit {
                return Err(NormalizeError::TooComplex { products: out.len(), limit });
            }
        }
    }
    Ok(out)
}
