//! Query plans: the planner's output, consumed by the executor.

use scimq::{Filter, Product, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Operators legal in a sort-key condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SortOperator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    Between,
}

/// The sort-key half of a key condition. `second` is present only for
/// `Between`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SortCondition {
    /// Physical sort attribute named in the key condition.
    pub attribute: String,
    pub operator: SortOperator,
    pub first: Value,
    pub second: Option<Value>,
}

/// Identity of one index query: the index plus its fully bound key condition.
/// Products binding to the same key are merged. The derived order puts the
/// primary key before secondary indexes, then sorts by index name, so plan
/// iteration (and therefore execution) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexQueryKey {
    /// `None` targets the primary key.
    pub index: Option<String>,
    /// Physical partition attribute.
    pub partition_attribute: String,
    /// Encoded partition value (tag prefixes and first-character derivation
    /// already applied).
    pub partition_value: Value,
    pub sort: Option<SortCondition>,
}

/// The filter a sub-query evaluates server-side after the key match: an OR of
/// conjunctions. A single product's residual is always one conjunction;
/// merging products with the same key ORs whole conjunctions together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Residual {
    groups: BTreeSet<Product>,
}

impl Residual {
    /// The trivially true residual (no server-side filtering).
    pub fn always() -> Self {
        let mut groups = BTreeSet::new();
        groups.insert(Product::default());
        Residual { groups }
    }

    pub fn of(product: Product) -> Self {
        let mut groups = BTreeSet::new();
        groups.insert(product);
        Residual { groups }
    }

    pub fn is_always(&self) -> bool { self.groups.contains(&Product::default()) }

    /// Merge another residual in by disjunction. An always-true side absorbs
    /// the other.
    pub fn or(&mut self, other: Residual) {
        self.groups.extend(other.groups);
        if self.is_always() {
            self.groups.retain(Product::is_empty);
        }
    }

    /// The OR-groups, each an AND of terms. Empty iteration only for the
    /// always-true residual.
    pub fn groups(&self) -> impl Iterator<Item = &Product> {
        self.groups.iter().filter(|p| !p.is_empty())
    }

    pub fn group_count(&self) -> usize { self.groups.iter().filter(|p| !p.is_empty()).count() }
}

/// The planner's output: a set of index queries whose union reproduces the
/// filter's truth set, or a scan when the capabilities permit one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryPlan {
    Queries(BTreeMap<IndexQueryKey, Residual>),
    Scan { filter: Filter },
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryPlan::Queries(queries) if queries.is_empty())
    }
}
