//! Binding normalized filter products to index queries.

use crate::catalog::{Classification, IndexDescriptor, KeyEncoding, PartitionBinding, QueryCapabilities};
use crate::error::PlanError;
use crate::plan::{IndexQueryKey, QueryPlan, Residual, SortCondition, SortOperator};
use scimq::{normalize, Filter, Product, Term, TermOp, Value};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

/// Turn a filter into a set of index queries, a scan (when permitted), or a
/// rejection naming the offending attribute.
///
/// Every product of the filter's DNF must bind to some index: one partition
/// condition, at most one sort condition, everything else a residual filter
/// evaluable on that index. Products binding to the same key are merged by
/// OR-ing their residuals.
pub fn plan(filter: &Filter, capabilities: &QueryCapabilities) -> Result<QueryPlan, PlanError> {
    let dnf = normalize(filter)?;
    let mut queries: BTreeMap<IndexQueryKey, Residual> = BTreeMap::new();

    for product in &dnf.products {
        match bind_product(product, capabilities) {
            Some((key, residual)) => {
                debug!(index = ?key.index, partition = %key.partition_value, "bound product");
                match queries.entry(key) {
                    std::collections::btree_map::Entry::Occupied(mut entry) => entry.get_mut().or(residual),
                    std::collections::btree_map::Entry::Vacant(entry) => {
                        entry.insert(residual);
                    }
                }
            }
            None if capabilities.allow_table_scans => {
                debug!("product is unbindable, falling back to a table scan");
                return Ok(QueryPlan::Scan { filter: filter.clone() });
            }
            None => {
                return Err(PlanError::UnindexableTerm { attribute: offending_attribute(product, capabilities) });
            }
        }
    }

    Ok(QueryPlan::Queries(queries))
}

struct Candidate<'a> {
    index: &'a IndexDescriptor,
    key: IndexQueryKey,
    residual: Product,
    /// Terms absorbed into the key condition; more is better.
    absorbed: usize,
}

fn bind_product(product: &Product, capabilities: &QueryCapabilities) -> Option<(IndexQueryKey, Residual)> {
    let mut best: Option<Candidate> = None;
    for index in capabilities.indexes() {
        if let Some(candidate) = bind_to_index(product, index, capabilities) {
            best = Some(match best {
                None => candidate,
                Some(current) if rank(&candidate) < rank(&current) => candidate,
                Some(current) => current,
            });
        }
    }
    best.map(|candidate| (candidate.key, Residual::of(candidate.residual)))
}

/// Preference order: primary key first, then the index absorbing more terms
/// into its key condition, then index name for determinism.
fn rank(candidate: &Candidate) -> (bool, Reverse<usize>, Option<String>) {
    (candidate.index.name.is_some(), Reverse(candidate.absorbed), candidate.index.name.clone())
}

fn bind_to_index<'a>(
    product: &Product,
    index: &'a IndexDescriptor,
    capabilities: &QueryCapabilities,
) -> Option<Candidate<'a>> {
    // The key term: bindings are tried in declaration order, terms in
    // canonical product order, so the choice is deterministic when several
    // terms are key-eligible.
    let (key_term, binding, partition_value) = select_key_term(product, index)?;

    let mut consumed: Vec<&Term> = Vec::new();
    let mut sort: Option<SortCondition> = None;

    let first_char_scheme = matches!(binding.encoding, KeyEncoding::FirstCharLower);
    if first_char_scheme {
        // The partition only pins the first character; the term itself must
        // survive as the sort condition (or a residual when the index
        // declares no sort key).
        if let Some(sort_key) = index.sort.as_ref().filter(|s| s.attribute == key_term.attr) {
            let operator = if key_term.op == TermOp::Sw { SortOperator::BeginsWith } else { SortOperator::Eq };
            sort = Some(SortCondition {
                attribute: sort_key.physical.clone(),
                operator,
                first: key_term.value.clone()?,
                second: None,
            });
            consumed.push(key_term);
        }
    } else {
        consumed.push(key_term);
    }

    if sort.is_none() {
        if let Some(sort_key) = &index.sort {
            let sort_terms: Vec<&Term> = product
                .terms()
                .filter(|term| *term != key_term)
                .filter(|term| index.is_sort_term(term))
                .collect();

            let lower = sort_terms.iter().find(|t| t.op == TermOp::Ge).copied();
            let upper = sort_terms.iter().find(|t| t.op == TermOp::Le).copied();
            if let (Some(lower), Some(upper)) = (lower, upper) {
                // inclusive bounds on both sides collapse into BETWEEN
                sort = Some(SortCondition {
                    attribute: sort_key.physical.clone(),
                    operator: SortOperator::Between,
                    first: lower.value.clone()?,
                    second: Some(upper.value.clone()?),
                });
                consumed.push(lower);
                consumed.push(upper);
            } else if let Some(term) = sort_terms.first() {
                sort = Some(SortCondition {
                    attribute: sort_key.physical.clone(),
                    operator: sort_operator(term.op)?,
                    first: term.value.clone()?,
                    second: None,
                });
                consumed.push(term);
            }
        }
    }

    // Everything not absorbed into the key must be evaluable as a filter on
    // this index (demoted key-eligible terms included).
    let mut residual = Product::default();
    for term in product.terms() {
        if term == key_term || consumed.iter().any(|c| *c == term) {
            continue;
        }
        match capabilities.classify(index, term) {
            Classification::Forbidden => return None,
            Classification::KeyEq | Classification::KeySort | Classification::Filter => {
                residual.0.insert(term.clone());
            }
        }
    }

    let absorbed = consumed.len().max(1);
    let key = IndexQueryKey {
        index: index.name.clone(),
        partition_attribute: index.partition_physical.clone(),
        partition_value,
        sort,
    };
    Some(Candidate { index, key, residual, absorbed })
}

fn select_key_term<'a, 'b>(
    product: &'a Product,
    index: &'b IndexDescriptor,
) -> Option<(&'a Term, &'b PartitionBinding, Value)> {
    for binding in &index.partition {
        for term in product.terms() {
            if !binding.matches(term) {
                continue;
            }
            let value = term.value.as_ref()?;
            if let Some(encoded) = binding.encode(value) {
                return Some((term, binding, encoded));
            }
        }
    }
    None
}

fn sort_operator(op: TermOp) -> Option<SortOperator> {
    match op {
        TermOp::Eq => Some(SortOperator::Eq),
        TermOp::Lt => Some(SortOperator::Lt),
        TermOp::Le => Some(SortOperator::Le),
        TermOp::Gt => Some(SortOperator::Gt),
        TermOp::Ge => Some(SortOperator::Ge),
        TermOp::Sw => Some(SortOperator::BeginsWith),
        _ => None,
    }
}

/// The attribute reported on rejection: the first term that is key-eligible
/// on no index at all.
fn offending_attribute(product: &Product, capabilities: &QueryCapabilities) -> String {
    product
        .terms()
        .find(|term| {
            capabilities.indexes().all(|index| capabilities.classify(index, term) != Classification::KeyEq)
        })
        .or_else(|| product.terms().next())
        .map(|term| term.attr.clone())
        .unwrap_or_default()
}
