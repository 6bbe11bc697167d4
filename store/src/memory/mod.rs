//! In-memory [`DocumentStore`] used by the test suites and as an embedded
//! reference backend. Expressions are interpreted, results are ordered by the
//! queried index's key values, and a fault queue lets tests inject throttles,
//! transient failures, and latency one call at a time.

mod eval;

use crate::error::StoreError;
use crate::request::{PutRequest, QueryPage, QueryRequest, ScanRequest, Select};
use crate::traits::DocumentStore;
use crate::value::{AttributeValue, Item};
use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Declares a table before items can be written to it.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    /// Primary key attribute names, partition first.
    pub key_attributes: Vec<String>,
    pub indexes: Vec<MemoryIndex>,
}

/// A secondary index over a declared table. Items lacking the partition
/// attribute are simply absent from the index, as in the real store.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    pub name: String,
    pub partition: String,
    pub sort: Option<String>,
}

/// One injected failure, consumed by the next store call.
#[derive(Debug, Clone)]
pub enum Fault {
    Throttle,
    Transient,
    Delay(Duration),
}

#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Table>,
    faults: Mutex<VecDeque<Fault>>,
    disabled_features: Mutex<BTreeSet<String>>,
}

struct Table {
    spec: TableSpec,
    items: BTreeMap<Vec<u8>, Item>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn create_table(&self, spec: TableSpec) {
        self.tables.insert(spec.name.clone(), Table { spec, items: BTreeMap::new() });
    }

    /// Queue a fault; each store call consumes at most one.
    pub async fn inject_fault(&self, fault: Fault) { self.faults.lock().await.push_back(fault); }

    /// Make `supports_feature` report the given feature as absent.
    pub async fn disable_feature(&self, feature: impl Into<String>) {
        self.disabled_features.lock().await.insert(feature.into());
    }

    async fn apply_fault(&self) -> Result<(), StoreError> {
        let fault = self.faults.lock().await.pop_front();
        match fault {
            Some(Fault::Throttle) => Err(StoreError::Throttled { retry_after: None }),
            Some(Fault::Transient) => Err(StoreError::Transient("injected transient failure".to_string())),
            Some(Fault::Delay(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, request: QueryRequest) -> Result<QueryPage, StoreError> {
        self.apply_fault().await?;
        let table = self
            .tables
            .get(&request.table_name)
            .ok_or_else(|| StoreError::validation(format!("unknown table \"{}\"", request.table_name)))?;

        let key_condition = eval::parse(
            &request.key_condition_expression,
            &request.expression_attribute_names,
            &request.expression_attribute_values,
        )?;
        let filter = parse_filter(&request)?;

        let index = match &request.index_name {
            Some(name) => Some(
                table
                    .spec
                    .indexes
                    .iter()
                    .find(|i| &i.name == name)
                    .ok_or_else(|| StoreError::validation(format!("unknown index \"{}\"", name)))?,
            ),
            None => None,
        };

        let mut matched: Vec<(&Vec<u8>, &Item)> = table
            .items
            .iter()
            .filter(|(_, item)| index.is_none_or(|i| item.contains_key(&i.partition)))
            .filter(|(_, item)| eval::eval(&key_condition, item))
            .filter(|(_, item)| filter.as_ref().is_none_or(|f| eval::eval(f, item)))
            .collect();

        if let Some(index) = index {
            matched.sort_by(|a, b| index_order(index, a.1, b.1).then_with(|| a.0.cmp(b.0)));
        }

        debug!(table = %request.table_name, index = ?request.index_name, matched = matched.len(), "memory query");
        page(matched, &request.limit, &request.exclusive_start_key, request.select, &table.spec)
    }

    async fn scan(&self, request: ScanRequest) -> Result<QueryPage, StoreError> {
        self.apply_fault().await?;
        let table = self
            .tables
            .get(&request.table_name)
            .ok_or_else(|| StoreError::validation(format!("unknown table \"{}\"", request.table_name)))?;

        let filter = if request.filter_expression.is_empty() {
            None
        } else {
            Some(eval::parse(
                &request.filter_expression,
                &request.expression_attribute_names,
                &request.expression_attribute_values,
            )?)
        };

        let matched: Vec<(&Vec<u8>, &Item)> = table
            .items
            .iter()
            .filter(|(_, item)| filter.as_ref().is_none_or(|f| eval::eval(f, item)))
            .collect();

        page(matched, &request.limit, &request.exclusive_start_key, request.select, &table.spec)
    }

    async fn put(&self, request: PutRequest) -> Result<(), StoreError> {
        self.apply_fault().await?;
        let mut table = self
            .tables
            .get_mut(&request.table_name)
            .ok_or_else(|| StoreError::validation(format!("unknown table \"{}\"", request.table_name)))?;

        let key = key_bytes(&table.spec, &request.item)?;
        if let Some(expression) = &request.condition_expression {
            let values = indexmap::IndexMap::new();
            let condition = eval::parse(expression, &request.expression_attribute_names, &values)?;
            let empty = Item::new();
            let subject = table.items.get(&key).unwrap_or(&empty);
            if !eval::eval(&condition, subject) {
                let attribute = eval::first_path(&condition).unwrap_or_default().to_string();
                return Err(StoreError::ConditionFailed { attribute });
            }
        }
        table.items.insert(key, request.item);
        Ok(())
    }

    async fn supports_feature(&self, feature: &str) -> Result<bool, StoreError> {
        Ok(!self.disabled_features.lock().await.contains(feature))
    }
}

fn parse_filter(request: &QueryRequest) -> Result<Option<eval::Cond>, StoreError> {
    if request.filter_expression.is_empty() {
        return Ok(None);
    }
    eval::parse(
        &request.filter_expression,
        &request.expression_attribute_names,
        &request.expression_attribute_values,
    )
    .map(Some)
}

fn index_order(index: &MemoryIndex, a: &Item, b: &Item) -> Ordering {
    attr_order(a.get(&index.partition), b.get(&index.partition)).then_with(|| match &index.sort {
        Some(sort) => attr_order(a.get(sort), b.get(sort)),
        None => Ordering::Equal,
    })
}

fn attr_order(a: Option<&AttributeValue>, b: Option<&AttributeValue>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.compare(y).unwrap_or_else(|| x.cmp(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn page(
    matched: Vec<(&Vec<u8>, &Item)>,
    limit: &Option<u32>,
    exclusive_start_key: &Option<Item>,
    select: Select,
    spec: &TableSpec,
) -> Result<QueryPage, StoreError> {
    let start = match exclusive_start_key {
        Some(resume) => {
            let position = matched
                .iter()
                .position(|(_, item)| key_projection(spec, item).map(|p| &p == resume).unwrap_or(false))
                .ok_or_else(|| StoreError::validation("exclusive_start_key does not match any item".to_string()))?;
            position + 1
        }
        None => 0,
    };

    let window_len = match limit {
        Some(limit) => (*limit as usize).min(matched.len().saturating_sub(start)),
        None => matched.len().saturating_sub(start),
    };
    let window = &matched[start..start + window_len];
    let end = start + window_len;

    let last_evaluated_key = if end < matched.len() && window_len > 0 {
        Some(key_projection(spec, window[window_len - 1].1)?)
    } else {
        None
    };

    let items = match select {
        Select::AllAttributes => window.iter().map(|(_, item)| (*item).clone()).collect(),
        Select::Count => Vec::new(),
    };
    Ok(QueryPage { items, count: window_len as u64, last_evaluated_key })
}

fn key_projection(spec: &TableSpec, item: &Item) -> Result<Item, StoreError> {
    spec.key_attributes
        .iter()
        .map(|attr| {
            item.get(attr)
                .map(|value| (attr.clone(), value.clone()))
                .ok_or_else(|| StoreError::validation(format!("item missing key attribute \"{}\"", attr)))
        })
        .collect()
}

fn key_bytes(spec: &TableSpec, item: &Item) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    for attr in &spec.key_attributes {
        let value = item
            .get(attr)
            .ok_or_else(|| StoreError::validation(format!("item missing key attribute \"{}\"", attr)))?;
        encode_key_value(value, &mut out)?;
    }
    Ok(out)
}

fn encode_key_value(value: &AttributeValue, out: &mut Vec<u8>) -> Result<(), StoreError> {
    match value {
        AttributeValue::S(s) => {
            out.push(0x01);
            out.extend_from_slice(s.as_bytes());
            out.push(0x00);
        }
        AttributeValue::N(n) => {
            out.push(0x02);
            out.extend_from_slice(n.as_bytes());
            out.push(0x00);
        }
        AttributeValue::Bool(b) => {
            out.push(0x03);
            out.push(u8::from(*b));
        }
        other => {
            return Err(StoreError::validation(format!("key attributes must be scalar, got {}", other.type_name())));
        }
    }
    Ok(())
}
