//! # dynaq
//!
//! dynaq maps SCIM-style attribute filters onto a DynamoDB-like key-value
//! store: filters normalize to DNF, each product binds to a declared table
//! index, and the resulting sub-queries run with pagination, deduplication,
//! and an opaque continuation cursor.
//!
//! The member crates do the work; this crate re-exports them and adds
//! [`Client`], the thin façade the data-access providers drive.

pub use dynaq_executor as executor;
pub use dynaq_planner as planner;
pub use dynaq_store as store;
pub use scimq;

pub use dynaq_executor::{Count, Cursor, ExecError, ExecutorConfig, QueryExecutor, ReadOptions, ResultPage};
pub use dynaq_planner::{schema, PlanError, QueryCapabilities, QueryPlan, TableNames};
pub use dynaq_store::{AttributeValue, DocumentStore, Item, MemoryStore, StoreError};
pub use scimq::{parse_filter, Filter, Value};

use std::sync::Arc;
use tracing::debug;

/// Plans and executes filters against one store connection.
pub struct Client<S> {
    executor: QueryExecutor<S>,
}

impl<S: DocumentStore> Client<S> {
    pub fn new(store: Arc<S>, config: ExecutorConfig) -> Self {
        Client { executor: QueryExecutor::new(store, config) }
    }

    pub fn executor(&self) -> &QueryExecutor<S> { &self.executor }

    /// Plan `filter` against `capabilities` and fetch one page.
    pub async fn fetch(
        &self,
        capabilities: &QueryCapabilities,
        filter: &Filter,
        options: ReadOptions,
    ) -> Result<ResultPage, ExecError> {
        let plan = dynaq_planner::plan(filter, capabilities)?;
        debug!(table = %capabilities.table_name, "executing plan");
        self.executor.fetch_page(capabilities, &plan, options).await
    }

    /// The starts-with listing operation: all items whose `attribute` begins
    /// with `prefix`.
    pub async fn get_all_by(
        &self,
        capabilities: &QueryCapabilities,
        attribute: &str,
        prefix: &str,
        options: ReadOptions,
    ) -> Result<ResultPage, ExecError> {
        self.fetch(capabilities, &Filter::sw(attribute, prefix), options).await
    }

    /// COUNT the filter's matches.
    pub async fn count(
        &self,
        capabilities: &QueryCapabilities,
        filter: &Filter,
        options: ReadOptions,
    ) -> Result<Count, ExecError> {
        let plan = dynaq_planner::plan(filter, capabilities)?;
        self.executor.count(capabilities, &plan, options).await
    }

    /// Write one item, requiring its primary key to be free. Uniqueness is a
    /// write precondition here, never a planner concern; violation surfaces
    /// as [`ExecError::Integrity`] naming the attribute.
    pub async fn put_new(&self, capabilities: &QueryCapabilities, item: Item) -> Result<(), ExecError> {
        let mut names = indexmap::IndexMap::new();
        let condition = capabilities
            .primary_key_attributes
            .iter()
            .map(|attr| {
                names.insert(format!("#{}", attr), attr.clone());
                format!("attribute_not_exists(#{})", attr)
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        let request = store::PutRequest {
            table_name: self.executor.config().physical_table(&capabilities.table_name),
            item,
            condition_expression: Some(condition),
            expression_attribute_names: names,
        };
        self.executor.store().put(request).await.map_err(|e| match e {
            StoreError::ConditionFailed { attribute } => ExecError::Integrity { attribute },
            other => ExecError::Store(other),
        })
    }
}
