use crate::value::{AttributeValue, Item};
use indexmap::IndexMap;

/// What a query or scan should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Select {
    #[default]
    AllAttributes,
    Count,
}

/// One index query against a table. The expression strings reference
/// attributes through the placeholder maps: `#attr` in
/// `expression_attribute_names`, `:attr_N` in `expression_attribute_values`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    pub table_name: String,
    /// `None` queries the primary key.
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    /// Empty string when the query carries no residual filter.
    pub filter_expression: String,
    pub expression_attribute_names: IndexMap<String, String>,
    pub expression_attribute_values: IndexMap<String, AttributeValue>,
    pub limit: Option<u32>,
    pub select: Select,
    pub exclusive_start_key: Option<Item>,
}

/// A full-table scan with a server-side filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanRequest {
    pub table_name: String,
    pub filter_expression: String,
    pub expression_attribute_names: IndexMap<String, String>,
    pub expression_attribute_values: IndexMap<String, AttributeValue>,
    pub limit: Option<u32>,
    pub select: Select,
    pub exclusive_start_key: Option<Item>,
}

/// A single-item write, optionally guarded by a condition expression
/// (`attribute_not_exists(#attr)` is the uniqueness precondition).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PutRequest {
    pub table_name: String,
    pub item: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: IndexMap<String, String>,
}

/// One page of query or scan results. `last_evaluated_key` is `None` when the
/// traversal is exhausted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub count: u64,
    pub last_evaluated_key: Option<Item>,
}
