//! Declarative description of a table's primary key and secondary indexes,
//! and the classification of (attribute, operator) pairs against them.

use scimq::{Term, TermOp, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifies an optional store capability, probed at first use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self { FeatureId(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

/// Which item attributes an index materializes. Residual filters can only be
/// evaluated against projected attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    All,
    KeysOnly,
    Include(BTreeSet<String>),
}

/// How a logical attribute value becomes the physical partition key value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEncoding {
    /// The value is the partition key.
    Verbatim,
    /// Type-tagged composite scheme: `un#<userName>`, `em#<email>`, ...
    Tagged(String),
    /// Lowercased first character, the narrow-partition scheme backing
    /// starts-with listings.
    FirstCharLower,
}

/// Declares that an index's partition key can be derived from a term on the
/// given logical attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBinding {
    pub attribute: String,
    pub encoding: KeyEncoding,
    /// Whether a starts-with term can derive the partition value. Only
    /// meaningful for the first-character scheme, where any prefix pins the
    /// partition.
    pub allow_starts_with: bool,
}

impl PartitionBinding {
    pub fn verbatim(attribute: impl Into<String>) -> Self {
        PartitionBinding { attribute: attribute.into(), encoding: KeyEncoding::Verbatim, allow_starts_with: false }
    }

    pub fn tagged(attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        PartitionBinding {
            attribute: attribute.into(),
            encoding: KeyEncoding::Tagged(prefix.into()),
            allow_starts_with: false,
        }
    }

    pub fn first_char(attribute: impl Into<String>) -> Self {
        PartitionBinding { attribute: attribute.into(), encoding: KeyEncoding::FirstCharLower, allow_starts_with: true }
    }

    /// Whether `term` can supply this binding's partition value.
    pub fn matches(&self, term: &Term) -> bool {
        if term.attr != self.attribute || term.value.is_none() {
            return false;
        }
        match term.op {
            TermOp::Eq => true,
            TermOp::Sw => self.allow_starts_with,
            _ => false,
        }
    }

    /// Render the physical partition value for a matching term's value.
    /// `None` when the value cannot be encoded (non-string for a tagged or
    /// first-character scheme, empty string for first-character).
    pub fn encode(&self, value: &Value) -> Option<Value> {
        match &self.encoding {
            KeyEncoding::Verbatim => Some(value.clone()),
            KeyEncoding::Tagged(prefix) => value.as_str().map(|s| Value::Str(format!("{}{}", prefix, s))),
            KeyEncoding::FirstCharLower => {
                let s = value.as_str()?;
                let first: String = s.chars().take(1).flat_map(char::to_lowercase).collect();
                if first.is_empty() {
                    None
                } else {
                    Some(Value::Str(first))
                }
            }
        }
    }
}

/// The sort key of an index, when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Logical attribute tested by filter terms.
    pub attribute: String,
    /// Physical attribute named in the key condition.
    pub physical: String,
}

impl SortKey {
    pub fn new(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        SortKey { physical: attribute.clone(), attribute }
    }
}

/// One queryable index: the primary key (`name: None`) or a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: Option<String>,
    /// Physical partition attribute named in the key condition.
    pub partition_physical: String,
    /// Bindings in priority order; the order breaks ties when a product
    /// carries several key-eligible terms.
    pub partition: Vec<PartitionBinding>,
    pub sort: Option<SortKey>,
    pub projection: Projection,
    /// Present when only some deployments provision this index.
    pub required_feature: Option<FeatureId>,
}

impl IndexDescriptor {
    /// Logical attributes that are part of this index's key.
    pub fn key_attributes(&self) -> BTreeSet<&str> {
        let mut attrs: BTreeSet<&str> = self.partition.iter().map(|b| b.attribute.as_str()).collect();
        if let Some(sort) = &self.sort {
            attrs.insert(sort.attribute.as_str());
        }
        attrs
    }

    pub fn is_sort_term(&self, term: &Term) -> bool {
        self.sort.as_ref().is_some_and(|sort| {
            sort.attribute == term.attr
                && matches!(term.op, TermOp::Eq | TermOp::Lt | TermOp::Le | TermOp::Gt | TermOp::Ge | TermOp::Sw)
        })
    }

    fn projects(&self, attribute: &str) -> bool {
        match &self.projection {
            Projection::All => true,
            Projection::KeysOnly => self.key_attributes().contains(attribute),
            Projection::Include(attrs) => attrs.contains(attribute) || self.key_attributes().contains(attribute),
        }
    }
}

/// How a single (attribute, operator) pair relates to one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Usable as the partition condition.
    KeyEq,
    /// Usable as the sort condition.
    KeySort,
    /// Evaluable server-side after the key match.
    Filter,
    /// Not projected, or never allowed as a filter.
    Forbidden,
}

/// Everything the planner knows about one table. Built once at startup and
/// shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCapabilities {
    pub table_name: String,
    pub primary: IndexDescriptor,
    pub secondary: Vec<IndexDescriptor>,
    /// Physical attributes identifying an item, partition key first. The
    /// executor deduplicates on their projection.
    pub primary_key_attributes: Vec<String>,
    /// Attributes that may never appear in a filter (write-only fields).
    pub unfilterable: BTreeSet<String>,
    pub allow_table_scans: bool,
}

impl QueryCapabilities {
    /// Primary key first, then secondary indexes in declaration order.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexDescriptor> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    pub fn index_named(&self, name: &Option<String>) -> Option<&IndexDescriptor> {
        self.indexes().find(|index| &index.name == name)
    }

    pub fn classify(&self, index: &IndexDescriptor, term: &Term) -> Classification {
        if index.partition.iter().any(|binding| binding.matches(term)) {
            return Classification::KeyEq;
        }
        if index.is_sort_term(term) {
            return Classification::KeySort;
        }
        if self.unfilterable.contains(&term.attr) {
            return Classification::Forbidden;
        }
        if index.projects(&term.attr) {
            Classification::Filter
        } else {
            Classification::Forbidden
        }
    }
}
