//! The dynaq query planner: a declarative catalogue of a table's indexing
//! capabilities, and the planner that binds each product of a normalized
//! filter to a legal index query, rejecting the query when no legal plan
//! exists.

pub mod catalog;
pub mod error;
pub mod plan;
pub mod planner;
pub mod schema;

pub use catalog::{
    Classification, FeatureId, IndexDescriptor, KeyEncoding, PartitionBinding, Projection, QueryCapabilities, SortKey,
};
pub use error::PlanError;
pub use plan::{IndexQueryKey, QueryPlan, Residual, SortCondition, SortOperator};
pub use planner::plan;
pub use schema::TableNames;
