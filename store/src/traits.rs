use crate::error::StoreError;
use crate::request::{PutRequest, QueryPage, QueryRequest, ScanRequest};
use async_trait::async_trait;

/// The store seam the executor drives. Implementations are expected to be
/// cheaply shareable (`Arc`) and safe under concurrent calls.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn query(&self, request: QueryRequest) -> Result<QueryPage, StoreError>;

    async fn scan(&self, request: ScanRequest) -> Result<QueryPage, StoreError>;

    async fn put(&self, request: PutRequest) -> Result<(), StoreError>;

    /// Probe for an optional capability (e.g. a secondary index that only
    /// some deployments provision). Callers cache the answer.
    async fn supports_feature(&self, feature: &str) -> Result<bool, StoreError>;
}
