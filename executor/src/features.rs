//! One-shot probes for optional store capabilities, cached process-wide.

use crate::error::ExecError;
use dashmap::DashMap;
use dynaq_planner::FeatureId;
use dynaq_store::DocumentStore;
use std::sync::OnceLock;
use tracing::debug;

/// Operation names reported by fail-fast rejections.
pub mod ops {
    pub const GET_ALL_BY: &str = "getAllBy";
}

static PROBED: OnceLock<DashMap<String, bool>> = OnceLock::new();

/// Whether the deployment provides `feature`. The first call per feature id
/// asks the store; every later call answers from the process-wide cache.
pub async fn feature_supported<S: DocumentStore>(store: &S, feature: &FeatureId) -> Result<bool, ExecError> {
    let cache = PROBED.get_or_init(DashMap::new);
    if let Some(known) = cache.get(feature.as_str()) {
        return Ok(*known);
    }
    let supported = store.supports_feature(feature.as_str()).await.map_err(ExecError::from_store)?;
    debug!(feature = feature.as_str(), supported, "probed store feature");
    cache.insert(feature.as_str().to_string(), supported);
    Ok(supported)
}
