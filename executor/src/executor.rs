//! The executor: dispatches a plan's sub-queries, merges their pages in a
//! deterministic order, deduplicates primary keys, and assembles the
//! continuation cursor. Sub-query pages are fetched concurrently; consumption
//! order is fixed by the plan, so output never depends on completion order.

use crate::bloom::Bloom;
use crate::builder;
use crate::cursor::{Cursor, LegCursor};
use crate::error::ExecError;
use crate::features::{self, ops};
use dynaq_planner::{FeatureId, QueryCapabilities, QueryPlan};
use dynaq_store::{DocumentStore, Item, QueryPage, QueryRequest, ScanRequest, Select, StoreError};
use futures::future::join_all;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { RetryPolicy { max_attempts: 3, initial_backoff: Duration::from_millis(25) } }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Prepended to every physical table name; never affects planning.
    pub table_name_prefix: Option<String>,
    pub default_page_size: u32,
    pub retry: RetryPolicy,
    /// COUNT over overlapping sub-queries materializes distinct keys up to
    /// this many before degrading to an approximate sum.
    pub count_distinct_threshold: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            table_name_prefix: None,
            default_page_size: 50,
            retry: RetryPolicy::default(),
            count_distinct_threshold: 10_000,
        }
    }
}

impl ExecutorConfig {
    /// Resolved physical table name: the optional global prefix plus the
    /// capabilities' table name.
    pub fn physical_table(&self, name: &str) -> String {
        match &self.table_name_prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }
}

/// Per-call knobs. All optional; a default value reads one page of the
/// configured size with no deadline.
#[derive(Clone, Default)]
pub struct ReadOptions {
    pub page_size: Option<u32>,
    pub cursor: Option<Cursor>,
    /// Overall deadline for the call.
    pub timeout: Option<Duration>,
    /// Deadline per store round-trip; expiry counts as a retriable fault.
    pub attempt_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub items: Vec<Item>,
    /// `None` when the traversal is exhausted.
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Exact(u64),
    /// Distinct-key materialization hit the configured threshold; the sum may
    /// overcount items reachable through more than one sub-query.
    Approximate(u64),
}

pub struct QueryExecutor<S> {
    store: Arc<S>,
    config: ExecutorConfig,
}

#[derive(Clone)]
enum LegRequest {
    Query(QueryRequest),
    Scan(ScanRequest),
}

impl LegRequest {
    fn with_start(&self, start: Option<Item>) -> LegRequest {
        match self {
            LegRequest::Query(request) => {
                let mut request = request.clone();
                request.exclusive_start_key = start;
                LegRequest::Query(request)
            }
            LegRequest::Scan(request) => {
                let mut request = request.clone();
                request.exclusive_start_key = start;
                LegRequest::Scan(request)
            }
        }
    }
}

/// One sub-query in flight: its rendered request plus traversal state.
struct Leg {
    request: LegRequest,
    feature: Option<FeatureId>,
    buffer: VecDeque<Item>,
    /// Store-side continuation for the next fetch within this call.
    next_fetch: Option<Item>,
    /// The store reported no pages beyond `next_fetch`.
    store_exhausted: bool,
    /// Primary-key projection of the last item handed to the merge loop;
    /// becomes the cursor's resume position.
    consumed: Option<Item>,
}

impl Leg {
    fn new(request: LegRequest, feature: Option<FeatureId>) -> Self {
        Leg { request, feature, buffer: VecDeque::new(), next_fetch: None, store_exhausted: false, consumed: None }
    }

    fn done(&self) -> bool { self.store_exhausted && self.buffer.is_empty() }
}

impl<S: DocumentStore> QueryExecutor<S> {
    pub fn new(store: Arc<S>, config: ExecutorConfig) -> Self { QueryExecutor { store, config } }

    pub fn store(&self) -> &Arc<S> { &self.store }

    pub fn config(&self) -> &ExecutorConfig { &self.config }

    /// Fetch one page of unique items for `plan`, resuming from
    /// `options.cursor` when present. On any error, buffered items are
    /// discarded and no cursor is produced.
    pub async fn fetch_page(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        options: ReadOptions,
    ) -> Result<ResultPage, ExecError> {
        let timeout = options.timeout;
        let cancel = options.cancel.clone();
        bounded(timeout, cancel, self.fetch_page_inner(capabilities, plan, options)).await
    }

    /// COUNT the plan's matches. Exact when sub-queries cannot overlap (one
    /// index means disjoint partitions); otherwise distinct primary keys are
    /// materialized, degrading to an approximate sum past the threshold.
    pub async fn count(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        options: ReadOptions,
    ) -> Result<Count, ExecError> {
        let timeout = options.timeout;
        let cancel = options.cancel.clone();
        bounded(timeout, cancel, self.count_inner(capabilities, plan, options)).await
    }

    async fn fetch_page_inner(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        options: ReadOptions,
    ) -> Result<ResultPage, ExecError> {
        let page_size = options.page_size.unwrap_or(self.config.default_page_size).max(1) as usize;
        let mut legs = self.prepare_legs(capabilities, plan, Some(page_size as u32), Select::AllAttributes)?;
        if legs.is_empty() {
            return Ok(ResultPage { items: Vec::new(), cursor: None });
        }
        self.gate_features(&legs).await?;

        let fingerprint = fingerprint(&legs);
        let mut seen = match options.cursor {
            Some(cursor) => restore_legs(&mut legs, cursor, fingerprint)?,
            None => Bloom::with_capacity(page_size * 16),
        };

        let mut call_seen: HashSet<Vec<u8>> = HashSet::new();
        let mut items: Vec<Item> = Vec::with_capacity(page_size);

        'page: loop {
            let fetched = self.fill_buffers(&mut legs, options.attempt_timeout).await?;
            let mut consumed_any = false;
            for leg in legs.iter_mut() {
                while let Some(item) = leg.buffer.pop_front() {
                    consumed_any = true;
                    let projection = primary_key_projection(capabilities, &item)?;
                    let bytes = key_bytes(&projection)?;
                    leg.consumed = Some(projection);
                    if seen.contains(&bytes) || !call_seen.insert(bytes.clone()) {
                        continue;
                    }
                    seen.insert(&bytes);
                    items.push(item);
                    if items.len() == page_size {
                        break 'page;
                    }
                }
            }
            if legs.iter().all(Leg::done) {
                break;
            }
            if !fetched && !consumed_any {
                break;
            }
        }

        let cursor = if legs.iter().all(Leg::done) {
            None
        } else {
            Some(Cursor {
                fingerprint,
                legs: legs
                    .iter()
                    .map(|leg| LegCursor {
                        exhausted: leg.done(),
                        resume_key: if leg.done() { None } else { leg.consumed.clone() },
                    })
                    .collect(),
                seen,
            })
        };
        debug!(items = items.len(), continued = cursor.is_some(), "assembled page");
        Ok(ResultPage { items, cursor })
    }

    async fn count_inner(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        options: ReadOptions,
    ) -> Result<Count, ExecError> {
        match plan {
            QueryPlan::Queries(queries) if queries.is_empty() => Ok(Count::Exact(0)),
            QueryPlan::Queries(queries) => {
                let distinct_indexes: HashSet<&Option<String>> = queries.keys().map(|key| &key.index).collect();
                if distinct_indexes.len() <= 1 {
                    // one index means disjoint partitions: per-query counts add up
                    Ok(Count::Exact(self.sum_counts(capabilities, plan, &options).await?))
                } else {
                    self.count_distinct(capabilities, plan, &options).await
                }
            }
            QueryPlan::Scan { .. } => Ok(Count::Exact(self.sum_counts(capabilities, plan, &options).await?)),
        }
    }

    async fn sum_counts(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        options: &ReadOptions,
    ) -> Result<u64, ExecError> {
        let mut legs = self.prepare_legs(capabilities, plan, None, Select::Count)?;
        self.gate_features(&legs).await?;
        let mut total = 0;
        for leg in legs.iter_mut() {
            loop {
                let request = leg.request.with_start(leg.next_fetch.clone());
                let page = self.dispatch_with_retry(request, options.attempt_timeout).await?;
                total += page.count;
                match page.last_evaluated_key {
                    Some(key) => leg.next_fetch = Some(key),
                    None => break,
                }
            }
        }
        Ok(total)
    }

    async fn count_distinct(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        options: &ReadOptions,
    ) -> Result<Count, ExecError> {
        let mut legs = self.prepare_legs(capabilities, plan, None, Select::AllAttributes)?;
        self.gate_features(&legs).await?;
        let mut keys: HashSet<Vec<u8>> = HashSet::new();
        for leg in legs.iter_mut() {
            loop {
                let request = leg.request.with_start(leg.next_fetch.clone());
                let page = self.dispatch_with_retry(request, options.attempt_timeout).await?;
                for item in &page.items {
                    let projection = primary_key_projection(capabilities, item)?;
                    keys.insert(key_bytes(&projection)?);
                    if keys.len() > self.config.count_distinct_threshold {
                        warn!(threshold = self.config.count_distinct_threshold, "distinct-count threshold hit, degrading to a sum");
                        return Ok(Count::Approximate(self.sum_counts(capabilities, plan, options).await?));
                    }
                }
                match page.last_evaluated_key {
                    Some(key) => leg.next_fetch = Some(key),
                    None => break,
                }
            }
        }
        Ok(Count::Exact(keys.len() as u64))
    }

    fn prepare_legs(
        &self,
        capabilities: &QueryCapabilities,
        plan: &QueryPlan,
        limit: Option<u32>,
        select: Select,
    ) -> Result<Vec<Leg>, ExecError> {
        let table = self.config.physical_table(&capabilities.table_name);
        match plan {
            QueryPlan::Queries(queries) => queries
                .iter()
                .map(|(key, residual)| {
                    let request = builder::build_query(table.clone(), key, residual, limit, select)?;
                    let feature = capabilities.index_named(&key.index).and_then(|index| index.required_feature.clone());
                    Ok(Leg::new(LegRequest::Query(request), feature))
                })
                .collect(),
            QueryPlan::Scan { filter } => {
                let request = builder::build_scan(table, filter, limit, select)?;
                Ok(vec![Leg::new(LegRequest::Scan(request), None)])
            }
        }
    }

    async fn gate_features(&self, legs: &[Leg]) -> Result<(), ExecError> {
        for leg in legs {
            if let Some(feature) = &leg.feature {
                if !features::feature_supported(self.store.as_ref(), feature).await? {
                    return Err(ExecError::Unsupported { operation: ops::GET_ALL_BY });
                }
            }
        }
        Ok(())
    }

    /// Fetch the next page for every leg whose buffer drained, concurrently.
    /// Returns whether anything was dispatched.
    async fn fill_buffers(&self, legs: &mut [Leg], attempt_timeout: Option<Duration>) -> Result<bool, ExecError> {
        let pending: Vec<usize> = legs
            .iter()
            .enumerate()
            .filter(|(_, leg)| !leg.store_exhausted && leg.buffer.is_empty())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(false);
        }
        let requests: Vec<LegRequest> =
            pending.iter().map(|&i| legs[i].request.with_start(legs[i].next_fetch.clone())).collect();
        let pages = join_all(requests.into_iter().map(|request| self.dispatch_with_retry(request, attempt_timeout))).await;
        for (&i, page) in pending.iter().zip(pages) {
            let page = page?;
            let leg = &mut legs[i];
            debug!(leg = i, items = page.items.len(), exhausted = page.last_evaluated_key.is_none(), "fetched page");
            leg.buffer.extend(page.items);
            leg.store_exhausted = page.last_evaluated_key.is_none();
            leg.next_fetch = page.last_evaluated_key;
        }
        Ok(true)
    }

    async fn dispatch_with_retry(
        &self,
        request: LegRequest,
        attempt_timeout: Option<Duration>,
    ) -> Result<QueryPage, ExecError> {
        let policy = &self.config.retry;
        let mut backoff = policy.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.dispatch(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Transient("attempt timed out".to_string())),
                },
                None => self.dispatch(&request).await,
            };
            match result {
                Ok(page) => return Ok(page),
                Err(error) if error.is_retriable() && attempt < policy.max_attempts => {
                    let delay = match &error {
                        StoreError::Throttled { retry_after: Some(hint) } => (*hint).max(backoff),
                        _ => backoff,
                    };
                    warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "retriable store error, backing off");
                    tokio::time::sleep(delay).await;
                    backoff *= 2;
                }
                Err(error) => return Err(ExecError::from_store(error)),
            }
        }
    }

    async fn dispatch(&self, request: &LegRequest) -> Result<QueryPage, StoreError> {
        match request {
            LegRequest::Query(request) => self.store.query(request.clone()).await,
            LegRequest::Scan(request) => self.store.scan(request.clone()).await,
        }
    }
}

/// Race the work against the overall deadline and the caller's cancellation
/// token. In-flight sub-queries are dropped on either exit; the cursor never
/// advances on failure.
async fn bounded<T>(
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    work: impl Future<Output = Result<T, ExecError>>,
) -> Result<T, ExecError> {
    let guarded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(ExecError::DeadlineExceeded),
            },
            None => work.await,
        }
    };
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(ExecError::Cancelled),
            result = guarded => result,
        },
        None => guarded.await,
    }
}

fn restore_legs(legs: &mut [Leg], cursor: Cursor, fingerprint: u64) -> Result<Bloom, ExecError> {
    if cursor.fingerprint != fingerprint {
        return Err(ExecError::InvalidCursor("cursor does not match this plan".to_string()));
    }
    if cursor.legs.len() != legs.len() {
        return Err(ExecError::InvalidCursor("cursor sub-query count does not match this plan".to_string()));
    }
    for (leg, state) in legs.iter_mut().zip(cursor.legs) {
        leg.store_exhausted = state.exhausted;
        leg.next_fetch = state.resume_key.clone();
        leg.consumed = state.resume_key;
    }
    Ok(cursor.seen)
}

/// Identity of the plan's rendered requests; cursors from a different plan
/// are refused.
fn fingerprint(legs: &[Leg]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for leg in legs {
        match &leg.request {
            LegRequest::Query(request) => {
                0u8.hash(&mut hasher);
                request.table_name.hash(&mut hasher);
                request.index_name.hash(&mut hasher);
                request.key_condition_expression.hash(&mut hasher);
                request.filter_expression.hash(&mut hasher);
                for (placeholder, value) in &request.expression_attribute_values {
                    placeholder.hash(&mut hasher);
                    value.hash(&mut hasher);
                }
            }
            LegRequest::Scan(request) => {
                1u8.hash(&mut hasher);
                request.table_name.hash(&mut hasher);
                request.filter_expression.hash(&mut hasher);
                for (placeholder, value) in &request.expression_attribute_values {
                    placeholder.hash(&mut hasher);
                    value.hash(&mut hasher);
                }
            }
        }
    }
    hasher.finish()
}

fn primary_key_projection(capabilities: &QueryCapabilities, item: &Item) -> Result<Item, ExecError> {
    capabilities
        .primary_key_attributes
        .iter()
        .map(|attr| {
            item.get(attr)
                .map(|value| (attr.clone(), value.clone()))
                .ok_or_else(|| ExecError::MalformedPlan(format!("item is missing primary key attribute \"{}\"", attr)))
        })
        .collect()
}

fn key_bytes(projection: &Item) -> Result<Vec<u8>, ExecError> {
    bincode::serialize(projection).map_err(|e| ExecError::MalformedPlan(e.to_string()))
}
