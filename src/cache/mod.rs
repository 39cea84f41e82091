//! Query-key-addressed remote data cache.
//!
//! DESIGN
//! ======
//! Entries hold the last fetched value as JSON, so one cache serves every
//! resource type; typed access goes through serde at the edges. Each key has
//! at most one in-flight fetch: concurrent callers share a
//! `futures::future::Shared` handle over a spawned task, and that task
//! settles the entry even if every caller has gone away.
//!
//! Mutations never write entries directly. On success they produce typed
//! [`CachePatch`]es, applied under the cache lock before the mutation
//! resolves, so a read issued right after `mutate_async` returns sees the
//! patched value.
//!
//! INVARIANTS
//! ==========
//! - `in_flight` contains a key only while its fetch is unresolved.
//! - `clear()` bumps `generation`; fetches started before a clear never write.
//! - Every write other than a fetch bumps the entry's `version`. A fetch that
//!   settles after such a write, or while a mutation on the key is pending,
//!   leaves the value alone and only marks the entry stale.

pub mod mutation;
pub mod patch;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{NetworkError, QueryError};
pub use mutation::Mutation;
pub use patch::{CachePatch, CacheSnapshot};

type SharedFetch = Shared<BoxFuture<'static, Result<Value, QueryError>>>;

// =============================================================================
// QUERY KEY
// =============================================================================

/// Ordered `(resource type, resource id, params)` tuple addressing one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: String,
    id: String,
    params: Vec<(String, String)>,
}

impl QueryKey {
    #[must_use]
    pub fn new(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self { resource: resource.into(), id: id.into(), params: Vec::new() }
    }

    /// Append a query parameter. Order is significant.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Message list of one project.
    #[must_use]
    pub fn messages(project_id: &str) -> Self {
        Self::new("messages", project_id)
    }

    /// Profile of one user.
    #[must_use]
    pub fn profile(user_id: &str) -> Self {
        Self::new("profiles", user_id)
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

#[derive(Debug, Default)]
struct CacheEntry {
    value: Option<Value>,
    /// `None` once invalidated.
    updated_at: Option<Instant>,
    pending_mutations: usize,
    error: Option<QueryError>,
    version: u64,
}

impl CacheEntry {
    fn fresh_value(&self, stale_time: Duration) -> Option<&Value> {
        let updated_at = self.updated_at?;
        if updated_at.elapsed() < stale_time { self.value.as_ref() } else { None }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, CacheEntry>,
    in_flight: HashMap<QueryKey, SharedFetch>,
    generation: u64,
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Freshness window. `None` uses the cache default.
    pub stale_time: Option<Duration>,
}

impl QueryOptions {
    #[must_use]
    pub fn stale_time(stale_time: Duration) -> Self {
        Self { stale_time: Some(stale_time) }
    }
}

/// Non-blocking view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    /// A fetch is in flight and there is no data yet.
    pub is_loading: bool,
    /// A fetch is in flight.
    pub is_fetching: bool,
    pub error: Option<QueryError>,
}

// =============================================================================
// CACHE
// =============================================================================

/// Cloning shares the underlying entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
    default_stale_time: Duration,
}

impl QueryCache {
    #[must_use]
    pub fn new(default_stale_time: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(CacheInner::default())), default_stale_time }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Return fresh cached data, or run `fetcher` (sharing any fetch already
    /// in flight for `key`) and cache its result.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error, or `QueryError::Decode` if the cached
    /// value does not deserialize as `T`.
    pub async fn query<T, F, Fut>(&self, key: QueryKey, fetcher: F, options: QueryOptions) -> Result<T, QueryError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let stale_time = options.stale_time.unwrap_or(self.default_stale_time);
        let fetch = {
            let mut inner = self.lock();
            if let Some(value) = inner.entries.get(&key).and_then(|e| e.fresh_value(stale_time)) {
                return Ok(serde_json::from_value(value.clone())?);
            }
            if let Some(shared) = inner.in_flight.get(&key) {
                debug!(resource = key.resource(), id = key.id(), "joining in-flight fetch");
                shared.clone()
            } else {
                self.start_fetch(&mut inner, key, fetcher())
            }
        };
        let value = fetch.await?;
        Ok(serde_json::from_value(value)?)
    }

    fn start_fetch<T, Fut>(&self, inner: &mut CacheInner, key: QueryKey, fut: Fut) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let cache = Arc::clone(&self.inner);
        let started = FetchStart {
            generation: inner.generation,
            version: inner.entries.get(&key).map_or(0, |e| e.version),
        };
        let settle_key = key.clone();
        let task = tokio::spawn(async move {
            let result = match fut.await {
                Ok(data) => serde_json::to_value(&data).map_err(QueryError::from),
                Err(e) => Err(e),
            };
            settle(&cache, &settle_key, started, &result);
            result
        });
        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(QueryError::Network(NetworkError::Permanent(format!("fetch task failed: {e}"))))
            })
        }
        .boxed()
        .shared();
        debug!(resource = key.resource(), id = key.id(), "fetch started");
        inner.in_flight.insert(key, shared.clone());
        shared
    }

    /// Current state of `key` without triggering a fetch.
    #[must_use]
    pub fn state<T: DeserializeOwned>(&self, key: &QueryKey) -> QueryState<T> {
        let inner = self.lock();
        let is_fetching = inner.in_flight.contains_key(key);
        let entry = inner.entries.get(key);
        let data = entry.and_then(|e| e.value.clone()).and_then(|v| serde_json::from_value(v).ok());
        QueryState {
            is_loading: is_fetching && entry.is_none_or(|e| e.value.is_none()),
            is_fetching,
            data,
            error: entry.and_then(|e| e.error.clone()),
        }
    }

    /// Cached data regardless of staleness.
    #[must_use]
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let value = self.lock().entries.get(key)?.value.clone()?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(resource = key.resource(), id = key.id(), error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Seed or overwrite an entry as if it had just been fetched.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Decode` if `data` does not serialize.
    pub fn set_query_data<T: Serialize>(&self, key: QueryKey, data: &T) -> Result<(), QueryError> {
        let value = serde_json::to_value(data)?;
        let mut inner = self.lock();
        let entry = inner.entries.entry(key).or_default();
        entry.value = Some(value);
        entry.updated_at = Some(Instant::now());
        entry.error = None;
        entry.version += 1;
        Ok(())
    }

    /// Mark `key` stale so the next query refetches. Data stays readable.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            entry.updated_at = None;
        }
    }

    /// Drop every entry and detach in-flight fetches.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.in_flight.clear();
        inner.generation += 1;
        debug!(generation = inner.generation, "query cache cleared");
    }

    #[must_use]
    pub fn pending_mutations(&self, key: &QueryKey) -> usize {
        self.lock().entries.get(key).map_or(0, |e| e.pending_mutations)
    }

    /// Build a mutation whose successful results are folded into this cache
    /// by `reducer`.
    pub fn mutation<I, R, F, Fut, P>(&self, fetcher: F, reducer: P) -> Mutation<I, R>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, QueryError>> + Send + 'static,
        P: Fn(&R) -> Vec<CachePatch> + Send + Sync + 'static,
    {
        Mutation::new(self.clone(), move |input| fetcher(input).boxed(), reducer)
    }

    /// Apply patches in order. A patch that fails to decode its entry marks
    /// that entry stale instead.
    pub fn apply_patches(&self, patches: &[CachePatch]) {
        let mut inner = self.lock();
        let mut snapshot = CacheSnapshot::new(&mut inner.entries);
        for patch in patches {
            match patch.apply(&mut snapshot) {
                Ok(applied) => debug!(resource = patch.key().resource(), applied, "cache patch"),
                Err(e) => {
                    warn!(resource = patch.key().resource(), error = %e, "cache patch failed; invalidating");
                    snapshot.invalidate(&patch.key());
                }
            }
        }
    }

    fn adjust_pending(&self, keys: &[QueryKey], begin: bool) {
        let mut inner = self.lock();
        for key in keys {
            let entry = inner.entries.entry(key.clone()).or_default();
            if begin {
                entry.pending_mutations += 1;
            } else {
                entry.pending_mutations = entry.pending_mutations.saturating_sub(1);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FetchStart {
    generation: u64,
    version: u64,
}

fn settle(cache: &Mutex<CacheInner>, key: &QueryKey, started: FetchStart, result: &Result<Value, QueryError>) {
    let mut inner = cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if inner.generation != started.generation {
        return;
    }
    inner.in_flight.remove(key);
    let entry = inner.entries.entry(key.clone()).or_default();
    match result {
        Ok(value) if entry.version != started.version || entry.pending_mutations > 0 => {
            debug!(resource = key.resource(), id = key.id(), "fetch overtaken by a local write; marking stale");
            if entry.value.is_none() {
                entry.value = Some(value.clone());
            }
            entry.updated_at = None;
            entry.error = None;
        }
        Ok(value) => {
            entry.value = Some(value.clone());
            entry.updated_at = Some(Instant::now());
            entry.error = None;
        }
        Err(e) => {
            warn!(resource = key.resource(), id = key.id(), error = %e, "fetch failed");
            entry.error = Some(e.clone());
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
