//! Write-through mutations with typed optimistic patches.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;

use super::{CachePatch, QueryCache, QueryKey};
use crate::error::QueryError;

type Fetcher<I, R> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<R, QueryError>> + Send + Sync>;
type Reducer<R> = Arc<dyn Fn(&R) -> Vec<CachePatch> + Send + Sync>;
type Affects<I> = Arc<dyn Fn(&I) -> Vec<QueryKey> + Send + Sync>;

#[derive(Debug, Default)]
struct MutationStatus {
    pending: usize,
    error: Option<QueryError>,
}

/// A remote write plus the reducer that folds its result into the cache.
pub struct Mutation<I, R> {
    cache: QueryCache,
    fetcher: Fetcher<I, R>,
    reducer: Reducer<R>,
    affects: Option<Affects<I>>,
    status: Arc<Mutex<MutationStatus>>,
}

impl<I, R> Mutation<I, R> {
    pub(super) fn new<F, P>(cache: QueryCache, fetcher: F, reducer: P) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<R, QueryError>> + Send + Sync + 'static,
        P: Fn(&R) -> Vec<CachePatch> + Send + Sync + 'static,
    {
        Self {
            cache,
            fetcher: Arc::new(fetcher),
            reducer: Arc::new(reducer),
            affects: None,
            status: Arc::new(Mutex::new(MutationStatus::default())),
        }
    }

    /// Keys whose pending-mutation count tracks calls with a given input.
    #[must_use]
    pub fn affecting<A>(mut self, affects: A) -> Self
    where
        A: Fn(&I) -> Vec<QueryKey> + Send + Sync + 'static,
    {
        self.affects = Some(Arc::new(affects));
        self
    }

    fn status(&self) -> MutationStatus {
        let status = lock(&self.status);
        MutationStatus { pending: status.pending, error: status.error.clone() }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status().pending > 0
    }

    /// Error of the most recent failed call, cleared when a new call starts.
    #[must_use]
    pub fn error(&self) -> Option<QueryError> {
        self.status().error
    }

    /// Run the remote write. On success the reducer's patches are applied
    /// before this returns; on failure the cache is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error.
    pub async fn mutate_async(&self, input: I) -> Result<R, QueryError> {
        let keys = self.affects.as_ref().map(|f| f(&input)).unwrap_or_default();
        let _pending = PendingGuard::begin(self.cache.clone(), keys, Arc::clone(&self.status));

        match (self.fetcher)(input).await {
            Ok(result) => {
                let patches = (self.reducer)(&result);
                self.cache.apply_patches(&patches);
                Ok(result)
            }
            Err(e) => {
                lock(&self.status).error = Some(e.clone());
                Err(e)
            }
        }
    }
}

fn lock(status: &Mutex<MutationStatus>) -> MutexGuard<'_, MutationStatus> {
    status.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Counts a call as pending until it resolves or its future is dropped.
struct PendingGuard {
    cache: QueryCache,
    keys: Vec<QueryKey>,
    status: Arc<Mutex<MutationStatus>>,
}

impl PendingGuard {
    fn begin(cache: QueryCache, keys: Vec<QueryKey>, status: Arc<Mutex<MutationStatus>>) -> Self {
        {
            let mut s = lock(&status);
            s.pending += 1;
            s.error = None;
        }
        cache.adjust_pending(&keys, true);
        Self { cache, keys, status }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut s = lock(&self.status);
        s.pending = s.pending.saturating_sub(1);
        drop(s);
        self.cache.adjust_pending(&self.keys, false);
    }
}

#[cfg(test)]
#[path = "mutation_test.rs"]
mod tests;
