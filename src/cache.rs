//! Time-bounded memo of API responses keyed by the exact query text.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, TrafficError};

/// How long a response stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_CAPACITY: u64 = 10_000;

/// Shared response cache.
///
/// Cloning is cheap and every clone sees the same entries, so one instance
/// can be handed to every client in the process. Only successful responses
/// are stored; failures are returned to every waiting caller and then
/// forgotten.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<String, Arc<Value>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `query`, or runs `fetch` to produce it.
    ///
    /// Concurrent calls with the same query while `fetch` is in flight wait
    /// for that single fetch instead of starting their own.
    pub async fn get_or_fetch<F>(&self, query: &str, fetch: F) -> Result<Arc<Value>>
    where
        F: Future<Output = Result<Arc<Value>>>,
    {
        if self.inner.contains_key(query) {
            debug!(query_len = query.len(), "Cache hit");
        } else {
            debug!(query_len = query.len(), "Cache miss");
        }

        self.inner
            .try_get_with(query.to_string(), fetch)
            .await
            .map_err(|e: Arc<TrafficError>| (*e).clone())
    }

    pub async fn get(&self, query: &str) -> Option<Arc<Value>> {
        self.inner.get(query).await
    }

    pub async fn invalidate(&self, query: &str) {
        self.inner.invalidate(query).await;
    }

    /// Drops every entry so the next fetch goes to the network.
    pub fn clear(&self) {
        self.inner.invalidate_all();
        info!("Query cache cleared");
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let cache = QueryCache::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_fetch("q", async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TrafficError>(Arc::new(json!({"n": 1})))
                })
                .await
                .unwrap();
            assert_eq!(value["n"], 1);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = QueryCache::default();

        let first = cache
            .get_or_fetch("q", async { Err::<Arc<Value>, _>(TrafficError::rejected("boom")) })
            .await;
        assert_eq!(first, Err(TrafficError::rejected("boom")));

        let second = cache
            .get_or_fetch("q", async { Ok::<_, TrafficError>(Arc::new(json!(2))) })
            .await
            .unwrap();
        assert_eq!(*second, json!(2));
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let cache = QueryCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let fetch = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TrafficError>(Arc::new(json!(null)))
        };

        cache.get_or_fetch("q", fetch()).await.unwrap();
        cache.clear();
        cache.get_or_fetch("q", fetch()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = QueryCache::new(Duration::from_millis(50));
        cache
            .get_or_fetch("q", async { Ok::<_, TrafficError>(Arc::new(json!(1))) })
            .await
            .unwrap();
        assert!(cache.get("q").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("q").await.is_none());
    }
}
