//! GraphQL access to the traffic-data API.
//!
//! [`TrafficApi`] sends a query through an [`HttpClient`], retries transport
//! failures according to its [`RetryPolicy`] and memoizes successful
//! responses in a shared [`QueryCache`].

mod basic;
mod client;
mod retry;

pub use basic::{BasicClient, DEFAULT_TIMEOUT};
pub use client::HttpClient;
pub use retry::{Backoff, RetryPolicy};

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use crate::cache::QueryCache;
use crate::error::{Result, TrafficError};

/// Public endpoint of the Norwegian road authority's traffic-data API.
pub const DEFAULT_API_URL: &str = "https://trafikkdata-api.atlas.vegvesen.no";

pub struct TrafficApi<C> {
    client: Arc<C>,
    url: String,
    retry: RetryPolicy,
    cache: QueryCache,
}

impl<C> Clone for TrafficApi<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            url: self.url.clone(),
            retry: self.retry.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<C: HttpClient> TrafficApi<C> {
    pub fn new(client: C, url: impl Into<String>, retry: RetryPolicy, cache: QueryCache) -> Self {
        Self {
            client: Arc::new(client),
            url: url.into(),
            retry,
            cache,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Forgets every memoized response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Executes `query` and returns the `data` member of the response.
    ///
    /// A missing or null `data` member comes back as [`Value::Null`]; use
    /// [`extract`] to tell "no data" apart from a usable payload.
    pub async fn fetch(&self, query: &str) -> Result<Arc<Value>> {
        self.cache
            .get_or_fetch(query, self.fetch_uncached(query))
            .await
    }

    /// Like [`TrafficApi::fetch`], but discards any cached response for
    /// `query` first so the request always reaches the network. The fresh
    /// response replaces the old entry.
    pub async fn fetch_fresh(&self, query: &str) -> Result<Arc<Value>> {
        self.cache.invalidate(query).await;
        self.fetch(query).await
    }

    async fn fetch_uncached(&self, query: &str) -> Result<Arc<Value>> {
        let body = json!({ "query": query });
        let client = self.client.as_ref();
        let url = self.url.as_str();
        let body = &body;

        let response = self.retry.run(|| client.post_json(url, body)).await?;

        if let Some(message) = first_error_message(&response) {
            warn!(error = %message, "API rejected query");
            return Err(TrafficError::rejected(message));
        }

        let data = response.get("data").cloned().unwrap_or(Value::Null);
        Ok(Arc::new(data))
    }
}

/// First message of a GraphQL `errors` list, if the list is non-empty.
fn first_error_message(response: &Value) -> Option<String> {
    let first = response.get("errors")?.as_array()?.first()?;
    let message = first
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| first.to_string());
    Some(message)
}

/// Walks `path` through nested objects.
///
/// Returns `None` when any step is missing or null, or when the final value
/// is an empty array: all of these mean the API has nothing for the request.
pub fn extract<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = data;
    for key in path {
        node = node.get(*key)?;
        if node.is_null() {
            return None;
        }
    }
    match node {
        Value::Array(items) if items.is_empty() => None,
        _ => Some(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays canned outcomes in order and counts how often it was called.
    struct ScriptedClient {
        script: Mutex<VecDeque<anyhow::Result<Value>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedClient {
        fn new(script: Vec<anyhow::Result<Value>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn post_json(&self, _url: &str, body: &Value) -> anyhow::Result<Value> {
            assert!(body["query"].is_string());
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn api(client: ScriptedClient) -> TrafficApi<ScriptedClient> {
        TrafficApi::new(
            client,
            "http://localhost",
            RetryPolicy::new(3, Duration::from_millis(1), Backoff::Exponential),
            QueryCache::default(),
        )
    }

    fn calls(api: &TrafficApi<ScriptedClient>) -> usize {
        api.client.calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_fetch_returns_data_member() {
        let api = api(ScriptedClient::new(vec![Ok(json!({"data": {"x": 1}}))]));
        let data = api.fetch("{ q }").await.unwrap();
        assert_eq!(data["x"], 1);
    }

    #[tokio::test]
    async fn test_identical_queries_hit_network_once() {
        let api = api(ScriptedClient::new(vec![Ok(json!({"data": {"x": 1}}))]));

        api.fetch("{ q }").await.unwrap();
        api.fetch("{ q }").await.unwrap();

        assert_eq!(calls(&api), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_queries_share_one_call() {
        let client = ScriptedClient::new(vec![Ok(json!({"data": {"x": 1}}))])
            .slow(Duration::from_millis(50));
        let api = api(client);

        let (a, b) = tokio::join!(api.fetch("{ q }"), api.fetch("{ q }"));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls(&api), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_network_call() {
        let api = api(ScriptedClient::new(vec![
            Ok(json!({"data": {"x": 1}})),
            Ok(json!({"data": {"x": 2}})),
        ]));

        api.fetch("{ q }").await.unwrap();
        api.clear_cache();
        let data = api.fetch("{ q }").await.unwrap();

        assert_eq!(data["x"], 2);
        assert_eq!(calls(&api), 2);
    }

    #[tokio::test]
    async fn test_fetch_fresh_skips_cached_response() {
        let api = api(ScriptedClient::new(vec![
            Ok(json!({"data": {"x": 1}})),
            Ok(json!({"data": {"x": 2}})),
        ]));

        api.fetch("{ q }").await.unwrap();
        let fresh = api.fetch_fresh("{ q }").await.unwrap();
        let cached = api.fetch("{ q }").await.unwrap();

        assert_eq!(fresh["x"], 2);
        assert_eq!(cached["x"], 2);
        assert_eq!(calls(&api), 2);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let api = api(ScriptedClient::new(vec![
            Err(anyhow::anyhow!("timeout")),
            Err(anyhow::anyhow!("timeout")),
            Ok(json!({"data": {"x": 3}})),
        ]));

        let data = api.fetch("{ q }").await.unwrap();

        assert_eq!(data["x"], 3);
        assert_eq!(calls(&api), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_transport_failure() {
        let api = api(ScriptedClient::new(vec![
            Err(anyhow::anyhow!("refused 1")),
            Err(anyhow::anyhow!("refused 2")),
            Err(anyhow::anyhow!("refused 3")),
        ]));

        let err = api.fetch("{ q }").await.unwrap_err();

        assert_eq!(
            err,
            TrafficError::TransportFailure {
                attempts: 3,
                message: "refused 3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_graphql_errors_are_rejections_and_not_retried() {
        let api = api(ScriptedClient::new(vec![Ok(json!({
            "errors": [
                {"message": "Unknown trafficRegistrationPointId"},
                {"message": "second"}
            ]
        }))]));

        let err = api.fetch("{ q }").await.unwrap_err();

        assert_eq!(err, TrafficError::rejected("Unknown trafficRegistrationPointId"));
        assert_eq!(calls(&api), 1);
    }

    #[tokio::test]
    async fn test_missing_data_is_null() {
        let api = api(ScriptedClient::new(vec![Ok(json!({}))]));
        let data = api.fetch("{ q }").await.unwrap();
        assert!(data.is_null());
    }

    #[test]
    fn test_extract_walks_nested_objects() {
        let data = json!({"a": {"b": {"c": [1, 2]}}});
        assert_eq!(extract(&data, &["a", "b", "c"]), Some(&json!([1, 2])));
    }

    #[test]
    fn test_extract_treats_null_and_empty_as_absent() {
        assert_eq!(extract(&json!({"a": null}), &["a", "b"]), None);
        assert_eq!(extract(&json!({"a": {"b": []}}), &["a", "b"]), None);
        assert_eq!(extract(&json!({}), &["a"]), None);
        assert_eq!(extract(&Value::Null, &["a"]), None);
    }
}
