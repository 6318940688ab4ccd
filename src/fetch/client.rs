use async_trait::async_trait;
use serde_json::Value;

/// Transport seam for the traffic API: one JSON document in, one out.
///
/// Implementations report network problems, timeouts and non-success HTTP
/// statuses as errors. A well-formed body is returned as-is even when it
/// carries a GraphQL `errors` list; interpreting it is the caller's job.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> anyhow::Result<Value>;
}
