use std::time::Duration;

use super::client::HttpClient;
use async_trait::async_trait;
use serde_json::Value;

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn post_json(&self, url: &str, body: &Value) -> anyhow::Result<Value> {
        let response = self
            .0
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send request: {}", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            // GraphQL servers may report query errors with a 4xx status
            if let Ok(json) = serde_json::from_str::<Value>(&text) {
                if json.get("errors").is_some() {
                    return Ok(json);
                }
            }
            return Err(anyhow::anyhow!("API returned status {}: {}", status, text));
        }

        serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))
    }
}
