use std::time::Duration;

use anyhow::Result;

use super::types::{NeighborsResponse, NodeRecord};
use crate::hashspace::RingId;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
const RETRY_ATTEMPTS: usize = 3;

/// Node-side HTTP client for the registry's ring lookups.
///
/// Used where the datagram protocol does not carry enough context: resolving
/// a bare pointer id to an address, and finding the predecessor-of-predecessor
/// during leave migration.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base: String,
}

impl RegistryClient {
    pub fn new(registry_http: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{}", registry_http),
        }
    }

    /// Resolves a ring position to its registered address, if any.
    pub async fn node_address(&self, id: RingId) -> Result<Option<String>> {
        let url = format!("{}/ns/node/{}", self.base, id);
        let response = self.get_with_retry(&url).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("node lookup failed: {}", response.status()));
        }
        let record: NodeRecord = response.json().await?;
        Ok(Some(record.address))
    }

    /// Ring-order neighbors of `address`, per the registry's current table.
    pub async fn neighbors(&self, address: &str) -> Result<Option<NeighborsResponse>> {
        let url = format!("{}/ns/neighbors/{}", self.base, address);
        let response = self.get_with_retry(&url).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "neighbor lookup failed: {}",
                response.status()
            ));
        }
        Ok(Some(response.json().await?))
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;
        for attempt in 0..RETRY_ATTEMPTS {
            match self
                .http
                .get(url)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == RETRY_ATTEMPTS {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }
        Err(anyhow::anyhow!("retry attempts exhausted"))
    }
}
