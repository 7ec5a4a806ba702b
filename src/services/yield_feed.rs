//! # Yield Feed
//!
//! Pool listings from the DefiLlama yields API. The feed is best effort:
//! entries that do not deserialize are dropped rather than failing the scan.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::retry::{Backoff, RetryClass, RetryPolicy, retry_bounded};
use crate::agent::types::AgentError;

/// One row of the aggregator's `/pools` listing. Every field is optional
/// because the feed routinely omits some of them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldPool {
    pub pool: Option<String>,
    pub project: Option<String>,
    pub chain: Option<String>,
    pub symbol: Option<String>,
    pub apy: Option<f64>,
    pub tvl_usd: Option<f64>,
    pub volume_usd_7d: Option<f64>,
    pub underlying_tokens: Option<Vec<String>>,
}

#[async_trait]
pub trait YieldSource: Send + Sync {
    async fn fetch_pools(&self) -> Result<Vec<YieldPool>, AgentError>;
}

pub struct DefiLlamaClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DefiLlamaClient {
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Exponential {
                    initial: Duration::from_secs(1),
                    multiplier: 2,
                    max: Duration::from_secs(5),
                },
            },
        })
    }

    async fn fetch_once(&self) -> Result<Value, AgentError> {
        let response = self.client.get(format!("{}/pools", self.base_url)).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited("yield API returned 429".to_string()));
        }
        if !status.is_success() {
            return Err(AgentError::YieldApi(format!("pools request failed with status {}", status)));
        }
        Ok(response.json().await?)
    }
}

/// Pulls the pool rows out of a `{ "status": .., "data": [..] }` envelope.
pub(crate) fn parse_pools(body: &Value) -> Result<Vec<YieldPool>, AgentError> {
    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| AgentError::YieldApi("response has no data array".to_string()))?;

    let pools: Vec<YieldPool> = rows
        .iter()
        .filter_map(|row| serde_json::from_value(row.clone()).ok())
        .collect();

    if pools.len() < rows.len() {
        debug!("Dropped {} malformed pool rows", rows.len() - pools.len());
    }
    Ok(pools)
}

#[async_trait]
impl YieldSource for DefiLlamaClient {
    async fn fetch_pools(&self) -> Result<Vec<YieldPool>, AgentError> {
        let body = retry_bounded(
            &self.retry,
            |e: &AgentError| {
                if e.is_transient() {
                    RetryClass::Backoff
                } else {
                    RetryClass::Stop
                }
            },
            |attempt| async move {
                let result = self.fetch_once().await;
                if let Err(e) = &result {
                    warn!("Yield API attempt {} failed: {}", attempt, e);
                }
                result
            },
        )
        .await
        .map_err(|e| e.into_inner())?;

        parse_pools(&body)
    }
}
