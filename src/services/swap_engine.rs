//! Swap Engine Service
//!
//! Jupiter v6 quotes and swap transactions. Swaps are returned unsigned; the
//! transaction executor re-binds them to a fresh blockhash and signs them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash, message::VersionedMessage, pubkey::Pubkey, transaction::VersionedTransaction,
};
use tracing::debug;

use crate::agent::executor::TransactionBuilder;
use crate::agent::types::AgentError;

/// Jupiter API quote response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterQuote {
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "otherAmountThreshold", skip_serializing_if = "Option::is_none")]
    pub other_amount_threshold: Option<String>,
    #[serde(rename = "slippageBps", skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u16>,
    #[serde(rename = "priceImpactPct", skip_serializing_if = "Option::is_none")]
    pub price_impact_pct: Option<String>,
    /// Route plan and whatever else Jupiter sends; echoed back verbatim on `/swap`.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Jupiter swap request payload
#[derive(Debug, Clone, Serialize)]
struct JupiterSwapRequest<'a> {
    #[serde(rename = "userPublicKey")]
    user_public_key: String,
    #[serde(rename = "quoteResponse")]
    quote_response: &'a JupiterQuote,
    #[serde(rename = "wrapAndUnwrapSol")]
    wrap_and_unwrap_sol: bool,
    #[serde(rename = "dynamicComputeUnitLimit")]
    dynamic_compute_unit_limit: bool,
    #[serde(rename = "prioritizationFeeLamports")]
    prioritization_fee_lamports: u64,
}

/// Jupiter API swap response
#[derive(Debug, Clone, Deserialize)]
struct JupiterSwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
}

#[async_trait]
pub trait SwapAggregator: Send + Sync {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<JupiterQuote, AgentError>;

    /// Unsigned swap transaction for `quote`, paid for and signed by `user`.
    async fn swap_transaction(&self, quote: &JupiterQuote, user: &Pubkey) -> Result<VersionedTransaction, AgentError>;
}

pub struct JupiterClient {
    client: Client,
    base_url: String,
    priority_fee_lamports: u64,
}

impl JupiterClient {
    pub fn new(base_url: &str, priority_fee_lamports: u64) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            priority_fee_lamports,
        })
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AgentError::RateLimited(format!("Jupiter {} rate limited: {}", what, body)));
    }
    Err(AgentError::JupiterApi(format!(
        "{} request failed with status {}: {}",
        what, status, body
    )))
}

pub(crate) fn decode_swap_transaction(encoded: &str) -> Result<VersionedTransaction, AgentError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| AgentError::JupiterApi(format!("Failed to decode swap transaction: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| AgentError::JupiterApi(format!("Failed to deserialize versioned transaction: {}", e)))
}

#[async_trait]
impl SwapAggregator for JupiterClient {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<JupiterQuote, AgentError> {
        let params = [
            ("inputMint", input_mint.to_string()),
            ("outputMint", output_mint.to_string()),
            ("amount", amount.to_string()),
            ("slippageBps", slippage_bps.to_string()),
        ];

        let response = self
            .client
            .get(format!("{}/quote", self.base_url))
            .query(&params)
            .send()
            .await?;
        let quote: JupiterQuote = check_status(response, "quote").await?.json().await?;

        debug!(
            "Jupiter quote {} {} -> {} {}",
            quote.in_amount, quote.input_mint, quote.out_amount, quote.output_mint
        );
        Ok(quote)
    }

    async fn swap_transaction(&self, quote: &JupiterQuote, user: &Pubkey) -> Result<VersionedTransaction, AgentError> {
        let request = JupiterSwapRequest {
            user_public_key: user.to_string(),
            quote_response: quote,
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: self.priority_fee_lamports,
        };

        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&request)
            .send()
            .await?;
        let swap: JupiterSwapResponse = check_status(response, "swap").await?.json().await?;

        decode_swap_transaction(&swap.swap_transaction)
    }
}

/// Builds a fresh Jupiter swap for every submission attempt, so a re-sign
/// after blockhash expiry also picks up a current route.
pub struct SwapTransactionBuilder {
    pub aggregator: Arc<dyn SwapAggregator>,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
    pub user: Pubkey,
}

#[async_trait]
impl TransactionBuilder for SwapTransactionBuilder {
    fn describe(&self) -> String {
        format!("swap {} {} -> {}", self.amount, self.input_mint, self.output_mint)
    }

    async fn build_message(&self, blockhash: Hash) -> Result<VersionedMessage, AgentError> {
        let quote = self
            .aggregator
            .quote(&self.input_mint, &self.output_mint, self.amount, self.slippage_bps)
            .await?;
        let transaction = self.aggregator.swap_transaction(&quote, &self.user).await?;

        let mut message = transaction.message;
        message.set_recent_blockhash(blockhash);
        Ok(message)
    }
}
