//! # Position Inventory
//!
//! Finds the LP positions a wallet currently holds by matching its token
//! holdings against the AMM registry's LP mints.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::agent::retry::{RetryPolicy, retry_transient};
use crate::agent::types::{AgentError, Position};
use crate::onchain_instance::instance::AmmVenue;
use crate::services::chain_rpc::ChainRpc;

pub struct PositionInventory {
    rpc: Arc<dyn ChainRpc>,
    venue: Arc<dyn AmmVenue>,
    retry: RetryPolicy,
}

impl PositionInventory {
    pub fn new(rpc: Arc<dyn ChainRpc>, venue: Arc<dyn AmmVenue>, retry: RetryPolicy) -> Self {
        Self { rpc, venue, retry }
    }

    /// Every LP position with a non-zero balance. Ordinary tokens are skipped,
    /// and so is any holding whose registry lookup keeps failing.
    pub async fn list_positions(&self, owner: &Pubkey) -> Result<Vec<Position>, AgentError> {
        let holdings = retry_transient(&self.retry, "token holdings", || self.rpc.token_holdings(owner)).await?;
        let mut positions = Vec::new();

        for holding in holdings.into_iter().filter(|h| h.amount > 0) {
            let lookup = retry_transient(&self.retry, "LP mint lookup", || {
                self.venue.pool_by_lp_mint(&holding.mint)
            });
            let pool = match lookup.await {
                Ok(Some(pool)) => pool,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping holding {}: LP lookup failed: {}", holding.mint, e);
                    continue;
                }
            };

            let decimals = match holding.decimals {
                Some(decimals) => decimals,
                None => retry_transient(&self.retry, "LP balance", || self.rpc.token_balance(owner, &holding.mint))
                    .await
                    .ok()
                    .flatten()
                    .and_then(|h| h.decimals)
                    .unwrap_or(pool.lp_decimals),
            };

            debug!("LP position in {}: {} (decimals {})", pool.id, holding.amount, decimals);
            positions.push(Position {
                pool_id: pool.id,
                lp_mint: holding.mint,
                raw_balance: holding.amount,
                decimals,
            });
        }

        info!("Wallet {} holds {} LP positions", owner, positions.len());
        Ok(positions)
    }

    /// Current raw LP balance, read just before acting on a position.
    pub async fn lp_balance(&self, owner: &Pubkey, lp_mint: &Pubkey) -> Result<u64, AgentError> {
        Ok(retry_transient(&self.retry, "LP balance", || self.rpc.token_balance(owner, lp_mint))
            .await?
            .map(|h| h.amount)
            .unwrap_or(0))
    }
}
