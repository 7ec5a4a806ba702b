//! # Pool Discovery
//!
//! Scans the yield aggregator for the best-paying eligible pool and confirms
//! it against the AMM registry before handing it to the decision step.
//!
//! Eligibility:
//! - chain is Solana and the project is the target AMM (case-insensitive)
//! - one of the symbol's tickers is exactly `SOL` or `WSOL`
//! - TVL and 7-day volume meet the configured floors (missing volume is 0)

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::agent::retry::{RetryPolicy, retry_transient};
use crate::agent::types::{AgentError, PoolCandidate};
use crate::onchain_instance::instance::AmmVenue;
use crate::services::yield_feed::{YieldPool, YieldSource};

const SOLANA_CHAIN: &str = "solana";
const NATIVE_TICKERS: [&str; 2] = ["SOL", "WSOL"];

#[derive(Debug, Clone)]
pub struct DiscoveryFilter {
    pub project: String,
    pub min_tvl_usd: f64,
    pub min_volume_7d_usd: f64,
}

impl Default for DiscoveryFilter {
    fn default() -> Self {
        Self {
            project: "raydium-amm".to_string(),
            min_tvl_usd: 25_000_000.0,
            min_volume_7d_usd: 1_000_000.0,
        }
    }
}

/// Splits a pair symbol such as `RAY-SOL` or `WSOL/USDC` into tickers.
pub fn symbol_tickers(symbol: &str) -> Vec<String> {
    symbol
        .split(['-', '/', ' ', '_'])
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect()
}

fn has_native_ticker(symbol: &str) -> bool {
    symbol_tickers(symbol)
        .iter()
        .any(|ticker| NATIVE_TICKERS.contains(&ticker.as_str()))
}

impl DiscoveryFilter {
    pub fn accepts(&self, pool: &YieldPool) -> bool {
        let chain_ok = pool
            .chain
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(SOLANA_CHAIN));
        let project_ok = pool
            .project
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(&self.project));
        let symbol_ok = pool.symbol.as_deref().is_some_and(has_native_ticker);
        let tvl_ok = pool.tvl_usd.is_some_and(|tvl| tvl >= self.min_tvl_usd);
        let volume_ok = pool.volume_usd_7d.unwrap_or(0.0) >= self.min_volume_7d_usd;

        chain_ok && project_ok && symbol_ok && tvl_ok && volume_ok && pool.apy.is_some()
    }
}

/// Highest APY among the pools `filter` accepts; the earliest wins a tie.
pub fn select_best<'a>(pools: &'a [YieldPool], filter: &DiscoveryFilter) -> Option<&'a YieldPool> {
    let mut best: Option<&YieldPool> = None;
    for pool in pools.iter().filter(|p| filter.accepts(p)) {
        let apy = pool.apy.unwrap_or(0.0);
        match best {
            Some(current) if current.apy.unwrap_or(0.0) >= apy => {}
            _ => best = Some(pool),
        }
    }
    best
}

pub struct PoolDiscoveryService {
    source: Arc<dyn YieldSource>,
    venue: Arc<dyn AmmVenue>,
    filter: DiscoveryFilter,
    retry: RetryPolicy,
    native_mint: Pubkey,
}

impl PoolDiscoveryService {
    pub fn new(source: Arc<dyn YieldSource>, venue: Arc<dyn AmmVenue>, filter: DiscoveryFilter) -> Self {
        Self {
            source,
            venue,
            filter,
            retry: RetryPolicy::fixed(3, Duration::from_secs(10)),
            native_mint: spl_token::native_mint::id(),
        }
    }

    /// Retry budget for transient registry failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The best eligible pool, or `None` when nothing qualifies or any lookup
    /// fails along the way.
    pub async fn find_best_pool(&self) -> Option<PoolCandidate> {
        match self.discover().await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Pool discovery failed: {}", e);
                None
            }
        }
    }

    async fn discover(&self) -> Result<Option<PoolCandidate>, AgentError> {
        let pools = self.source.fetch_pools().await?;
        let eligible = pools.iter().filter(|p| self.filter.accepts(p)).count();
        info!("Yield feed returned {} pools, {} eligible", pools.len(), eligible);

        let Some(best) = select_best(&pools, &self.filter) else {
            info!("No pool passes the discovery filters");
            return Ok(None);
        };
        let symbol = best.symbol.clone().unwrap_or_default();
        debug!("Best yield pool {} ({:?}) at {:?}% APY", symbol, best.pool, best.apy);

        let Some((mint_a, mint_b)) = self.resolve_mints(best, &symbol).await? else {
            warn!("Could not resolve mints for {}", symbol);
            return Ok(None);
        };

        let lookup = retry_transient(&self.retry, "pool lookup", || self.venue.pool_by_mints(&mint_a, &mint_b));
        let Some(pool) = lookup.await? else {
            warn!("No registry pool for {} ({} / {})", symbol, mint_a, mint_b);
            return Ok(None);
        };
        if !pool.contains_mint(&self.native_mint) {
            warn!("Registry pool {} for {} does not pair with SOL", pool.id, symbol);
            return Ok(None);
        }

        let candidate = PoolCandidate {
            pool_id: pool.id,
            symbol,
            apy: best.apy.unwrap_or(0.0),
            tvl_usd: best.tvl_usd.unwrap_or(0.0),
            volume_7d_usd: best.volume_usd_7d.unwrap_or(0.0),
            mint_a: pool.mint_a.mint,
            mint_b: pool.mint_b.mint,
        };
        info!(
            "Best candidate {} ({}) APY {:.2}% TVL ${:.0}",
            candidate.pool_id, candidate.symbol, candidate.apy, candidate.tvl_usd
        );
        Ok(Some(candidate))
    }

    async fn resolve_mints(&self, pool: &YieldPool, symbol: &str) -> Result<Option<(Pubkey, Pubkey)>, AgentError> {
        if let Some(tokens) = pool.underlying_tokens.as_ref().filter(|t| t.len() >= 2) {
            let parsed: Option<Vec<Pubkey>> = tokens.iter().map(|t| Pubkey::from_str(t).ok()).collect();
            if let Some(mints) = parsed {
                return Ok(Some((mints[0], mints[1])));
            }
            debug!("Unparseable underlying tokens for {}, falling back to symbols", symbol);
        }

        let tickers = symbol_tickers(symbol);
        let [first, second] = tickers.as_slice() else {
            return Ok(None);
        };
        let (mint_a, mint_b) = try_join(
            retry_transient(&self.retry, "symbol lookup", || self.venue.mint_for_symbol(first)),
            retry_transient(&self.retry, "symbol lookup", || self.venue.mint_for_symbol(second)),
        )
        .await?;
        Ok(mint_a.zip(mint_b))
    }
}
