//! # Yield Rotator
//!
//! Keeps a Solana wallet's liquidity in the best-paying Raydium AMM v4 pool
//! that pairs with SOL.
//!
//! ## Features
//! - Pool discovery from the DefiLlama yield feed, cross-checked against the
//!   Raydium registry
//! - Withdraw, consolidate, rebalance and deposit migration with bounded retries
//! - Jupiter swaps for consolidation and rebalancing
//! - Structured logging with tracing
//!
//! ## Architecture
//! - `config`: environment variable configuration
//! - `wallet`: keypair loading and verification
//! - `agent`: discovery, switch decision, migration and the scan scheduler
//! - `services`: chain RPC, Jupiter and yield feed clients
//! - `onchain_instance`: Raydium AMM v4 registry and instruction builders
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and set at least:
//! ```bash
//! SOLANA_PUBLIC_KEY=...
//! SOLANA_PRIVATE_KEY=...   # base58
//! ```
//!
//! ## Running
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

mod agent;
mod config;
mod onchain_instance;
mod services;
mod wallet;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use solana_sdk::{native_token::LAMPORTS_PER_SOL, signature::Signer};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::agent::Scheduler;
use crate::agent::discovery::PoolDiscoveryService;
use crate::agent::executor::TransactionExecutor;
use crate::agent::orchestrator::LiquidityMigrationOrchestrator;
use crate::config::Config;
use crate::onchain_instance::instance::RaydiumAmm;
use crate::services::chain_rpc::{ChainRpc, SolanaRpc};
use crate::services::swap_engine::JupiterClient;
use crate::services::yield_feed::DefiLlamaClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    info!("🏁 Starting yield rotator...");
    info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration from environment")?;
    let wallet = wallet::load_keypair(&config.wallet.private_key, &config.wallet.public_key)
        .context("Wallet verification failed")?;
    let wallet = Arc::new(wallet);
    info!("🔑 Wallet {} verified", config.wallet.public_key);

    let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(&config.endpoints.rpc_url));
    match rpc.native_balance(&wallet.pubkey()).await {
        Ok(lamports) => info!("💰 Wallet balance: {:.4} SOL", lamports as f64 / LAMPORTS_PER_SOL as f64),
        Err(e) => warn!("Could not read wallet balance: {}", e),
    }

    let venue = Arc::new(
        RaydiumAmm::new(
            &config.endpoints.raydium_api_url,
            rpc.clone(),
            Duration::from_secs(config.execution.registry_cache_ttl_secs),
            config.execution.compute_unit_price_micro_lamports,
        )
        .context("Failed to build Raydium client")?,
    );
    let swapper = Arc::new(
        JupiterClient::new(&config.endpoints.jupiter_api_url, config.execution.priority_fee_lamports)
            .context("Failed to build Jupiter client")?,
    );
    let yield_source = Arc::new(
        DefiLlamaClient::new(&config.endpoints.yield_api_url).context("Failed to build yield feed client")?,
    );

    let executor = Arc::new(TransactionExecutor::new(rpc.clone(), wallet, config.executor_settings()));
    let orchestrator = LiquidityMigrationOrchestrator::new(
        rpc.clone(),
        venue.clone(),
        swapper,
        executor,
        config.migration_settings(),
    );
    let discovery = PoolDiscoveryService::new(yield_source, venue.clone(), config.discovery_filter())
        .with_retry(config.read_retry_policy());
    let mut scheduler = Scheduler::new(discovery, orchestrator, venue, config.scheduler_settings());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Ctrl-C received, finishing the current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Could not listen for Ctrl-C, running until killed: {}", e),
        }
    });

    scheduler.run(shutdown_rx).await;

    info!("Final state: {:?}", scheduler.state());
    let stats = serde_json::to_string(scheduler.stats()).unwrap_or_default();
    info!("Final stats: {}", stats);
    Ok(())
}
