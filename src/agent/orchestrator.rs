//! # Liquidity Migration Orchestrator
//!
//! Moves the wallet's liquidity into a new pool:
//!
//! ```text
//! Inventory -> Withdraw* -> Consolidate* -> Rebalance -> Deposit -> Success | Failed
//! ```
//!
//! Steps run strictly in order with a random pause between them. Withdraw and
//! consolidate failures are per item and never abort the migration; a failed
//! rebalance or deposit does. Nothing is rolled back: a failed migration can
//! leave the wallet holding SOL, the pool's other token, or both.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, error, info, warn};

use crate::agent::calculator::{DepositInputs, compute_deposit, compute_native_fixed_deposit};
use crate::agent::executor::{InstructionTransaction, TransactionExecutor};
use crate::agent::inventory::PositionInventory;
use crate::agent::retry::{RetryPolicy, retry_transient};
use crate::agent::types::{
    AgentError, EngineState, LiquidityAmounts, MigrationOutcome, MigrationPlan, MigrationReport, PoolCandidate,
    Position, TxOutcome,
};
use crate::onchain_instance::instance::{AmmPool, AmmVenue};
use crate::services::chain_rpc::ChainRpc;
use crate::services::swap_engine::{SwapAggregator, SwapTransactionBuilder};

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub withdraw_slippage_bps: u16,
    pub deposit_slippage_bps: u16,
    pub deposit_retry_slippage_bps: u16,
    pub swap_slippage_bps: u16,
    /// Lamports always left in the wallet for fees and rent.
    pub min_native_reserve: u64,
    pub step_delay_min: Duration,
    pub step_delay_max: Duration,
    /// Applied to every registry and chain read; only transient errors retry.
    pub read_retry: RetryPolicy,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            withdraw_slippage_bps: 100,
            deposit_slippage_bps: 100,
            deposit_retry_slippage_bps: 1_000,
            swap_slippage_bps: 50,
            min_native_reserve: 50_000_000,
            step_delay_min: Duration::from_millis(2_000),
            step_delay_max: Duration::from_millis(7_000),
            read_retry: RetryPolicy::fixed(3, Duration::from_secs(10)),
        }
    }
}

pub struct LiquidityMigrationOrchestrator {
    rpc: Arc<dyn ChainRpc>,
    venue: Arc<dyn AmmVenue>,
    swapper: Arc<dyn SwapAggregator>,
    executor: Arc<TransactionExecutor>,
    inventory: PositionInventory,
    settings: MigrationSettings,
    native_mint: Pubkey,
}

impl LiquidityMigrationOrchestrator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        venue: Arc<dyn AmmVenue>,
        swapper: Arc<dyn SwapAggregator>,
        executor: Arc<TransactionExecutor>,
        settings: MigrationSettings,
    ) -> Self {
        let inventory = PositionInventory::new(rpc.clone(), venue.clone(), settings.read_retry);
        Self {
            rpc,
            venue,
            swapper,
            executor,
            inventory,
            settings,
            native_mint: spl_token::native_mint::id(),
        }
    }

    pub async fn migrate(&self, candidate: &PoolCandidate) -> MigrationOutcome {
        let owner = self.executor.wallet_pubkey();
        let mut report = MigrationReport::default();
        info!(
            "Migrating {} into {} ({}) at {:.2}% APY",
            owner, candidate.pool_id, candidate.symbol, candidate.apy
        );

        let plan = match self.plan(candidate, &owner).await {
            Ok(plan) => plan,
            Err(e) => {
                error!("Migration planning failed: {}", e);
                return Self::finish(MigrationOutcome::failed(report, format!("inventory: {}", e)));
            }
        };

        if plan.positions_to_remove.is_empty() {
            info!("No LP positions to withdraw");
        } else {
            self.withdraw_all(&plan, &owner, &mut report).await;
            self.pause().await;
        }

        self.consolidate(&plan, &owner, &mut report).await;
        self.pause().await;

        if let Err(e) = self.rebalance(&plan, &owner, &mut report).await {
            error!("Rebalance failed, aborting migration: {}", e);
            return Self::finish(MigrationOutcome::failed(report, format!("rebalance: {}", e)));
        }
        self.pause().await;

        match self.deposit(&plan, &owner, &mut report).await {
            Ok(()) => {
                let state = EngineState {
                    current_pool_id: Some(candidate.pool_id.clone()),
                    current_apy: candidate.apy,
                };
                Self::finish(MigrationOutcome::success(state, report))
            }
            Err(e) => {
                error!("Deposit into {} failed: {}", candidate.pool_id, e);
                Self::finish(MigrationOutcome::failed(report, format!("deposit: {}", e)))
            }
        }
    }

    fn finish(outcome: MigrationOutcome) -> MigrationOutcome {
        let summary = serde_json::to_string(&outcome.report).unwrap_or_default();
        if outcome.succeeded {
            info!("Migration succeeded: {}", summary);
        } else {
            warn!("Migration failed: {}", summary);
        }
        outcome
    }

    async fn plan(&self, candidate: &PoolCandidate, owner: &Pubkey) -> Result<MigrationPlan, AgentError> {
        let other_token_mint = candidate
            .other_mint(&self.native_mint)
            .ok_or_else(|| AgentError::Registry(format!("{} does not pair with SOL", candidate.pool_id)))?;
        let positions_to_remove = self.inventory.list_positions(owner).await?;

        Ok(MigrationPlan {
            candidate: candidate.clone(),
            positions_to_remove,
            other_token_mint,
            base_mint: self.native_mint,
        })
    }

    async fn withdraw_all(&self, plan: &MigrationPlan, owner: &Pubkey, report: &mut MigrationReport) {
        for position in &plan.positions_to_remove {
            match self.withdraw(position, owner).await {
                Ok(Some(outcome)) => {
                    info!("Withdrew {} from {}: {}", position.raw_balance, position.pool_id, outcome.signature);
                    report.withdrawn.push(position.pool_id.clone());
                }
                Ok(None) => debug!("Position in {} already empty", position.pool_id),
                Err(e) => {
                    warn!("Withdraw from {} failed, continuing: {}", position.pool_id, e);
                    report.withdraw_failures.push(format!("{}: {}", position.pool_id, e));
                }
            }
        }
    }

    async fn withdraw(&self, position: &Position, owner: &Pubkey) -> Result<Option<TxOutcome>, AgentError> {
        let balance = self.inventory.lp_balance(owner, &position.lp_mint).await?;
        if balance == 0 {
            return Ok(None);
        }

        let pool = self.pool(&position.pool_id).await?;
        let instructions = retry_transient(&self.settings.read_retry, "withdraw instructions", || {
            self.venue
                .withdraw_instructions(&pool, owner, balance, self.settings.withdraw_slippage_bps)
        })
        .await?;
        let transaction = InstructionTransaction {
            label: format!("withdraw {}", pool.id),
            payer: *owner,
            instructions,
        };
        self.executor.submit_and_confirm(&transaction).await.map(Some)
    }

    async fn consolidate(&self, plan: &MigrationPlan, owner: &Pubkey, report: &mut MigrationReport) {
        let holdings = match retry_transient(&self.settings.read_retry, "token holdings", || {
            self.rpc.token_holdings(owner)
        })
        .await
        {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!("Could not list token holdings, skipping consolidation: {}", e);
                return;
            }
        };

        let mut excluded: HashSet<Pubkey> = plan.positions_to_remove.iter().map(|p| p.lp_mint).collect();
        excluded.insert(plan.base_mint);

        for holding in holdings
            .into_iter()
            .filter(|h| h.amount > 0 && !excluded.contains(&h.mint))
        {
            let builder = self.swap(holding.mint, plan.base_mint, holding.amount, owner);
            match self.executor.submit_and_confirm(&builder).await {
                Ok(outcome) => {
                    info!("Swapped {} of {} to SOL: {}", holding.amount, holding.mint, outcome.signature);
                    report.swapped.push(holding.mint.to_string());
                }
                Err(e) => {
                    warn!("Swap of {} to SOL failed, skipping: {}", holding.mint, e);
                    report.swap_failures.push(format!("{}: {}", holding.mint, e));
                }
            }
        }
    }

    async fn rebalance(&self, plan: &MigrationPlan, owner: &Pubkey, report: &mut MigrationReport) -> Result<(), AgentError> {
        let native = self.native_balance(owner).await?;
        let available = native.saturating_sub(self.settings.min_native_reserve);
        let amount = available / 2;
        if amount == 0 {
            return Err(AgentError::InsufficientBalance(format!(
                "{} lamports held, {} reserved",
                native, self.settings.min_native_reserve
            )));
        }

        info!("Rebalancing: swapping {} of {} available lamports to {}", amount, available, plan.other_token_mint);
        let builder = self.swap(plan.base_mint, plan.other_token_mint, amount, owner);
        let outcome = self.executor.submit_and_confirm(&builder).await?;
        report.rebalance_signature = Some(outcome.signature.to_string());
        Ok(())
    }

    async fn deposit(&self, plan: &MigrationPlan, owner: &Pubkey, report: &mut MigrationReport) -> Result<(), AgentError> {
        let pool = self.pool(&plan.candidate.pool_id).await?;

        let inputs = self.deposit_inputs(&pool, plan, owner).await?;
        let amounts = compute_deposit(&inputs)?;
        report.deposit_attempts = 1;

        let first = self
            .submit_deposit(&pool, owner, &amounts, self.settings.deposit_slippage_bps, &inputs)
            .await;
        let outcome = match first {
            Err(e) if e.is_slippage() => {
                warn!("Deposit into {} exceeded slippage, retrying with SOL side fixed", pool.id);
                self.pause().await;

                let inputs = self.deposit_inputs(&pool, plan, owner).await?;
                let amounts = compute_native_fixed_deposit(&inputs)?;
                report.deposit_attempts = 2;
                self.submit_deposit(&pool, owner, &amounts, self.settings.deposit_retry_slippage_bps, &inputs)
                    .await?
            }
            other => other?,
        };

        if !outcome.is_confirmed() {
            warn!("Deposit {} was sent but not confirmed; verify the position on chain", outcome.signature);
        }
        report.deposit_signature = Some(outcome.signature.to_string());
        report.deposit_confirmation = Some(outcome.confirmation);

        match self.inventory.lp_balance(owner, &pool.lp_mint).await {
            Ok(balance) => info!("Now holding {} LP in {}", balance, pool.id),
            Err(e) => warn!("Could not read LP balance after deposit: {}", e),
        }
        Ok(())
    }

    async fn deposit_inputs(&self, pool: &AmmPool, plan: &MigrationPlan, owner: &Pubkey) -> Result<DepositInputs, AgentError> {
        let native_side = pool
            .side_of(&self.native_mint)
            .ok_or_else(|| AgentError::Registry(format!("pool {} has no SOL side", pool.id)))?;
        let other_balance = retry_transient(&self.settings.read_retry, "token balance", || {
            self.rpc.token_balance(owner, &plan.other_token_mint)
        })
        .await?
        .map(|h| h.amount)
        .unwrap_or(0);
        let native_balance = self.native_balance(owner).await?;
        let reserves = retry_transient(&self.settings.read_retry, "pool reserves", || self.venue.reserves(pool)).await?;

        debug!(
            "Deposit inputs for {}: token {} native {} reserves {}/{}",
            pool.id, other_balance, native_balance, reserves.base_reserve, reserves.quote_reserve
        );
        Ok(DepositInputs {
            reserves,
            native_side,
            other_balance,
            native_balance,
            min_native_reserve: self.settings.min_native_reserve,
        })
    }

    async fn submit_deposit(
        &self,
        pool: &AmmPool,
        owner: &Pubkey,
        amounts: &LiquidityAmounts,
        slippage_bps: u16,
        inputs: &DepositInputs,
    ) -> Result<TxOutcome, AgentError> {
        info!(
            "Depositing into {}: {:?} side fixed at {}, other side up to {} ({} bps)",
            pool.id,
            amounts.fixed_side,
            amounts.fixed_amount(),
            amounts.counter_amount(),
            slippage_bps
        );
        let native_budget = inputs.native_balance.saturating_sub(inputs.min_native_reserve);
        let instructions = retry_transient(&self.settings.read_retry, "deposit instructions", || {
            self.venue
                .deposit_instructions(pool, owner, amounts, slippage_bps, native_budget)
        })
        .await?;
        let transaction = InstructionTransaction {
            label: format!("deposit {}", pool.id),
            payer: *owner,
            instructions,
        };
        self.executor.submit_and_confirm(&transaction).await
    }

    async fn pool(&self, pool_id: &str) -> Result<AmmPool, AgentError> {
        retry_transient(&self.settings.read_retry, "pool lookup", || self.venue.pool_by_id(pool_id))
            .await?
            .ok_or_else(|| AgentError::Registry(format!("pool {} not found", pool_id)))
    }

    async fn native_balance(&self, owner: &Pubkey) -> Result<u64, AgentError> {
        retry_transient(&self.settings.read_retry, "native balance", || self.rpc.native_balance(owner)).await
    }

    fn swap(&self, input_mint: Pubkey, output_mint: Pubkey, amount: u64, owner: &Pubkey) -> SwapTransactionBuilder {
        SwapTransactionBuilder {
            aggregator: self.swapper.clone(),
            input_mint,
            output_mint,
            amount,
            slippage_bps: self.settings.swap_slippage_bps,
            user: *owner,
        }
    }

    fn step_delay(&self) -> Duration {
        let min = self.settings.step_delay_min.as_millis() as u64;
        let max = (self.settings.step_delay_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    async fn pause(&self) {
        let delay = self.step_delay();
        debug!("Pausing {:?} before next step", delay);
        tokio::time::sleep(delay).await;
    }
}
