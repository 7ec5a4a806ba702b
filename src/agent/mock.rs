//! In-memory stand-ins for the chain, the AMM venue, the swap aggregator and
//! the yield feed, used by the engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;

use crate::agent::types::{AgentError, LiquidityAmounts, PoolReserves};
use crate::onchain_instance::instance::{AmmPool, AmmVenue, TokenInfo};
use crate::services::chain_rpc::{ChainRpc, SignatureState, TokenHolding};
use crate::services::swap_engine::{JupiterQuote, SwapAggregator};
use crate::services::yield_feed::{YieldPool, YieldSource};

pub const MOCK_WITHDRAW_PROGRAM: Pubkey = Pubkey::new_from_array([1; 32]);
pub const MOCK_DEPOSIT_PROGRAM: Pubkey = Pubkey::new_from_array([2; 32]);
pub const MOCK_SWAP_PROGRAM: Pubkey = Pubkey::new_from_array([3; 32]);

pub fn native_mint() -> Pubkey {
    spl_token::native_mint::id()
}

pub fn mock_instruction(program: Pubkey, signer: &Pubkey) -> Instruction {
    Instruction::new_with_bytes(program, &[0], vec![AccountMeta::new(*signer, true)])
}

/// A swap the chain settles when it accepts the transaction: input mint,
/// output mint, then the amount filled 1:1.
fn swap_instruction(input: &Pubkey, output: &Pubkey, amount: u64, signer: &Pubkey) -> Instruction {
    let mut data = Vec::with_capacity(72);
    data.extend_from_slice(input.as_ref());
    data.extend_from_slice(output.as_ref());
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction::new_with_bytes(MOCK_SWAP_PROGRAM, &data, vec![AccountMeta::new(*signer, true)])
}

fn decode_swap(data: &[u8]) -> Option<(Pubkey, Pubkey, u64)> {
    let input = Pubkey::try_from(data.get(..32)?).ok()?;
    let output = Pubkey::try_from(data.get(32..64)?).ok()?;
    let amount = u64::from_le_bytes(data.get(64..72)?.try_into().ok()?);
    Some((input, output, amount))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    Accept,
    RateLimited,
    BlockhashExpired,
    Slippage,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum StatusBehavior {
    #[default]
    Confirmed,
    PendingFor(u32),
    NeverConfirmed,
    FailOnChain,
}

#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub signature: Signature,
    pub blockhash: Hash,
    pub programs: Vec<Pubkey>,
}

#[derive(Default)]
struct Ledger {
    native: u64,
    tokens: HashMap<Pubkey, (u64, u8)>,
    accounts: HashMap<Pubkey, u64>,
    supplies: HashMap<Pubkey, u64>,
    send_script: VecDeque<SendBehavior>,
    program_scripts: HashMap<Pubkey, VecDeque<SendBehavior>>,
    status: StatusBehavior,
    polls: u32,
    blockhash_requests: u64,
    sent: Vec<SentTransaction>,
}

/// A single-wallet ledger. Balances only change through the setters and
/// through accepted swap transactions; every other submitted transaction is
/// recorded, not executed.
#[derive(Default)]
pub struct MockChain {
    ledger: Mutex<Ledger>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native(self, lamports: u64) -> Self {
        self.ledger.lock().native = lamports;
        self
    }

    pub fn with_token(self, mint: Pubkey, amount: u64, decimals: u8) -> Self {
        self.ledger.lock().tokens.insert(mint, (amount, decimals));
        self
    }

    pub fn with_account(self, account: Pubkey, amount: u64) -> Self {
        self.ledger.lock().accounts.insert(account, amount);
        self
    }

    pub fn with_supply(self, mint: Pubkey, supply: u64) -> Self {
        self.ledger.lock().supplies.insert(mint, supply);
        self
    }

    pub fn with_send_script(self, script: Vec<SendBehavior>) -> Self {
        self.ledger.lock().send_script = script.into();
        self
    }

    /// Outcomes for transactions that invoke `program`, consumed in order.
    pub fn with_program_script(self, program: Pubkey, script: Vec<SendBehavior>) -> Self {
        self.ledger.lock().program_scripts.insert(program, script.into());
        self
    }

    pub fn with_status(self, status: StatusBehavior) -> Self {
        self.ledger.lock().status = status;
        self
    }

    pub fn native(&self) -> u64 {
        self.ledger.lock().native
    }

    pub fn token(&self, mint: &Pubkey) -> u64 {
        self.ledger.lock().tokens.get(mint).map(|(amount, _)| *amount).unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.ledger.lock().sent.clone()
    }

    pub fn sent_to(&self, program: &Pubkey) -> usize {
        self.ledger
            .lock()
            .sent
            .iter()
            .filter(|tx| tx.programs.contains(program))
            .count()
    }

    pub fn polls(&self) -> u32 {
        self.ledger.lock().polls
    }

    pub fn blockhash_requests(&self) -> u64 {
        self.ledger.lock().blockhash_requests
    }

    fn apply_swap(ledger: &mut Ledger, input: &Pubkey, output: &Pubkey, amount: u64) {
        if *input == native_mint() {
            ledger.native = ledger.native.saturating_sub(amount);
        } else if let Some((held, _)) = ledger.tokens.get_mut(input) {
            *held = held.saturating_sub(amount);
        }
        if *output == native_mint() {
            ledger.native += amount;
        } else {
            ledger.tokens.entry(*output).or_insert((0, 6)).0 += amount;
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn native_balance(&self, _owner: &Pubkey) -> Result<u64, AgentError> {
        Ok(self.native())
    }

    async fn token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, AgentError> {
        let ledger = self.ledger.lock();
        let mut holdings: Vec<TokenHolding> = ledger
            .tokens
            .iter()
            .map(|(mint, (amount, decimals))| TokenHolding {
                account: get_associated_token_address(owner, mint),
                mint: *mint,
                amount: *amount,
                decimals: Some(*decimals),
            })
            .collect();
        holdings.sort_by_key(|h| h.mint);
        Ok(holdings)
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<TokenHolding>, AgentError> {
        let ledger = self.ledger.lock();
        Ok(ledger.tokens.get(mint).map(|(amount, decimals)| TokenHolding {
            account: get_associated_token_address(owner, mint),
            mint: *mint,
            amount: *amount,
            decimals: Some(*decimals),
        }))
    }

    async fn token_account_amount(&self, account: &Pubkey) -> Result<u64, AgentError> {
        self.ledger
            .lock()
            .accounts
            .get(account)
            .copied()
            .ok_or_else(|| AgentError::Rpc(format!("could not find account {}", account)))
    }

    async fn mint_supply(&self, mint: &Pubkey) -> Result<u64, AgentError> {
        Ok(self.ledger.lock().supplies.get(mint).copied().unwrap_or(0))
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), AgentError> {
        let mut ledger = self.ledger.lock();
        ledger.blockhash_requests += 1;
        Ok((Hash::new_unique(), 1_000 + ledger.blockhash_requests))
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, AgentError> {
        let keys = transaction.message.static_account_keys();
        let programs: Vec<Pubkey> = transaction
            .message
            .instructions()
            .iter()
            .map(|ix| keys[ix.program_id_index as usize])
            .collect();
        let swaps: Vec<(Pubkey, Pubkey, u64)> = transaction
            .message
            .instructions()
            .iter()
            .filter(|ix| keys[ix.program_id_index as usize] == MOCK_SWAP_PROGRAM)
            .filter_map(|ix| decode_swap(&ix.data))
            .collect();
        let signature = transaction.signatures[0];

        let mut ledger = self.ledger.lock();
        let scripted = programs
            .iter()
            .find_map(|program| ledger.program_scripts.get_mut(program).and_then(|s| s.pop_front()));
        let behavior = scripted
            .or_else(|| ledger.send_script.pop_front())
            .unwrap_or(SendBehavior::Accept);

        ledger.sent.push(SentTransaction {
            signature,
            blockhash: *transaction.message.recent_blockhash(),
            programs,
        });

        match behavior {
            SendBehavior::Accept => {
                for (input, output, amount) in &swaps {
                    Self::apply_swap(&mut ledger, input, output, *amount);
                }
                Ok(signature)
            }
            SendBehavior::RateLimited => Err(AgentError::RateLimited("429 Too Many Requests".to_string())),
            SendBehavior::BlockhashExpired => Err(AgentError::BlockhashExpired("Blockhash not found".to_string())),
            SendBehavior::Slippage => Err(AgentError::SlippageExceeded(
                "custom program error: 0x1e".to_string(),
            )),
        }
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<SignatureState, AgentError> {
        let mut ledger = self.ledger.lock();
        ledger.polls += 1;
        Ok(match ledger.status {
            StatusBehavior::Confirmed => SignatureState::Confirmed,
            StatusBehavior::PendingFor(n) if ledger.polls <= n => SignatureState::Pending,
            StatusBehavior::PendingFor(_) => SignatureState::Confirmed,
            StatusBehavior::NeverConfirmed => SignatureState::Pending,
            StatusBehavior::FailOnChain => {
                SignatureState::Failed(AgentError::TransactionFailed("InsufficientFundsForRent".to_string()))
            }
        })
    }
}

pub fn mock_pool(id: &str, mint_a: Pubkey, mint_b: Pubkey) -> AmmPool {
    let symbol = |mint: &Pubkey| if *mint == native_mint() { "WSOL".to_string() } else { "XYZ".to_string() };
    AmmPool {
        id: id.to_string(),
        program_id: MOCK_DEPOSIT_PROGRAM,
        mint_a: TokenInfo {
            mint: mint_a,
            symbol: symbol(&mint_a),
            decimals: 6,
        },
        mint_b: TokenInfo {
            mint: mint_b,
            symbol: symbol(&mint_b),
            decimals: 9,
        },
        lp_mint: Pubkey::new_unique(),
        lp_decimals: 6,
    }
}

#[derive(Default)]
pub struct MockVenue {
    pools: Vec<AmmPool>,
    reserves: HashMap<String, PoolReserves>,
    failing_withdrawals: HashSet<String>,
    rate_limited_lp_mints: HashSet<Pubkey>,
    rate_limits: Mutex<HashMap<&'static str, u32>>,
    symbols: HashMap<String, Pubkey>,
    withdrawals: Mutex<Vec<(String, u64)>>,
    deposits: Mutex<Vec<(LiquidityAmounts, u16)>>,
    cache_clears: AtomicU32,
}

impl MockVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: AmmPool, reserves: PoolReserves) -> Self {
        self.reserves.insert(pool.id.clone(), reserves);
        self.pools.push(pool);
        self
    }

    pub fn with_symbol(mut self, symbol: &str, mint: Pubkey) -> Self {
        self.symbols.insert(symbol.to_uppercase(), mint);
        self
    }

    pub fn failing_withdrawal(mut self, pool_id: &str) -> Self {
        self.failing_withdrawals.insert(pool_id.to_string());
        self
    }

    /// The next `times` calls to `method` answer with HTTP 429.
    pub fn rate_limited(self, method: &'static str, times: u32) -> Self {
        self.rate_limits.lock().insert(method, times);
        self
    }

    /// LP lookups for `lp_mint` are rate limited on every call.
    pub fn rate_limited_lp_mint(mut self, lp_mint: Pubkey) -> Self {
        self.rate_limited_lp_mints.insert(lp_mint);
        self
    }

    fn throttle(&self, method: &'static str) -> Result<(), AgentError> {
        let mut limits = self.rate_limits.lock();
        match limits.get_mut(method) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AgentError::RateLimited(format!("{} returned 429", method)))
            }
            _ => Ok(()),
        }
    }

    pub fn withdrawals(&self) -> Vec<(String, u64)> {
        self.withdrawals.lock().clone()
    }

    pub fn deposits(&self) -> Vec<(LiquidityAmounts, u16)> {
        self.deposits.lock().clone()
    }

    pub fn cache_clears(&self) -> u32 {
        self.cache_clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AmmVenue for MockVenue {
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<AmmPool>, AgentError> {
        self.throttle("pool_by_id")?;
        Ok(self.pools.iter().find(|p| p.id == pool_id).cloned())
    }

    async fn pool_by_mints(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> Result<Option<AmmPool>, AgentError> {
        self.throttle("pool_by_mints")?;
        Ok(self
            .pools
            .iter()
            .find(|p| p.contains_mint(mint_a) && p.contains_mint(mint_b))
            .cloned())
    }

    async fn pool_by_lp_mint(&self, lp_mint: &Pubkey) -> Result<Option<AmmPool>, AgentError> {
        if self.rate_limited_lp_mints.contains(lp_mint) {
            return Err(AgentError::RateLimited(format!("LP lookup for {} returned 429", lp_mint)));
        }
        self.throttle("pool_by_lp_mint")?;
        Ok(self.pools.iter().find(|p| p.lp_mint == *lp_mint).cloned())
    }

    async fn mint_for_symbol(&self, symbol: &str) -> Result<Option<Pubkey>, AgentError> {
        let symbol = symbol.to_uppercase();
        if symbol == "SOL" || symbol == "WSOL" {
            return Ok(Some(native_mint()));
        }
        Ok(self.symbols.get(&symbol).copied())
    }

    async fn reserves(&self, pool: &AmmPool) -> Result<PoolReserves, AgentError> {
        self.throttle("reserves")?;
        self.reserves
            .get(&pool.id)
            .copied()
            .ok_or_else(|| AgentError::Registry(format!("no reserves for {}", pool.id)))
    }

    async fn withdraw_instructions(
        &self,
        pool: &AmmPool,
        owner: &Pubkey,
        lp_amount: u64,
        _slippage_bps: u16,
    ) -> Result<Vec<Instruction>, AgentError> {
        if self.failing_withdrawals.contains(&pool.id) {
            return Err(AgentError::Registry(format!("pool {} keys unavailable", pool.id)));
        }
        self.withdrawals.lock().push((pool.id.clone(), lp_amount));
        Ok(vec![mock_instruction(MOCK_WITHDRAW_PROGRAM, owner)])
    }

    async fn deposit_instructions(
        &self,
        _pool: &AmmPool,
        owner: &Pubkey,
        amounts: &LiquidityAmounts,
        slippage_bps: u16,
        _native_budget: u64,
    ) -> Result<Vec<Instruction>, AgentError> {
        self.deposits.lock().push((*amounts, slippage_bps));
        Ok(vec![mock_instruction(MOCK_DEPOSIT_PROGRAM, owner)])
    }

    fn clear_cache(&self) {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fills every quote 1:1. Balances move on the [`MockChain`] that accepts
/// the swap transaction, not when the transaction is built.
#[derive(Default)]
pub struct MockSwapper {
    failing_inputs: HashSet<Pubkey>,
    swaps: Mutex<Vec<(Pubkey, Pubkey, u64)>>,
}

impl MockSwapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_input(mut self, mint: Pubkey) -> Self {
        self.failing_inputs.insert(mint);
        self
    }

    pub fn swaps(&self) -> Vec<(Pubkey, Pubkey, u64)> {
        self.swaps.lock().clone()
    }
}

fn parse_mint(value: &str) -> Result<Pubkey, AgentError> {
    Pubkey::from_str(value).map_err(|e| AgentError::JupiterApi(e.to_string()))
}

#[async_trait]
impl SwapAggregator for MockSwapper {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<JupiterQuote, AgentError> {
        if self.failing_inputs.contains(input_mint) {
            return Err(AgentError::JupiterApi("no route found".to_string()));
        }
        Ok(JupiterQuote {
            input_mint: input_mint.to_string(),
            in_amount: amount.to_string(),
            output_mint: output_mint.to_string(),
            out_amount: amount.to_string(),
            other_amount_threshold: None,
            slippage_bps: Some(slippage_bps),
            price_impact_pct: None,
            rest: Default::default(),
        })
    }

    async fn swap_transaction(&self, quote: &JupiterQuote, user: &Pubkey) -> Result<VersionedTransaction, AgentError> {
        let input = parse_mint(&quote.input_mint)?;
        let output = parse_mint(&quote.output_mint)?;
        let amount: u64 = quote
            .in_amount
            .parse()
            .map_err(|_| AgentError::JupiterApi("bad amount".to_string()))?;

        self.swaps.lock().push((input, output, amount));

        let message = Message::new_with_blockhash(
            &[swap_instruction(&input, &output, amount, user)],
            Some(user),
            &Hash::default(),
        );
        Ok(VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        })
    }
}

#[derive(Default)]
pub struct MockYieldSource {
    pools: Vec<YieldPool>,
    fail: bool,
    calls: AtomicU32,
}

impl MockYieldSource {
    pub fn new(pools: Vec<YieldPool>) -> Self {
        Self {
            pools,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl YieldSource for MockYieldSource {
    async fn fetch_pools(&self) -> Result<Vec<YieldPool>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AgentError::YieldApi("pools request failed with status 503".to_string()));
        }
        Ok(self.pools.clone())
    }
}

pub fn yield_pool(symbol: &str, apy: f64, tvl_usd: f64, volume_usd_7d: f64) -> YieldPool {
    YieldPool {
        pool: Some(format!("llama-{}", symbol.to_lowercase())),
        project: Some("raydium-amm".to_string()),
        chain: Some("Solana".to_string()),
        symbol: Some(symbol.to_string()),
        apy: Some(apy),
        tvl_usd: Some(tvl_usd),
        volume_usd_7d: Some(volume_usd_7d),
        underlying_tokens: None,
    }
}
