//! # Engine Types
//!
//! Value types that flow through the discovery → decision → migration pipeline
//! and the error taxonomy shared by every step.

use serde::Serialize;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature};
use thiserror::Error;

/// Raydium AMM v4 `ExceededSlippage`.
pub const AMM_SLIPPAGE_ERROR_CODE: u32 = 30;

const CUSTOM_ERROR_PREFIX: &str = "custom program error: 0x";

/// The code in a `custom program error: 0x..` log line.
fn custom_error_code(lower: &str) -> Option<u32> {
    let start = lower.find(CUSTOM_ERROR_PREFIX)? + CUSTOM_ERROR_PREFIX.len();
    let hex: String = lower[start..].chars().take_while(char::is_ascii_hexdigit).collect();
    u32::from_str_radix(&hex, 16).ok()
}

/// A `429` standing on its own after an HTTP status word, so amounts and
/// signatures that merely contain the digits do not count.
fn mentions_status_429(lower: &str) -> bool {
    let tokens: Vec<&str> = lower.split(|c: char| !c.is_ascii_alphanumeric()).filter(|t| !t.is_empty()).collect();
    tokens
        .windows(2)
        .any(|pair| pair[1] == "429" && matches!(pair[0], "http" | "status" | "code" | "error"))
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Blockhash expired: {0}")]
    BlockhashExpired(String),

    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Jupiter API error: {0}")]
    JupiterApi(String),

    #[error("Yield API error: {0}")]
    YieldApi(String),

    #[error("Pool registry error: {0}")]
    Registry(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Calculation error: {0}")]
    Calculation(#[from] CalcError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Instruction build error: {0}")]
    Instruction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Wallet mismatch: configured {expected}, keypair is {actual}")]
    WalletMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Failures worth retrying unchanged after a pause.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::RateLimited(_) | AgentError::Transport(_) => true,
            AgentError::Network(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.as_u16() == 429)
            }
            _ => false,
        }
    }

    pub fn is_blockhash_expired(&self) -> bool {
        matches!(self, AgentError::BlockhashExpired(_))
    }

    pub fn is_slippage(&self) -> bool {
        matches!(self, AgentError::SlippageExceeded(_))
    }

    /// Classifies free-form error text coming back from the RPC node or a
    /// program log. Anything unrecognised becomes a plain `Rpc` error.
    pub fn from_rpc_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if mentions_status_429(&lower) || lower.contains("too many requests") || lower.contains("rate limit") {
            AgentError::RateLimited(message)
        } else if lower.contains("blockhash not found")
            || lower.contains("blockhashnotfound")
            || lower.contains("block height exceeded")
        {
            AgentError::BlockhashExpired(message)
        } else if lower.contains("exceeds desired slippage")
            || lower.contains("exceededslippage")
            || custom_error_code(&lower) == Some(AMM_SLIPPAGE_ERROR_CODE)
            || lower.contains("custom(30)")
        {
            AgentError::SlippageExceeded(message)
        } else {
            AgentError::Rpc(message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("pool reserves must be non-zero (base {base}, quote {quote})")]
    EmptyReserves { base: u64, quote: u64 },
    #[error("no {0} balance to deposit")]
    NothingToDeposit(&'static str),
    #[error("native balance {balance} does not cover the reserve of {reserve}")]
    BelowReserve { balance: u64, reserve: u64 },
    #[error("arithmetic overflow")]
    Overflow,
}

/// An eligible pool surfaced by discovery, already cross-checked against the
/// AMM registry.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolCandidate {
    pub pool_id: String,
    pub symbol: String,
    pub apy: f64,
    pub tvl_usd: f64,
    pub volume_7d_usd: f64,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
}

impl PoolCandidate {
    pub fn contains_mint(&self, mint: &Pubkey) -> bool {
        self.mint_a == *mint || self.mint_b == *mint
    }

    /// The side of the pair that is not `native`, if the pair contains `native`.
    pub fn other_mint(&self, native: &Pubkey) -> Option<Pubkey> {
        if self.mint_a == *native {
            Some(self.mint_b)
        } else if self.mint_b == *native {
            Some(self.mint_a)
        } else {
            None
        }
    }
}

/// The wallet's stake in one pool, as read from chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub pool_id: String,
    pub lp_mint: Pubkey,
    pub raw_balance: u64,
    pub decimals: u8,
}

/// Which pool the engine believes it is in. Lives only as long as the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineState {
    pub current_pool_id: Option<String>,
    pub current_apy: f64,
}

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub candidate: PoolCandidate,
    pub positions_to_remove: Vec<Position>,
    pub other_token_mint: Pubkey,
    pub base_mint: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionAttempt {
    pub signature: Signature,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    pub attempt_number: u32,
}

/// How far confirmation polling got before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confirmation {
    Confirmed,
    /// Polling ran out without a terminal status. The transaction may still land.
    Indeterminate,
}

#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub signature: Signature,
    pub attempt: TransactionAttempt,
    pub confirmation: Confirmation,
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.confirmation == Confirmation::Confirmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixedSide {
    Base,
    Quote,
}

/// Reserves in raw units, oriented as the pool orders its mints
/// (base = `mint_a`, quote = `mint_b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    pub base_reserve: u64,
    pub quote_reserve: u64,
}

/// Deposit amounts in pool orientation. The fixed side is deposited exactly;
/// the other side is the maximum the AMM may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidityAmounts {
    pub base_amount: u64,
    pub quote_amount: u64,
    pub fixed_side: FixedSide,
}

impl LiquidityAmounts {
    pub fn fixed_amount(&self) -> u64 {
        match self.fixed_side {
            FixedSide::Base => self.base_amount,
            FixedSide::Quote => self.quote_amount,
        }
    }

    pub fn counter_amount(&self) -> u64 {
        match self.fixed_side {
            FixedSide::Base => self.quote_amount,
            FixedSide::Quote => self.base_amount,
        }
    }
}

/// What happened during one migration attempt. Signatures are kept as strings
/// so the report can be logged as JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub withdrawn: Vec<String>,
    pub withdraw_failures: Vec<String>,
    pub swapped: Vec<String>,
    pub swap_failures: Vec<String>,
    pub rebalance_signature: Option<String>,
    pub deposit_signature: Option<String>,
    pub deposit_confirmation: Option<Confirmation>,
    pub deposit_attempts: u32,
    pub failure: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub succeeded: bool,
    pub new_state: Option<EngineState>,
    pub report: MigrationReport,
}

impl MigrationOutcome {
    pub fn success(state: EngineState, report: MigrationReport) -> Self {
        Self {
            succeeded: true,
            new_state: Some(state),
            report,
        }
    }

    pub fn failed(mut report: MigrationReport, reason: impl Into<String>) -> Self {
        report.failure = Some(reason.into());
        Self {
            succeeded: false,
            new_state: None,
            report,
        }
    }
}
