//! # Chain RPC
//!
//! The handful of Solana RPC calls the engine needs, behind a trait so the
//! migration steps can run against an in-memory ledger in tests.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
    rpc_request::TokenAccountsFilter,
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    instruction::InstructionError,
    program_pack::Pack,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::state::Account as TokenAccount;
use tracing::{debug, warn};

use crate::agent::types::{AMM_SLIPPAGE_ERROR_CODE, AgentError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolding {
    pub account: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub decimals: Option<u8>,
}

#[derive(Debug)]
pub enum SignatureState {
    Pending,
    Confirmed,
    Failed(AgentError),
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn native_balance(&self, owner: &Pubkey) -> Result<u64, AgentError>;

    /// Every SPL token account owned by `owner`, including empty ones.
    async fn token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, AgentError>;

    /// Balance of the owner's associated account for `mint`; `None` when the
    /// account does not exist.
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<TokenHolding>, AgentError>;

    async fn token_account_amount(&self, account: &Pubkey) -> Result<u64, AgentError>;

    async fn mint_supply(&self, mint: &Pubkey) -> Result<u64, AgentError>;

    /// Latest blockhash and the last block height at which it is valid.
    async fn latest_blockhash(&self) -> Result<(Hash, u64), AgentError>;

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, AgentError>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, AgentError>;
}

pub struct SolanaRpc {
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed()),
        }
    }
}

fn classify_client_error(err: ClientError) -> AgentError {
    let transport = matches!(err.kind(), ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_));
    match AgentError::from_rpc_message(err.to_string()) {
        AgentError::Rpc(message) if transport => AgentError::Transport(message),
        classified => classified,
    }
}

fn classify_transaction_error(err: &TransactionError) -> AgentError {
    match err {
        TransactionError::InstructionError(index, InstructionError::Custom(code))
            if *code == AMM_SLIPPAGE_ERROR_CODE =>
        {
            AgentError::SlippageExceeded(format!("instruction {} failed with custom error {}", index, code))
        }
        TransactionError::BlockhashNotFound => AgentError::BlockhashExpired(err.to_string()),
        other => AgentError::TransactionFailed(other.to_string()),
    }
}

fn is_missing_account(err: &ClientError) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("could not find account") || message.contains("accountnotfound")
}

fn parse_amount(raw: &str) -> Result<u64, AgentError> {
    raw.parse::<u64>()
        .map_err(|e| AgentError::Rpc(format!("invalid token amount {:?}: {}", raw, e)))
}

/// Reads `(mint, amount, decimals)` out of a `jsonParsed` SPL token account.
pub(crate) fn parse_token_account_json(data: &Value) -> Option<(Pubkey, u64, u8)> {
    let info = data.get("parsed")?.get("info")?;
    let mint = Pubkey::from_str(info.get("mint")?.as_str()?).ok()?;
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse::<u64>().ok()?;
    let decimals = token_amount.get("decimals")?.as_u64()? as u8;
    Some((mint, amount, decimals))
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn native_balance(&self, owner: &Pubkey) -> Result<u64, AgentError> {
        self.client.get_balance(owner).await.map_err(classify_client_error)
    }

    async fn token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, AgentError> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await
            .map_err(classify_client_error)?;

        let mut holdings = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            let Ok(account) = Pubkey::from_str(&keyed.pubkey) else {
                debug!("Skipping token account with invalid address {}", keyed.pubkey);
                continue;
            };

            let parsed = serde_json::to_value(&keyed.account.data)
                .ok()
                .and_then(|data| parse_token_account_json(&data));
            if let Some((mint, amount, decimals)) = parsed {
                holdings.push(TokenHolding {
                    account,
                    mint,
                    amount,
                    decimals: Some(decimals),
                });
                continue;
            }

            // Node returned raw bytes instead of jsonParsed
            let data = match self.client.get_account_data(&account).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to read token account {}: {}", account, e);
                    continue;
                }
            };
            match TokenAccount::unpack(&data) {
                Ok(state) => holdings.push(TokenHolding {
                    account,
                    mint: state.mint,
                    amount: state.amount,
                    decimals: None,
                }),
                Err(e) => debug!("Token account {} did not unpack: {}", account, e),
            }
        }

        Ok(holdings)
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<TokenHolding>, AgentError> {
        let account = get_associated_token_address(owner, mint);
        match self.client.get_token_account_balance(&account).await {
            Ok(balance) => Ok(Some(TokenHolding {
                account,
                mint: *mint,
                amount: parse_amount(&balance.amount)?,
                decimals: Some(balance.decimals),
            })),
            Err(e) if is_missing_account(&e) => Ok(None),
            Err(e) => Err(classify_client_error(e)),
        }
    }

    async fn token_account_amount(&self, account: &Pubkey) -> Result<u64, AgentError> {
        let balance = self
            .client
            .get_token_account_balance(account)
            .await
            .map_err(classify_client_error)?;
        parse_amount(&balance.amount)
    }

    async fn mint_supply(&self, mint: &Pubkey) -> Result<u64, AgentError> {
        let supply = self.client.get_token_supply(mint).await.map_err(classify_client_error)?;
        parse_amount(&supply.amount)
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), AgentError> {
        self.client
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(classify_client_error)
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, AgentError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(classify_client_error)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, AgentError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify_client_error)?;

        let Some(status) = response.value.into_iter().next().flatten() else {
            return Ok(SignatureState::Pending);
        };
        if let Some(err) = &status.err {
            return Ok(SignatureState::Failed(classify_transaction_error(err)));
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(SignatureState::Confirmed)
        } else {
            Ok(SignatureState::Pending)
        }
    }
}
