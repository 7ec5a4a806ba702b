//! # Transaction Executor
//!
//! Signs, submits and confirms one transaction at a time.
//!
//! Submission and confirmation share the bounded retry loop in
//! [`crate::agent::retry`]:
//! - rate limits and transport failures resubmit the *same* signed
//!   transaction after a fixed pause
//! - an expired blockhash throws the signed transaction away; the next
//!   attempt fetches a new blockhash, rebuilds and re-signs
//! - confirmation is polled; running out of polls yields
//!   [`Confirmation::Indeterminate`] rather than an error

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::agent::retry::{RetryClass, RetryError, RetryPolicy, retry_bounded};
use crate::agent::types::{AgentError, Confirmation, TransactionAttempt, TxOutcome};
use crate::services::chain_rpc::{ChainRpc, SignatureState};

/// Produces the message for one submission attempt, bound to `blockhash`.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    async fn build_message(&self, blockhash: Hash) -> Result<VersionedMessage, AgentError>;
}

/// A fixed instruction list paid for by `payer`.
pub struct InstructionTransaction {
    pub label: String,
    pub payer: Pubkey,
    pub instructions: Vec<Instruction>,
}

#[async_trait]
impl TransactionBuilder for InstructionTransaction {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn build_message(&self, blockhash: Hash) -> Result<VersionedMessage, AgentError> {
        Ok(VersionedMessage::Legacy(Message::new_with_blockhash(
            &self.instructions,
            Some(&self.payer),
            &blockhash,
        )))
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_submit_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub confirm_poll_attempts: u32,
    pub confirm_poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_submit_attempts: 3,
            rate_limit_backoff: Duration::from_secs(10),
            confirm_poll_attempts: 30,
            confirm_poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum PollError {
    Pending,
    Rpc(AgentError),
    Failed(AgentError),
}

fn classify_submission(error: &AgentError) -> RetryClass {
    if error.is_blockhash_expired() {
        RetryClass::Immediate
    } else if error.is_transient() {
        RetryClass::Backoff
    } else {
        RetryClass::Stop
    }
}

pub struct TransactionExecutor {
    rpc: Arc<dyn ChainRpc>,
    wallet: Arc<Keypair>,
    settings: ExecutorSettings,
}

impl TransactionExecutor {
    pub fn new(rpc: Arc<dyn ChainRpc>, wallet: Arc<Keypair>, settings: ExecutorSettings) -> Self {
        Self { rpc, wallet, settings }
    }

    pub fn wallet_pubkey(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    pub async fn submit_and_confirm(&self, builder: &dyn TransactionBuilder) -> Result<TxOutcome, AgentError> {
        let label = builder.describe();
        let attempt = self.submit(builder, &label).await?;
        let confirmation = self.confirm(&attempt.signature, &label).await?;

        Ok(TxOutcome {
            signature: attempt.signature,
            attempt,
            confirmation,
        })
    }

    async fn sign(
        &self,
        builder: &dyn TransactionBuilder,
        attempt_number: u32,
    ) -> Result<(VersionedTransaction, TransactionAttempt), AgentError> {
        let (blockhash, last_valid_block_height) = self.rpc.latest_blockhash().await?;
        let message = builder.build_message(blockhash).await?;
        let transaction = VersionedTransaction::try_new(message, &[self.wallet.as_ref()])
            .map_err(|e| AgentError::Signing(e.to_string()))?;
        let signature = transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| AgentError::Signing("transaction carries no signature".to_string()))?;

        Ok((
            transaction,
            TransactionAttempt {
                signature,
                blockhash,
                last_valid_block_height,
                attempt_number,
            },
        ))
    }

    async fn submit(&self, builder: &dyn TransactionBuilder, label: &str) -> Result<TransactionAttempt, AgentError> {
        let policy = RetryPolicy::fixed(self.settings.max_submit_attempts, self.settings.rate_limit_backoff);
        let signed: Mutex<Option<(VersionedTransaction, TransactionAttempt)>> = Mutex::new(None);

        let result = retry_bounded(&policy, classify_submission, |attempt_number| {
            let signed = &signed;
            async move {
                let mut slot = signed.lock().await;
                let (transaction, mut attempt) = match slot.take() {
                    Some(prepared) => prepared,
                    None => self.sign(builder, attempt_number).await?,
                };
                attempt.attempt_number = attempt_number;

                match self.rpc.send_transaction(&transaction).await {
                    Ok(signature) => {
                        debug!(
                            "{}: submitted {} on attempt {} (valid until height {})",
                            label, signature, attempt_number, attempt.last_valid_block_height
                        );
                        Ok(attempt)
                    }
                    Err(e) => {
                        if e.is_blockhash_expired() {
                            warn!("{}: blockhash {} expired, re-signing", label, attempt.blockhash);
                        } else {
                            warn!("{}: submission attempt {} failed: {}", label, attempt_number, e);
                            *slot = Some((transaction, attempt));
                        }
                        Err(e)
                    }
                }
            }
        })
        .await;

        result.map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => {
                error!("{}: giving up after {} submission attempts", label, attempts);
                AgentError::RetriesExhausted {
                    attempts,
                    last: last.to_string(),
                }
            }
            RetryError::Permanent { error, .. } => error,
        })
    }

    async fn confirm(&self, signature: &Signature, label: &str) -> Result<Confirmation, AgentError> {
        let policy = RetryPolicy::fixed(self.settings.confirm_poll_attempts, self.settings.confirm_poll_interval);

        let result = retry_bounded(
            &policy,
            |e: &PollError| match e {
                PollError::Failed(_) => RetryClass::Stop,
                PollError::Pending => RetryClass::Backoff,
                PollError::Rpc(rpc_error) => {
                    debug!("{}: status poll failed: {}", label, rpc_error);
                    RetryClass::Backoff
                }
            },
            |_| async move {
                match self.rpc.signature_status(signature).await {
                    Ok(SignatureState::Confirmed) => Ok(()),
                    Ok(SignatureState::Pending) => Err(PollError::Pending),
                    Ok(SignatureState::Failed(e)) => Err(PollError::Failed(e)),
                    Err(e) => Err(PollError::Rpc(e)),
                }
            },
        )
        .await;

        match result {
            Ok(()) => {
                info!("{}: confirmed {}", label, signature);
                Ok(Confirmation::Confirmed)
            }
            Err(RetryError::Permanent {
                error: PollError::Failed(e),
                ..
            }) => {
                error!("{}: {} failed on chain: {}", label, signature, e);
                Err(e)
            }
            Err(e) => {
                warn!(
                    "{}: {} not confirmed after {} polls; status unknown, verify balances",
                    label,
                    signature,
                    e.attempts()
                );
                Ok(Confirmation::Indeterminate)
            }
        }
    }
}
