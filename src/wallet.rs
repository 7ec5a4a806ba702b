//! Wallet loading. The keypair is only ever read from configuration, never
//! generated or written anywhere.

use std::str::FromStr;

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};

use crate::agent::types::AgentError;

/// Decodes a base58 secret key and checks it belongs to `expected_pubkey`.
pub fn load_keypair(private_key: &str, expected_pubkey: &str) -> Result<Keypair, AgentError> {
    let expected = Pubkey::from_str(expected_pubkey.trim())
        .map_err(|e| AgentError::Configuration(format!("Invalid SOLANA_PUBLIC_KEY: {}", e)))?;

    let keypair_bytes = bs58::decode(private_key.trim())
        .into_vec()
        .map_err(|e| AgentError::Configuration(format!("Failed to decode private key: {}", e)))?;
    let keypair = Keypair::try_from(&keypair_bytes[..])
        .map_err(|e| AgentError::Configuration(format!("Failed to create keypair from bytes: {}", e)))?;

    if keypair.pubkey() != expected {
        return Err(AgentError::WalletMismatch {
            expected: expected.to_string(),
            actual: keypair.pubkey().to_string(),
        });
    }
    Ok(keypair)
}
