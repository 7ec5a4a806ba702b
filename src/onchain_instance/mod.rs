//! # Onchain Program Instance Module
//!
//! Interaction with the Raydium AMM v4 program.
//!
//! ## Features
//! - Pool registry lookups through the Raydium API, with an LP-mint cache
//! - Reserve and LP supply reads from chain
//! - Deposit and withdraw instruction building, including WSOL wrapping

/// Raydium pool registry and the `AmmVenue` seam
pub mod instance;
/// AMM v4 instruction layouts
pub mod instructions;
