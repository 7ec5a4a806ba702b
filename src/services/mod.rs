//! # Services Module
//!
//! Clients for the external services the engine consumes: the Solana RPC
//! node, the Jupiter swap aggregator and the DefiLlama yield feed.

pub mod chain_rpc;
pub mod swap_engine;
pub mod yield_feed;
