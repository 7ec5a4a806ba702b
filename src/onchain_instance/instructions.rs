//! Raydium AMM v4 liquidity instructions and the WSOL plumbing around them.
//!
//! Layouts follow the on-chain program: a one-byte tag followed by
//! little-endian `u64` arguments.

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};

use crate::agent::calculator::slippage_ceiling;
use crate::agent::types::{AgentError, FixedSide, LiquidityAmounts};

pub const AMM_V4_PROGRAM_ID: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");

/// System program `Transfer`: `u32` variant index then the `u64` amount.
const SYSTEM_TRANSFER_TAG: u32 = 2;

const DEPOSIT_TAG: u8 = 3;
const WITHDRAW_TAG: u8 = 4;

/// Every account an AMM v4 deposit or withdraw touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmPoolKeys {
    pub program_id: Pubkey,
    pub amm_id: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub lp_mint: Pubkey,
    pub coin_mint: Pubkey,
    pub pc_mint: Pubkey,
    pub coin_vault: Pubkey,
    pub pc_vault: Pubkey,
    pub market_program_id: Pubkey,
    pub market_id: Pubkey,
    pub market_authority: Pubkey,
    pub market_coin_vault: Pubkey,
    pub market_pc_vault: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
}

pub fn deposit_data(max_coin_amount: u64, max_pc_amount: u64, base_side: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(25);
    data.push(DEPOSIT_TAG);
    data.extend_from_slice(&max_coin_amount.to_le_bytes());
    data.extend_from_slice(&max_pc_amount.to_le_bytes());
    data.extend_from_slice(&base_side.to_le_bytes());
    data
}

pub fn withdraw_data(amount: u64, min_coin_amount: u64, min_pc_amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(25);
    data.push(WITHDRAW_TAG);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&min_coin_amount.to_le_bytes());
    data.extend_from_slice(&min_pc_amount.to_le_bytes());
    data
}

pub fn deposit(
    keys: &AmmPoolKeys,
    owner: &Pubkey,
    max_coin_amount: u64,
    max_pc_amount: u64,
    fixed_side: FixedSide,
) -> Instruction {
    let base_side = match fixed_side {
        FixedSide::Base => 0,
        FixedSide::Quote => 1,
    };
    let accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(keys.amm_id, false),
        AccountMeta::new_readonly(keys.authority, false),
        AccountMeta::new_readonly(keys.open_orders, false),
        AccountMeta::new(keys.target_orders, false),
        AccountMeta::new(keys.lp_mint, false),
        AccountMeta::new(keys.coin_vault, false),
        AccountMeta::new(keys.pc_vault, false),
        AccountMeta::new_readonly(keys.market_id, false),
        AccountMeta::new(get_associated_token_address(owner, &keys.coin_mint), false),
        AccountMeta::new(get_associated_token_address(owner, &keys.pc_mint), false),
        AccountMeta::new(get_associated_token_address(owner, &keys.lp_mint), false),
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new_readonly(keys.market_event_queue, false),
    ];
    Instruction {
        program_id: keys.program_id,
        accounts,
        data: deposit_data(max_coin_amount, max_pc_amount, base_side),
    }
}

pub fn withdraw(
    keys: &AmmPoolKeys,
    owner: &Pubkey,
    lp_amount: u64,
    min_coin_amount: u64,
    min_pc_amount: u64,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(keys.amm_id, false),
        AccountMeta::new_readonly(keys.authority, false),
        AccountMeta::new(keys.open_orders, false),
        AccountMeta::new(keys.target_orders, false),
        AccountMeta::new(keys.lp_mint, false),
        AccountMeta::new(keys.coin_vault, false),
        AccountMeta::new(keys.pc_vault, false),
        AccountMeta::new_readonly(keys.market_program_id, false),
        AccountMeta::new(keys.market_id, false),
        AccountMeta::new(keys.market_coin_vault, false),
        AccountMeta::new(keys.market_pc_vault, false),
        AccountMeta::new_readonly(keys.market_authority, false),
        AccountMeta::new(get_associated_token_address(owner, &keys.lp_mint), false),
        AccountMeta::new(get_associated_token_address(owner, &keys.coin_mint), false),
        AccountMeta::new(get_associated_token_address(owner, &keys.pc_mint), false),
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(keys.market_event_queue, false),
        AccountMeta::new(keys.market_bids, false),
        AccountMeta::new(keys.market_asks, false),
    ];
    Instruction {
        program_id: keys.program_id,
        accounts,
        data: withdraw_data(lp_amount, min_coin_amount, min_pc_amount),
    }
}

pub fn transfer_lamports(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

fn create_ata(owner: &Pubkey, mint: &Pubkey) -> Instruction {
    create_associated_token_account_idempotent(owner, owner, mint, &spl_token::id())
}

/// Moves `lamports` into the owner's WSOL account and syncs its token balance.
pub fn wrap_sol(owner: &Pubkey, lamports: u64) -> Result<Vec<Instruction>, AgentError> {
    let native_mint = spl_token::native_mint::id();
    let wsol_account = get_associated_token_address(owner, &native_mint);
    let sync = spl_token::instruction::sync_native(&spl_token::id(), &wsol_account)
        .map_err(|e| AgentError::Instruction(format!("sync_native: {}", e)))?;

    Ok(vec![
        create_ata(owner, &native_mint),
        transfer_lamports(owner, &wsol_account, lamports),
        sync,
    ])
}

/// Closes the owner's WSOL account, returning wrapped SOL as lamports.
pub fn unwrap_sol(owner: &Pubkey) -> Result<Instruction, AgentError> {
    let wsol_account = get_associated_token_address(owner, &spl_token::native_mint::id());
    spl_token::instruction::close_account(&spl_token::id(), &wsol_account, owner, owner, &[])
        .map_err(|e| AgentError::Instruction(format!("close_account: {}", e)))
}

fn priority(compute_unit_price: u64) -> Option<Instruction> {
    (compute_unit_price > 0).then(|| ComputeBudgetInstruction::set_compute_unit_price(compute_unit_price))
}

/// Full withdraw transaction body: ensure both token accounts exist, burn the
/// LP tokens, then unwrap any WSOL that came out.
pub fn build_withdraw(
    keys: &AmmPoolKeys,
    owner: &Pubkey,
    lp_amount: u64,
    min_coin_amount: u64,
    min_pc_amount: u64,
    compute_unit_price: u64,
) -> Result<Vec<Instruction>, AgentError> {
    let native_mint = spl_token::native_mint::id();
    let mut instructions: Vec<Instruction> = priority(compute_unit_price).into_iter().collect();

    instructions.push(create_ata(owner, &keys.coin_mint));
    instructions.push(create_ata(owner, &keys.pc_mint));
    instructions.push(withdraw(keys, owner, lp_amount, min_coin_amount, min_pc_amount));
    if keys.coin_mint == native_mint || keys.pc_mint == native_mint {
        instructions.push(unwrap_sol(owner)?);
    }
    Ok(instructions)
}

/// Full deposit transaction body. The non-fixed side is raised by
/// `slippage_bps`; the native side is wrapped up to `native_budget` lamports
/// and never allowed above what was wrapped.
pub fn build_deposit(
    keys: &AmmPoolKeys,
    owner: &Pubkey,
    amounts: &LiquidityAmounts,
    slippage_bps: u16,
    native_budget: u64,
    compute_unit_price: u64,
) -> Result<Vec<Instruction>, AgentError> {
    let native_mint = spl_token::native_mint::id();
    let (mut max_coin, mut max_pc) = match amounts.fixed_side {
        FixedSide::Base => (amounts.base_amount, slippage_ceiling(amounts.quote_amount, slippage_bps)),
        FixedSide::Quote => (slippage_ceiling(amounts.base_amount, slippage_bps), amounts.quote_amount),
    };

    let wrapped = if keys.coin_mint == native_mint {
        max_coin = max_coin.min(native_budget);
        Some(max_coin)
    } else if keys.pc_mint == native_mint {
        max_pc = max_pc.min(native_budget);
        Some(max_pc)
    } else {
        None
    };

    let mut instructions: Vec<Instruction> = priority(compute_unit_price).into_iter().collect();
    if let Some(lamports) = wrapped {
        instructions.extend(wrap_sol(owner, lamports)?);
    }
    for mint in [keys.coin_mint, keys.pc_mint, keys.lp_mint] {
        if mint != native_mint {
            instructions.push(create_ata(owner, &mint));
        }
    }
    instructions.push(deposit(keys, owner, max_coin, max_pc, amounts.fixed_side));
    if wrapped.is_some() {
        instructions.push(unwrap_sol(owner)?);
    }
    Ok(instructions)
}

#[cfg(test)]
pub(crate) fn sample_keys(coin_mint: Pubkey, pc_mint: Pubkey) -> AmmPoolKeys {
    AmmPoolKeys {
        program_id: AMM_V4_PROGRAM_ID,
        amm_id: Pubkey::new_unique(),
        authority: Pubkey::new_unique(),
        open_orders: Pubkey::new_unique(),
        target_orders: Pubkey::new_unique(),
        lp_mint: Pubkey::new_unique(),
        coin_mint,
        pc_mint,
        coin_vault: Pubkey::new_unique(),
        pc_vault: Pubkey::new_unique(),
        market_program_id: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        market_authority: Pubkey::new_unique(),
        market_coin_vault: Pubkey::new_unique(),
        market_pc_vault: Pubkey::new_unique(),
        market_bids: Pubkey::new_unique(),
        market_asks: Pubkey::new_unique(),
        market_event_queue: Pubkey::new_unique(),
    }
}
