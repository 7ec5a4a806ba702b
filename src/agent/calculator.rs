//! # Liquidity Amount Calculator
//!
//! Pure deposit/withdraw arithmetic in raw on-chain units. Every product is
//! taken in `u128` before dividing so amounts that must match integer token
//! balances are never rounded through floating point.

use crate::agent::types::{CalcError, FixedSide, LiquidityAmounts, PoolReserves};

/// Buffer added on top of the ratio-derived counter amount, in percent.
pub const COUNTER_BUFFER_PCT: u128 = 110;
/// Share of spendable native balance used by the native-fixed deposit, in percent.
pub const NATIVE_SPEND_PCT: u128 = 90;

const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositInputs {
    pub reserves: PoolReserves,
    /// Which pool side holds the native asset.
    pub native_side: FixedSide,
    pub other_balance: u64,
    pub native_balance: u64,
    pub min_native_reserve: u64,
}

impl DepositInputs {
    /// `(native_reserve, other_reserve)`
    fn oriented_reserves(&self) -> Result<(u64, u64), CalcError> {
        let PoolReserves {
            base_reserve,
            quote_reserve,
        } = self.reserves;
        if base_reserve == 0 || quote_reserve == 0 {
            return Err(CalcError::EmptyReserves {
                base: base_reserve,
                quote: quote_reserve,
            });
        }
        Ok(match self.native_side {
            FixedSide::Base => (base_reserve, quote_reserve),
            FixedSide::Quote => (quote_reserve, base_reserve),
        })
    }

    fn assemble(&self, native_amount: u64, other_amount: u64, fixed: Fixed) -> LiquidityAmounts {
        let (base_amount, quote_amount) = match self.native_side {
            FixedSide::Base => (native_amount, other_amount),
            FixedSide::Quote => (other_amount, native_amount),
        };
        let fixed_side = match (fixed, self.native_side) {
            (Fixed::Native, side) => side,
            (Fixed::Other, FixedSide::Base) => FixedSide::Quote,
            (Fixed::Other, FixedSide::Quote) => FixedSide::Base,
        };
        LiquidityAmounts {
            base_amount,
            quote_amount,
            fixed_side,
        }
    }
}

#[derive(Clone, Copy)]
enum Fixed {
    Native,
    Other,
}

fn mul_div(a: u64, b: u64, denominator: u64) -> Result<u128, CalcError> {
    if denominator == 0 {
        return Err(CalcError::Overflow);
    }
    (a as u128)
        .checked_mul(b as u128)
        .map(|product| product / denominator as u128)
        .ok_or(CalcError::Overflow)
}

fn to_u64(value: u128) -> Result<u64, CalcError> {
    u64::try_from(value).map_err(|_| CalcError::Overflow)
}

/// Native amount that exactly matches `other_balance` at the current pool price.
pub fn required_counter(inputs: &DepositInputs) -> Result<u64, CalcError> {
    let (native_reserve, other_reserve) = inputs.oriented_reserves()?;
    to_u64(mul_div(inputs.other_balance, native_reserve, other_reserve)?)
}

/// Fixes the non-native balance and allows up to 10% more native than the
/// pool ratio asks for, to absorb reserve drift before execution.
pub fn compute_deposit(inputs: &DepositInputs) -> Result<LiquidityAmounts, CalcError> {
    if inputs.other_balance == 0 {
        return Err(CalcError::NothingToDeposit("token"));
    }
    let required = required_counter(inputs)? as u128;
    let max_counter = required
        .checked_mul(COUNTER_BUFFER_PCT)
        .map(|v| v / 100)
        .ok_or(CalcError::Overflow)?;

    Ok(inputs.assemble(to_u64(max_counter)?, inputs.other_balance, Fixed::Other))
}

/// Alternate strategy after a slippage rejection: spend 90% of the native
/// balance above the reserve and derive the token side from the reserves,
/// never exceeding what the wallet holds.
pub fn compute_native_fixed_deposit(inputs: &DepositInputs) -> Result<LiquidityAmounts, CalcError> {
    if inputs.native_balance <= inputs.min_native_reserve {
        return Err(CalcError::BelowReserve {
            balance: inputs.native_balance,
            reserve: inputs.min_native_reserve,
        });
    }
    let (native_reserve, other_reserve) = inputs.oriented_reserves()?;

    let spendable = (inputs.native_balance - inputs.min_native_reserve) as u128;
    let native_amount = to_u64(spendable * NATIVE_SPEND_PCT / 100)?;
    if native_amount == 0 {
        return Err(CalcError::NothingToDeposit("native"));
    }

    let derived_other = to_u64(mul_div(native_amount, other_reserve, native_reserve)?)?;
    let other_amount = derived_other.min(inputs.other_balance);
    if other_amount == 0 {
        return Err(CalcError::NothingToDeposit("token"));
    }

    Ok(inputs.assemble(native_amount, other_amount, Fixed::Native))
}

/// Pro-rata share of each reserve redeemed by burning `lp_amount`.
pub fn estimate_withdraw(
    lp_amount: u64,
    reserves: &PoolReserves,
    lp_supply: u64,
) -> Result<(u64, u64), CalcError> {
    if lp_supply == 0 {
        return Err(CalcError::EmptyReserves {
            base: reserves.base_reserve,
            quote: reserves.quote_reserve,
        });
    }
    let base = to_u64(mul_div(lp_amount, reserves.base_reserve, lp_supply)?)?;
    let quote = to_u64(mul_div(lp_amount, reserves.quote_reserve, lp_supply)?)?;
    Ok((base, quote))
}

pub fn slippage_floor(amount: u64, slippage_bps: u16) -> u64 {
    let bps = (slippage_bps as u128).min(BPS_DENOMINATOR);
    (amount as u128 * (BPS_DENOMINATOR - bps) / BPS_DENOMINATOR) as u64
}

/// `amount` raised by `slippage_bps`, saturating at `u64::MAX`.
pub fn slippage_ceiling(amount: u64, slippage_bps: u16) -> u64 {
    let raised = amount as u128 * (BPS_DENOMINATOR + slippage_bps as u128) / BPS_DENOMINATOR;
    u64::try_from(raised).unwrap_or(u64::MAX)
}
