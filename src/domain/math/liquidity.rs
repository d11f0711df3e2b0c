//! LP share math in base units

use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shared::errors::DexError;

/// Portion of the pool an LP balance redeems for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawShare {
    pub left: u128,
    pub right: u128,
    /// Share of the LP supply, in percent
    pub percent: Decimal,
}

/// Fractional digits kept in a share percent
const PERCENT_SCALE: u32 = 18;

/// `value * numerator / denominator`, rounded down.
///
/// The product is taken in 256 bits so the result is exact whenever it fits
/// in `u128`.
pub fn mul_div(value: u128, numerator: u128, denominator: u128) -> Result<u128, DexError> {
    if denominator == 0 {
        return Err(DexError::Math("division by zero".to_string()));
    }
    if let Some(product) = value.checked_mul(numerator) {
        return Ok(product / denominator);
    }
    let result = U256::from(value) * U256::from(numerator) / U256::from(denominator);
    if result > U256::from(u128::MAX) {
        return Err(DexError::Math("multiplication overflow".to_string()));
    }
    Ok(result.as_u128())
}

/// Reserves redeemable for `lp_balance`: `lp * reserve / supply` on each side
pub fn withdraw_share(
    lp_balance: u128,
    lp_supply: u128,
    left_reserve: u128,
    right_reserve: u128,
) -> Result<WithdrawShare, DexError> {
    if lp_supply == 0 {
        return Err(DexError::InsufficientLiquidity);
    }
    if lp_balance > lp_supply {
        return Err(DexError::InvalidAmount(lp_balance.to_string()));
    }

    let percent = mul_div(lp_balance, 100 * 10u128.pow(PERCENT_SCALE), lp_supply)?;
    let percent = Decimal::try_from_i128_with_scale(percent as i128, PERCENT_SCALE)
        .map_err(|e| DexError::Math(e.to_string()))?
        .normalize();

    Ok(WithdrawShare {
        left: mul_div(lp_balance, left_reserve, lp_supply)?,
        right: mul_div(lp_balance, right_reserve, lp_supply)?,
        percent,
    })
}

/// LP tokens minted for depositing both sides into an existing pool.
///
/// The pool takes the smaller proportional contribution.
pub fn expected_lp_reward(
    left_amount: u128,
    right_amount: u128,
    left_reserve: u128,
    right_reserve: u128,
    lp_supply: u128,
) -> Result<u128, DexError> {
    if lp_supply == 0 || left_reserve == 0 || right_reserve == 0 {
        return Err(DexError::InsufficientLiquidity);
    }
    let by_left = mul_div(left_amount, lp_supply, left_reserve)?;
    let by_right = mul_div(right_amount, lp_supply, right_reserve)?;
    Ok(by_left.min(by_right))
}
