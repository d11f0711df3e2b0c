//! Constant-product pair math in token units
//!
//! Used for local derivations only (rates, price impact, route ranking). The
//! amount submitted on chain is always taken from the pair's own getter.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::liquidity::mul_div;
use crate::shared::errors::DexError;

/// Pair fee as a fraction `numerator / denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub numerator: u64,
    pub denominator: u64,
}

impl Fee {
    pub const ZERO: Fee = Fee {
        numerator: 0,
        denominator: 1_000_000,
    };

    pub fn new(numerator: u64, denominator: u64) -> Result<Self, DexError> {
        if denominator == 0 || numerator >= denominator {
            return Err(DexError::Math(format!("invalid fee {}/{}", numerator, denominator)));
        }
        Ok(Self { numerator, denominator })
    }

    /// Share of the input that reaches the reserves
    fn kept(&self) -> Decimal {
        Decimal::from(self.denominator - self.numerator) / Decimal::from(self.denominator)
    }

    pub fn percent(&self) -> Decimal {
        Decimal::from(self.numerator) * dec!(100) / Decimal::from(self.denominator)
    }
}

/// Reserves of one swap direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolState {
    pub reserve_in: Decimal,
    pub reserve_out: Decimal,
    pub fee: Fee,
}

impl PoolState {
    pub fn new(reserve_in: Decimal, reserve_out: Decimal, fee: Fee) -> Self {
        Self {
            reserve_in,
            reserve_out,
            fee,
        }
    }
}

fn overflow() -> DexError {
    DexError::Math("arithmetic overflow".to_string())
}

pub struct ConstantProductMath;

impl ConstantProductMath {
    /// Output for `amount_in`: `out = R_out * a' / (R_in + a')` with `a'` the
    /// input after fee
    pub fn expected_output(amount_in: Decimal, pool: &PoolState) -> Result<Decimal, DexError> {
        if amount_in <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(amount_in.to_string()));
        }
        if pool.reserve_in <= Decimal::ZERO || pool.reserve_out <= Decimal::ZERO {
            return Err(DexError::InsufficientLiquidity);
        }

        let amount_after_fee = amount_in.checked_mul(pool.fee.kept()).ok_or_else(overflow)?;
        let numerator = amount_after_fee.checked_mul(pool.reserve_out).ok_or_else(overflow)?;
        let denominator = pool.reserve_in.checked_add(amount_after_fee).ok_or_else(overflow)?;
        numerator.checked_div(denominator).ok_or_else(overflow)
    }

    /// Input needed to receive exactly `amount_out`
    pub fn expected_spent(amount_out: Decimal, pool: &PoolState) -> Result<Decimal, DexError> {
        if amount_out <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(amount_out.to_string()));
        }
        if amount_out >= pool.reserve_out {
            return Err(DexError::InsufficientLiquidity);
        }

        let numerator = pool.reserve_in.checked_mul(amount_out).ok_or_else(overflow)?;
        let after_fee = numerator
            .checked_div(pool.reserve_out - amount_out)
            .ok_or_else(overflow)?;
        after_fee.checked_div(pool.fee.kept()).ok_or_else(overflow)
    }

    /// Percentage by which the execution rate is worse than the spot rate
    pub fn price_impact(amount_in: Decimal, pool: &PoolState) -> Result<Decimal, DexError> {
        if amount_in <= Decimal::ZERO || pool.reserve_in <= Decimal::ZERO {
            return Err(DexError::InsufficientLiquidity);
        }
        let total = pool.reserve_in.checked_add(amount_in).ok_or_else(overflow)?;
        amount_in
            .checked_div(total)
            .and_then(|ratio| ratio.checked_mul(dec!(100)))
            .ok_or_else(overflow)
    }

    /// Units of the output token per unit of the input token
    pub fn spot_price(pool: &PoolState) -> Option<Decimal> {
        if pool.reserve_in <= Decimal::ZERO {
            return None;
        }
        pool.reserve_out.checked_div(pool.reserve_in)
    }
}

/// Validate a slippage tolerance given in percent
pub fn validate_slippage(slippage: Decimal) -> Result<Decimal, DexError> {
    if slippage <= Decimal::ZERO || slippage >= dec!(100) {
        return Err(DexError::InvalidSlippage(slippage.to_string()));
    }
    Ok(slippage)
}

/// Least amount accepted on chain: `expected * (100 - slippage) / 100`,
/// rounded down in base units
pub fn min_expected_amount(expected: u128, slippage: Decimal) -> Result<u128, DexError> {
    let slippage = validate_slippage(slippage)?;
    let kept = ((dec!(100) - slippage) / dec!(100)).normalize();

    let mantissa = u128::try_from(kept.mantissa()).map_err(|e| DexError::Math(e.to_string()))?;
    mul_div(expected, mantissa, 10u128.pow(kept.scale()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(reserve_in: Decimal, reserve_out: Decimal) -> PoolState {
        PoolState::new(reserve_in, reserve_out, Fee::ZERO)
    }

    #[test]
    fn test_expected_output_without_fee() {
        let out = ConstantProductMath::expected_output(dec!(10), &pool(dec!(1000), dec!(2000))).unwrap();
        assert_eq!(out.round_dp(5), dec!(19.80198));
    }

    #[test]
    fn test_fee_reduces_output() {
        let fee = Fee::new(3_000, 1_000_000).unwrap();
        let pool = PoolState::new(dec!(1000), dec!(2000), fee);
        let with_fee = ConstantProductMath::expected_output(dec!(10), &pool).unwrap();
        assert!(with_fee < dec!(19.80198));
        assert_eq!(fee.percent(), dec!(0.3));
    }

    #[test]
    fn test_expected_spent_inverts_output() {
        let pool = PoolState::new(dec!(1000), dec!(2000), Fee::new(3, 1000).unwrap());
        let spent = ConstantProductMath::expected_spent(dec!(50), &pool).unwrap();
        let out = ConstantProductMath::expected_output(spent, &pool).unwrap();
        assert_eq!(out.round_dp(9), dec!(50));
        assert_eq!(
            ConstantProductMath::expected_spent(dec!(2000), &pool),
            Err(DexError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_price_impact() {
        let impact = ConstantProductMath::price_impact(dec!(10), &pool(dec!(1000), dec!(2000))).unwrap();
        assert_eq!(impact.round_dp(4), dec!(0.9901));
    }

    #[test]
    fn test_min_expected_amount_rounds_down() {
        assert_eq!(min_expected_amount(19_801_980_198, dec!(0.5)).unwrap(), 19_702_970_297);
        assert_eq!(min_expected_amount(u128::MAX, dec!(50)).unwrap(), u128::MAX / 2);
        // 200 billion tokens at 18 decimals
        let expected = 200_000_000_000 * 10u128.pow(18);
        assert_eq!(min_expected_amount(expected, dec!(0.5)).unwrap(), 199_000_000_000 * 10u128.pow(18));
        assert_eq!(min_expected_amount(expected + 1, dec!(1.1)).unwrap(), 197_800_000_000 * 10u128.pow(18));
        assert!(min_expected_amount(100, dec!(0)).is_err());
        assert!(min_expected_amount(100, dec!(100)).is_err());
    }

    #[test]
    fn test_empty_pool_has_no_quote() {
        assert_eq!(
            ConstantProductMath::expected_output(dec!(1), &pool(Decimal::ZERO, dec!(5))),
            Err(DexError::InsufficientLiquidity)
        );
        assert!(ConstantProductMath::spot_price(&pool(Decimal::ZERO, dec!(1))).is_none());
    }
}
