//! Utility functions and helpers

use rust_decimal::Decimal;

use crate::shared::errors::DexError;

/// Largest mantissa a `Decimal` holds
const MAX_DECIMAL_MANTISSA: u128 = (1 << 96) - 1;
const MAX_DECIMAL_SCALE: u32 = 28;

fn pow10(exponent: u32) -> Option<u128> {
    10u128.checked_pow(exponent)
}

/// Convert a token-unit amount into base units, rounding down
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u128, DexError> {
    if amount.is_sign_negative() {
        return Err(DexError::InvalidAmount(amount.to_string()));
    }
    let overflow = || DexError::Math(format!("amount {} overflows base units", amount));
    let mantissa = u128::try_from(amount.mantissa()).map_err(|_| overflow())?;
    let (decimals, scale) = (decimals as u32, amount.scale());
    if decimals >= scale {
        pow10(decimals - scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(overflow)
    } else {
        Ok(pow10(scale - decimals).map_or(0, |divisor| mantissa / divisor))
    }
}

/// Convert base units into a token-unit amount.
///
/// Values beyond `Decimal` precision drop their lowest digits.
pub fn from_base_units(value: u128, decimals: u8) -> Result<Decimal, DexError> {
    let (mut mantissa, mut scale) = (value, decimals as u32);
    while scale > 0 && (mantissa > MAX_DECIMAL_MANTISSA || scale > MAX_DECIMAL_SCALE) {
        mantissa /= 10;
        scale -= 1;
    }
    if mantissa > MAX_DECIMAL_MANTISSA {
        return Err(DexError::Math(format!("{} is too large", value)));
    }
    Decimal::try_from_i128_with_scale(mantissa as i128, scale)
        .map(|amount| amount.normalize())
        .map_err(|e| DexError::Math(e.to_string()))
}

/// Parse a user-entered amount
pub fn parse_amount(input: &str) -> Result<Decimal, DexError> {
    let amount: Decimal = input
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| DexError::InvalidAmount(input.to_string()))?;
    if amount <= Decimal::ZERO {
        return Err(DexError::InvalidAmount(input.to_string()));
    }
    Ok(amount)
}

/// Format amount with proper decimals, keeping at most 9 fractional digits
pub fn format_amount(amount: u128, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (integer, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction[..decimals.min(9)].trim_end_matches('0');
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{}.{}", integer, fraction)
    }
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_base_units_rounds_down() {
        assert_eq!(to_base_units(dec!(10), 9).unwrap(), 10_000_000_000);
        assert_eq!(to_base_units(dec!(1.0000000019), 9).unwrap(), 1_000_000_001);
        assert!(to_base_units(dec!(-1), 9).is_err());
        assert_eq!(to_base_units(dec!(0.5), 0).unwrap(), 0);
    }

    #[test]
    fn test_large_amounts_of_18_decimal_tokens() {
        let units = to_base_units(dec!(100000000000), 18).unwrap();
        assert_eq!(units, 100_000_000_000 * 10u128.pow(18));
        assert_eq!(to_base_units(dec!(250000000000.123456789), 18).unwrap(), 250_000_000_000_123_456_789 * 10u128.pow(9));
        assert!(to_base_units(dec!(1000000000000000000000), 18).is_err());

        assert_eq!(from_base_units(units, 18).unwrap(), dec!(100000000000));
        assert_eq!(from_base_units(units + 1, 18).unwrap(), dec!(100000000000));
        assert_eq!(format_amount(units + 5 * 10u128.pow(17), 18), "100000000000.5");
        assert_eq!(format_amount(u128::MAX, 18), "340282366920938463463.374607431");
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units(19_801_980_198, 9).unwrap(), dec!(19.801980198));
        assert_eq!(from_base_units(5, 0).unwrap(), dec!(5));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 1,5 ").unwrap(), dec!(1.5));
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_500_000_000, 9), "1.5");
        assert_eq!(format_amount(123, 0), "123");
        assert_eq!(format_amount(5, 9), "0.000000005");
        assert_eq!(format_amount(0, 6), "0");
    }
}
