//! Conversions between raw token units and decimal quote amounts

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::errors::{ScanError, ScanResult};

/// Fractional digits preserved when collapsing raw units to a decimal.
const DISPLAY_SCALE: u8 = 12;

pub fn pow10_u256(n: u8) -> U256 {
    U256::from(10u64).pow(U256::from(n))
}

/// Raw integer token units to a decimal amount, truncating below
/// `DISPLAY_SCALE` fractional digits. Reserves fit because uint112
/// scaled down by any realistic decimals stays inside `i128`.
pub fn u256_to_decimal(value: U256, decimals: u8) -> ScanResult<Decimal> {
    let frac = decimals.min(DISPLAY_SCALE);
    let scaled = value / pow10_u256(decimals - frac);
    let raw: i128 = i128::try_from(scaled)
        .map_err(|_| ScanError::invalid_input(format!("amount {value} exceeds decimal range")))?;
    Ok(Decimal::from_i128_with_scale(raw, frac as u32))
}

/// Decimal amount to raw integer token units, truncating any excess
/// precision. Negative amounts are a programmer error.
pub fn decimal_to_u256(value: Decimal, decimals: u8) -> ScanResult<U256> {
    if value.is_sign_negative() {
        return Err(ScanError::invalid_input("negative amount"));
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    if u32::from(decimals) >= scale {
        Ok(mantissa * pow10_u256(decimals - scale as u8))
    } else {
        Ok(mantissa / pow10_u256(scale as u8 - decimals))
    }
}

/// Wei to gwei for display and gas comparisons.
pub fn wei_to_gwei(wei: U256) -> ScanResult<Decimal> {
    u256_to_decimal(wei, 9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_wei_amounts() {
        let one_eth = U256::from(10u64).pow(U256::from(18));
        assert_eq!(u256_to_decimal(one_eth, 18).unwrap(), dec!(1).round_dp(12));
        assert_eq!(decimal_to_u256(dec!(1), 18).unwrap(), one_eth);
    }

    #[test]
    fn six_decimal_tokens_keep_full_precision() {
        let amount = U256::from(2_000_000_123_456u64);
        let dec = u256_to_decimal(amount, 6).unwrap();
        assert_eq!(dec, dec!(2000000.123456));
        assert_eq!(decimal_to_u256(dec, 6).unwrap(), amount);
    }

    #[test]
    fn excess_precision_truncates() {
        assert_eq!(
            decimal_to_u256(dec!(1.2345678), 6).unwrap(),
            U256::from(1_234_567u64)
        );
    }

    #[test]
    fn negative_amounts_rejected() {
        assert!(decimal_to_u256(dec!(-1), 18).is_err());
    }
}
