//! Exact rational arithmetic for price comparisons

use alloy::primitives::{U256, U512};
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::errors::{ScanError, ScanResult};

/// A non-negative rational with a strictly positive denominator.
/// Comparisons cross-multiply in 512 bits so reserve-sized operands
/// never overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub num: U256,
    pub den: U256,
}

impl Ratio {
    pub fn new(num: U256, den: U256) -> ScanResult<Self> {
        if den.is_zero() {
            return Err(ScanError::invalid_input("ratio denominator is zero"));
        }
        Ok(Self { num, den })
    }

    pub fn zero() -> Self {
        Self {
            num: U256::ZERO,
            den: U256::from(1),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub fn compare(&self, other: &Ratio) -> Ordering {
        let lhs = U512::from(self.num) * U512::from(other.den);
        let rhs = U512::from(other.num) * U512::from(self.den);
        lhs.cmp(&rhs)
    }

    pub fn lt(&self, other: &Ratio) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// `|a − b| / min(a, b)`, exact. Errors if either ratio is zero
    /// (the gap is undefined without a positive reference price).
    pub fn relative_gap(a: &Ratio, b: &Ratio) -> ScanResult<Ratio> {
        if a.is_zero() || b.is_zero() {
            return Err(ScanError::invalid_input("relative gap of zero price"));
        }
        let x = U512::from(a.num) * U512::from(b.den);
        let y = U512::from(b.num) * U512::from(a.den);
        let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
        let num = super::u512_to_u256(hi - lo)?;
        let den = super::u512_to_u256(lo)?;
        Ratio::new(num, den)
    }

    /// Builds a ratio from a decimal: `mantissa / 10^scale`.
    pub fn from_decimal(value: Decimal) -> ScanResult<Self> {
        if value.is_sign_negative() {
            return Err(ScanError::invalid_input("negative ratio"));
        }
        let mantissa = value.mantissa().unsigned_abs();
        let den = U256::from(10u64).pow(U256::from(value.scale()));
        Ratio::new(U256::from(mantissa), den)
    }

    /// Truncates to a fixed-scale decimal.
    pub fn to_decimal(&self, scale: u32) -> ScanResult<Decimal> {
        let scaled = U512::from(self.num) * U512::from(10u64).pow(U512::from(scale));
        let quotient = scaled / U512::from(self.den);
        let raw: i128 = i128::try_from(quotient)
            .map_err(|_| ScanError::invalid_input("ratio exceeds decimal range"))?;
        Ok(Decimal::from_i128_with_scale(raw, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ratio(num: u64, den: u64) -> Ratio {
        Ratio::new(U256::from(num), U256::from(den)).unwrap()
    }

    #[test]
    fn compare_cross_multiplies() {
        assert_eq!(ratio(1, 2).compare(&ratio(2, 4)), Ordering::Equal);
        assert!(ratio(1, 3).lt(&ratio(1, 2)));
        assert!(!ratio(3, 2).lt(&ratio(1, 2)));
    }

    #[test]
    fn zero_denominator_rejected() {
        assert!(Ratio::new(U256::from(1), U256::ZERO).is_err());
    }

    #[test]
    fn relative_gap_is_symmetric() {
        let a = ratio(2100, 1);
        let b = ratio(2000, 1);
        let gap_ab = Ratio::relative_gap(&a, &b).unwrap();
        let gap_ba = Ratio::relative_gap(&b, &a).unwrap();
        assert_eq!(gap_ab.compare(&gap_ba), Ordering::Equal);
        // 100/2000 = 5%
        assert_eq!(gap_ab.to_decimal(4).unwrap(), dec!(0.0500));
    }

    #[test]
    fn from_decimal_round_trips() {
        let r = Ratio::from_decimal(dec!(0.005)).unwrap();
        assert_eq!(r.to_decimal(3).unwrap(), dec!(0.005));
    }

    #[test]
    fn compare_survives_reserve_sized_operands() {
        // 112-bit reserves cross-multiplied exceed 224 bits; the
        // comparison must stay exact.
        let big = U256::from(1u128 << 112) - U256::from(1);
        let a = Ratio::new(big, U256::from(1)).unwrap();
        let b = Ratio::new(big - U256::from(1), U256::from(1)).unwrap();
        assert!(b.lt(&a));
    }
}
