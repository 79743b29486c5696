//! Constant-product swap math

use alloy::primitives::{U256, U512};
use rust_decimal::Decimal;

use crate::errors::{ScanError, ScanResult};

/// One pool oriented for a specific swap direction.
#[derive(Debug, Clone, Copy)]
pub struct PoolSide {
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee_num: u32,
    pub fee_den: u32,
}

impl PoolSide {
    pub fn new(reserve_in: U256, reserve_out: U256, fee_num: u32, fee_den: u32) -> Self {
        Self {
            reserve_in,
            reserve_out,
            fee_num,
            fee_den,
        }
    }
}

/// Output amount of a constant-product swap:
/// `floor((aIn·feeNum·rOut) / (rIn·feeDen + aIn·feeNum))`.
/// Always strictly less than `reserve_out`.
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_num: u32,
    fee_den: u32,
) -> ScanResult<U256> {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(ScanError::invalid_input(
            "get_amount_out requires positive amount and reserves",
        ));
    }
    let amount_with_fee = U512::from(amount_in) * U512::from(fee_num as u64);
    let numerator = amount_with_fee * U512::from(reserve_out);
    let denominator = U512::from(reserve_in) * U512::from(fee_den as u64) + amount_with_fee;
    super::u512_to_u256(numerator / denominator)
}

/// Input amount required to receive exactly `amount_out`:
/// `floor((rIn·aOut·feeDen) / ((rOut − aOut)·feeNum)) + 1`.
pub fn get_amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_num: u32,
    fee_den: u32,
) -> ScanResult<U256> {
    if amount_out.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(ScanError::invalid_input(
            "get_amount_in requires positive amount and reserves",
        ));
    }
    if amount_out >= reserve_out {
        return Err(ScanError::InsufficientLiquidity {
            pool: "-".to_string(),
            details: format!("requested {amount_out} of {reserve_out} reserve"),
        });
    }
    let numerator = U512::from(reserve_in) * U512::from(amount_out) * U512::from(fee_den as u64);
    let denominator = U512::from(reserve_out - amount_out) * U512::from(fee_num as u64);
    super::u512_to_u256(numerator / denominator + U512::from(1u64))
}

/// Applies `get_amount_out` hop by hop, returning the output of every
/// hop. Fails fast on the first hop that cannot produce a unit of
/// output.
pub fn amounts_out(amount_in: U256, path: &[PoolSide]) -> ScanResult<Vec<U256>> {
    let mut outputs = Vec::with_capacity(path.len());
    let mut current = amount_in;
    for (i, hop) in path.iter().enumerate() {
        let out = get_amount_out(
            current,
            hop.reserve_in,
            hop.reserve_out,
            hop.fee_num,
            hop.fee_den,
        )?;
        if out.is_zero() {
            return Err(ScanError::InsufficientLiquidity {
                pool: format!("hop {i}"),
                details: format!("input {current} produces no output"),
            });
        }
        outputs.push(out);
        current = out;
    }
    Ok(outputs)
}

/// Swap fees of a cycle valued in the first hop's input token. Leg 0
/// pays its fee in that token directly; leg `i` pays in its own input
/// token, valued back through the spot prices of hops `i..`.
pub fn cycle_fee_cost(amount_in: U256, hop_outputs: &[U256], pools: &[PoolSide]) -> ScanResult<U256> {
    let mut total = U512::ZERO;
    for i in 0..pools.len() {
        let input = if i == 0 { amount_in } else { hop_outputs[i - 1] };
        let pool = &pools[i];
        let mut value = U512::from(input)
            * U512::from((pool.fee_den - pool.fee_num) as u64)
            / U512::from(pool.fee_den as u64);
        if i > 0 {
            for later in &pools[i..] {
                if later.reserve_in.is_zero() {
                    return Err(ScanError::invalid_input("zero reserve in fee conversion"));
                }
                value = value * U512::from(later.reserve_out) / U512::from(later.reserve_in);
            }
        }
        total += value;
    }
    super::u512_to_u256(total)
}

/// Price impact of a swap in `[0, 1)`:
/// `1 − (aOut/aIn) / (rOut/rIn)`, exact rationals truncated to six
/// decimal places.
pub fn price_impact(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_num: u32,
    fee_den: u32,
) -> ScanResult<Decimal> {
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, fee_num, fee_den)?;
    let spot = U512::from(amount_in) * U512::from(reserve_out);
    let effective = U512::from(amount_out) * U512::from(reserve_in);
    debug_assert!(effective <= spot);
    let ppm = (spot - effective) * U512::from(1_000_000u64) / spot;
    let raw = i128::try_from(ppm).map_err(|_| ScanError::invalid_input("price impact overflow"))?;
    Ok(Decimal::from_i128_with_scale(raw, 6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn amount_out_matches_reference_values() {
        // 1 WETH into a 1000 WETH / 2,000,000 USDC pool at 997/1000.
        let out = get_amount_out(
            u(1_000_000_000_000_000_000),
            u(1_000_000_000_000_000_000_000),
            u(2_000_000_000_000),
            997,
            1000,
        )
        .unwrap();
        // A hair under 2000 USDC (fee + slippage).
        assert!(out > u(1_990_000_000));
        assert!(out < u(2_000_000_000));
    }

    #[test]
    fn amount_out_rejects_zero_inputs() {
        assert!(get_amount_out(u(0), u(10), u(10), 997, 1000).is_err());
        assert!(get_amount_out(u(1), u(0), u(10), 997, 1000).is_err());
        assert!(get_amount_out(u(1), u(10), u(0), 997, 1000).is_err());
    }

    #[test]
    fn amount_in_rejects_draining_the_pool() {
        let err = get_amount_in(u(10), u(100), u(10), 997, 1000).unwrap_err();
        assert!(matches!(err, ScanError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn amount_in_near_reserve_is_finite() {
        // aOut = reserveOut − 1 demands an enormous but finite input.
        let reserve_out = u(1_000_000);
        let amount_in = get_amount_in(reserve_out - u(1), u(1_000_000), reserve_out, 997, 1000).unwrap();
        assert!(amount_in > u(1_000_000));
        // And it really does buy that much back.
        let out = get_amount_out(amount_in, u(1_000_000), reserve_out, 997, 1000).unwrap();
        assert!(out >= reserve_out - u(1));
    }

    #[test]
    fn amounts_out_fails_fast_on_dust_hop() {
        let path = [
            PoolSide::new(u(1_000_000_000_000), u(10), 997, 1000),
            PoolSide::new(u(1_000_000), u(1_000_000), 997, 1000),
        ];
        // Tiny input through a massively imbalanced first hop yields 0.
        let err = amounts_out(u(1000), &path).unwrap_err();
        assert!(matches!(err, ScanError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn fee_cost_of_balanced_two_leg_cycle() {
        // 0.3% per leg on equal-priced pools: total fee close to 0.6%
        // of the input.
        let path = [
            PoolSide::new(u(1_000_000_000), u(1_000_000_000), 997, 1000),
            PoolSide::new(u(1_000_000_000), u(1_000_000_000), 997, 1000),
        ];
        let amount = u(1_000_000);
        let outputs = amounts_out(amount, &path).unwrap();
        let fee = cycle_fee_cost(amount, &outputs, &path).unwrap();
        assert!(fee > u(5_900));
        assert!(fee < u(6_100));
    }

    #[test]
    fn fee_cost_values_later_legs_through_spot_prices() {
        // Quote→base at 2000, base→quote back at 2000. The second
        // leg's fee is taken in base and must come back as quote-sized,
        // so both legs contribute ~0.3% of the input.
        let path = [
            PoolSide::new(u(2_000_000_000_000), u(1_000_000_000), 997, 1000),
            PoolSide::new(u(1_000_000_000), u(2_000_000_000_000), 997, 1000),
        ];
        let amount = u(1_000_000_000); // 0.05% of the quote reserve
        let outputs = amounts_out(amount, &path).unwrap();
        let fee = cycle_fee_cost(amount, &outputs, &path).unwrap();
        // ~0.6% of the input, in input units; slippage shaves a hair.
        assert!(fee > u(5_900_000));
        assert!(fee < u(6_100_000));
    }

    #[test]
    fn fee_cost_rejects_zero_reserves() {
        let path = [
            PoolSide::new(u(100), u(100), 997, 1000),
            PoolSide::new(U256::ZERO, u(100), 997, 1000),
        ];
        assert!(cycle_fee_cost(u(10), &[u(9), u(8)], &path).is_err());
    }

    #[test]
    fn price_impact_grows_with_trade_size() {
        let small = price_impact(u(1_000), u(1_000_000_000), u(1_000_000_000), 997, 1000).unwrap();
        let large = price_impact(u(100_000_000), u(1_000_000_000), u(1_000_000_000), 997, 1000).unwrap();
        assert!(large > small);
        assert!(small >= dec!(0));
        assert!(large < dec!(1));
    }

    proptest! {
        #[test]
        fn output_always_below_reserve(
            amount_in in 1u128..u128::MAX / 2,
            reserve_in in 1u128..(1u128 << 112),
            reserve_out in 1u128..(1u128 << 112),
        ) {
            let out = get_amount_out(u(amount_in), u(reserve_in), u(reserve_out), 997, 1000).unwrap();
            prop_assert!(out < u(reserve_out));
        }

        #[test]
        fn amount_in_covers_requested_output(
            reserve_in in 1000u128..(1u128 << 100),
            reserve_out in 1000u128..(1u128 << 100),
            out_fraction in 1u128..999u128,
        ) {
            let amount_out = u(reserve_out) * u(out_fraction) / u(1000);
            prop_assume!(!amount_out.is_zero());
            let amount_in = get_amount_in(amount_out, u(reserve_in), u(reserve_out), 997, 1000).unwrap();
            let realized = get_amount_out(amount_in, u(reserve_in), u(reserve_out), 997, 1000).unwrap();
            prop_assert!(realized >= amount_out);
        }

        #[test]
        fn round_trip_across_identical_pools_never_profits(
            amount_in in 1u128..(1u128 << 90),
            reserve_a in 1000u128..(1u128 << 100),
            reserve_b in 1000u128..(1u128 << 100),
        ) {
            // Identical pools, fee_num == fee_den: the round trip can
            // only lose to rounding, never gain.
            let mid = get_amount_out(u(amount_in), u(reserve_a), u(reserve_b), 1000, 1000).unwrap();
            prop_assume!(!mid.is_zero());
            let back = get_amount_out(mid, u(reserve_b), u(reserve_a), 1000, 1000).unwrap();
            prop_assert!(back <= u(amount_in));
        }
    }
}
