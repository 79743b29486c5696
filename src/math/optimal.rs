//! Optimal trade sizing via integer ternary search

use alloy::primitives::{I256, U256};

use crate::errors::ScanResult;

use super::swap::{amounts_out, cycle_fee_cost, PoolSide};

/// A sized trade with its net profit (may be negative) in units of the
/// first hop's input token.
#[derive(Debug, Clone, Copy)]
pub struct SizedTrade {
    pub amount_in: U256,
    pub amount_out: U256,
    pub net_profit: I256,
}

fn signed_delta(out: U256, cost: U256) -> Option<I256> {
    if out >= cost {
        I256::try_from(out - cost).ok()
    } else {
        I256::try_from(cost - out).ok().map(|v| -v)
    }
}

/// Evaluates the round trip at `amount_in`. `None` means a hop failed
/// at this probe (treated as profit −∞ for that probe only). With
/// `subtract_fees` the cycle's cumulative swap fees are charged on top
/// of gas, which is the acceptance rule for cycles of three or more
/// legs; the two-leg rule charges gas only.
fn evaluate(
    path: &[PoolSide],
    amount_in: U256,
    gas_cost: U256,
    subtract_fees: bool,
) -> Option<(I256, U256)> {
    let outputs = amounts_out(amount_in, path).ok()?;
    let out = *outputs.last()?;
    let mut cost = amount_in.checked_add(gas_cost)?;
    if subtract_fees {
        let fees = cycle_fee_cost(amount_in, &outputs, path).ok()?;
        cost = cost.checked_add(fees)?;
    }
    let profit = signed_delta(out, cost)?;
    Some((profit, out))
}

/// `true` when probe `a` is strictly worse than probe `b`.
fn worse(a: &Option<(I256, U256)>, b: &Option<(I256, U256)>) -> bool {
    match (a, b) {
        (None, None) => false,
        (None, Some(_)) => true,
        (Some(_), None) => false,
        (Some((pa, _)), Some((pb, _))) => pa < pb,
    }
}

/// Maximizes a unimodal profit function over `[lo, hi]` with ternary
/// search until the window is ≤ 2, then a linear scan of the residual.
/// Ties break to the smallest amount.
fn ternary_maximize(
    path: &[PoolSide],
    mut lo: U256,
    mut hi: U256,
    gas_cost: U256,
    subtract_fees: bool,
) -> Option<SizedTrade> {
    if lo.is_zero() {
        lo = U256::from(1);
    }
    if hi < lo {
        return None;
    }
    while hi - lo > U256::from(2) {
        let third = (hi - lo) / U256::from(3);
        let m1 = lo + third;
        let m2 = hi - third;
        let f1 = evaluate(path, m1, gas_cost, subtract_fees);
        let f2 = evaluate(path, m2, gas_cost, subtract_fees);
        if worse(&f1, &f2) {
            lo = m1 + U256::from(1);
        } else {
            hi = m2;
        }
    }

    let mut best: Option<SizedTrade> = None;
    let mut amount = lo;
    while amount <= hi {
        if let Some((profit, out)) = evaluate(path, amount, gas_cost, subtract_fees) {
            let replace = match &best {
                None => true,
                Some(b) => profit > b.net_profit,
            };
            if replace {
                best = Some(SizedTrade {
                    amount_in: amount,
                    amount_out: out,
                    net_profit: profit,
                });
            }
        }
        amount += U256::from(1);
    }
    best
}

/// Finds the input size in `[1, max_in]` maximizing the net profit of a
/// two-leg round trip `pool_a` then `pool_b`. The profit function is
/// unimodal for constant-product pools, so O(log max_in) probes
/// suffice.
pub fn optimal_two_leg_size(
    pool_a: &PoolSide,
    pool_b: &PoolSide,
    max_in: U256,
    gas_cost: U256,
) -> ScanResult<Option<SizedTrade>> {
    if max_in.is_zero() {
        return Ok(None);
    }
    let path = [*pool_a, *pool_b];
    Ok(ternary_maximize(&path, U256::from(1), max_in, gas_cost, false))
}

/// Two-phase sizing for longer cycles: a coarse geometric probe over
/// `reserve/k` for `k = 1024 … 1` locates the profitable region, then
/// ternary search refines inside it. A cycle is profitable only when
/// the output covers the input, gas, *and* the cumulative swap fees.
pub fn optimal_cycle_size(
    path: &[PoolSide],
    max_in: U256,
    gas_cost: U256,
) -> ScanResult<Option<SizedTrade>> {
    if path.is_empty() || max_in.is_zero() {
        return Ok(None);
    }
    let reserve = path[0].reserve_in;

    let mut best: Option<SizedTrade> = None;
    let mut k = 1024u64;
    loop {
        let mut amount = reserve / U256::from(k);
        if amount.is_zero() {
            amount = U256::from(1);
        }
        if amount > max_in {
            amount = max_in;
        }
        if let Some((profit, out)) = evaluate(path, amount, gas_cost, true) {
            let replace = match &best {
                None => true,
                Some(b) => profit > b.net_profit,
            };
            if replace {
                best = Some(SizedTrade {
                    amount_in: amount,
                    amount_out: out,
                    net_profit: profit,
                });
            }
        }
        if k == 1 {
            break;
        }
        k /= 2;
    }

    let anchor = match best {
        Some(b) => b.amount_in,
        None => return Ok(None),
    };
    let lo = (anchor / U256::from(2)).max(U256::from(1));
    let hi = anchor
        .checked_mul(U256::from(2))
        .unwrap_or(max_in)
        .min(max_in);
    let refined = ternary_maximize(path, lo, hi, gas_cost, true);

    Ok(match (best, refined) {
        (Some(b), Some(r)) if r.net_profit > b.net_profit => Some(r),
        (b, _) => b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    fn pool(reserve_in: u128, reserve_out: u128) -> PoolSide {
        PoolSide::new(u(reserve_in), u(reserve_out), 997, 1000)
    }

    /// Exhaustive reference maximum for small search spaces.
    fn brute_force(path: &[PoolSide], max_in: u128, gas: u128) -> Option<SizedTrade> {
        let mut best: Option<SizedTrade> = None;
        for a in 1..=max_in {
            if let Some((profit, out)) = evaluate(path, u(a), u(gas), false) {
                let replace = match &best {
                    None => true,
                    Some(b) => profit > b.net_profit,
                };
                if replace {
                    best = Some(SizedTrade {
                        amount_in: u(a),
                        amount_out: out,
                        net_profit: profit,
                    });
                }
            }
        }
        best
    }

    #[test]
    fn no_price_gap_means_no_profit() {
        // Same price on both pools: the fee guarantees a loss.
        let a = pool(1_000_000, 2_000_000);
        let b = pool(2_000_000, 1_000_000);
        let result = optimal_two_leg_size(&a, &b, u(100_000), u(0)).unwrap().unwrap();
        assert!(result.net_profit <= I256::ZERO);
    }

    #[test]
    fn clear_gap_is_found_and_profitable() {
        // Sell pool pays 5% more per unit than the buy pool charges.
        let buy = pool(1_000_000, 1_000_000);
        let sell = pool(1_000_000, 1_050_000);
        let result = optimal_two_leg_size(&buy, &sell, u(500_000), u(10)).unwrap().unwrap();
        assert!(result.net_profit > I256::ZERO);
        assert!(result.amount_in >= u(1) && result.amount_in <= u(500_000));
    }

    #[test]
    fn matches_brute_force_on_small_pools() {
        let buy = pool(50_000, 50_000);
        let sell = pool(50_000, 53_000);
        let searched = optimal_two_leg_size(&buy, &sell, u(2_000), u(5)).unwrap().unwrap();
        let reference = brute_force(&[buy, sell], 2_000, 5).unwrap();
        // Plateaus of equal profit are possible in integer space, so
        // compare the achieved profit, not the exact argmax.
        assert_eq!(searched.net_profit, reference.net_profit);
    }

    #[test]
    fn zero_max_in_yields_nothing() {
        let a = pool(1_000, 1_000);
        assert!(optimal_two_leg_size(&a, &a, U256::ZERO, u(0)).unwrap().is_none());
    }

    #[test]
    fn cycle_probe_finds_triangular_profit() {
        // Three legs engineered so the round trip gains ~6% after the
        // embedded curve fees, enough to also cover the explicit
        // cumulative-fee charge and gas.
        let path = [
            pool(1_000_000, 2_000_000),
            pool(2_000_000, 3_000_000),
            pool(3_000_000, 1_080_000),
        ];
        let result = optimal_cycle_size(&path, u(200_000), u(10)).unwrap().unwrap();
        assert!(result.net_profit > I256::ZERO);
    }

    #[test]
    fn cycle_rejects_when_fees_eat_the_edge() {
        // ~0.7% raw edge: positive against gas alone, but the ~0.9%
        // cumulative fee charge pushes the cycle under water.
        let path = [
            pool(1_000_000, 1_000_000),
            pool(1_000_000, 1_000_000),
            pool(1_000_000, 1_016_000),
        ];
        let result = optimal_cycle_size(&path, u(200_000), u(0)).unwrap();
        match result {
            Some(trade) => assert!(trade.net_profit <= I256::ZERO),
            None => {}
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn search_is_within_one_of_brute_force(
            reserve in 10_000u128..100_000u128,
            gap_bps in 100u128..2_000u128,
            gas in 0u128..20u128,
        ) {
            let buy = pool(reserve, reserve);
            let sell = pool(reserve, reserve + reserve * gap_bps / 10_000);
            let max_in = 1_500u128;
            let searched = optimal_two_leg_size(&buy, &sell, u(max_in), u(gas)).unwrap();
            let reference = brute_force(&[buy, sell], max_in, gas);
            match (searched, reference) {
                (Some(s), Some(r)) => prop_assert_eq!(s.net_profit, r.net_profit),
                (s, r) => prop_assert!(s.is_none() == r.is_none()),
            }
        }
    }
}
