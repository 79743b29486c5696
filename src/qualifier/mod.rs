//! Profit, fee, gas, liquidity, and slippage filters

use alloy::primitives::U256;
use chrono::Duration as ChronoDuration;
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config::Config;
use crate::detector::Candidate;
use crate::errors::ScanResult;
use crate::types::{Opportunity, OpportunityKind, OpportunityStatus, RejectReason};
use crate::utils::u256_to_decimal;

lazy_static! {
    /// Gas units per cycle kind, before the buffer multiplier.
    static ref GAS_ESTIMATES: HashMap<OpportunityKind, u64> = {
        let mut table = HashMap::new();
        table.insert(OpportunityKind::TwoLeg, 200_000);
        table.insert(OpportunityKind::Triangular, 300_000);
        table
    };
}

pub fn gas_estimate(kind: OpportunityKind) -> u64 {
    *GAS_ESTIMATES.get(&kind).unwrap_or(&200_000)
}

/// `true` when the current gas price allows a detection pass at all.
/// Exactly at the cap is accepted.
pub fn gas_price_acceptable(gas_price_wei: U256, max_gas_price_gwei: u64) -> bool {
    let cap_wei = U256::from(max_gas_price_gwei) * U256::from(1_000_000_000u64);
    gas_price_wei <= cap_wei
}

/// Applies the ordered qualification checks to detected candidates.
/// Rejections are data, not errors: the record comes back with status
/// `Rejected` and a reason code.
pub struct Qualifier {
    min_profit_quote: Decimal,
    min_margin: Decimal,
    min_liquidity_quote: Decimal,
    max_price_impact: Decimal,
    safety_margin: Decimal,
    gas_buffer: Decimal,
    opportunity_timeout_secs: u64,
}

impl Qualifier {
    pub fn new(config: &Config) -> Self {
        Self {
            min_profit_quote: config.min_profit_quote,
            min_margin: config.min_margin,
            min_liquidity_quote: config.min_liquidity_quote,
            max_price_impact: config.max_price_impact,
            safety_margin: config.safety_margin,
            gas_buffer: config.gas_buffer,
            opportunity_timeout_secs: config.opportunity_timeout_secs,
        }
    }

    /// Cycle gas cost in quote units:
    /// `gasEstimate · gasBuffer · gasPrice · price(native, quote)`.
    pub fn gas_cost_quote(
        &self,
        kind: OpportunityKind,
        gas_price_wei: U256,
        native_price_quote: Decimal,
    ) -> ScanResult<Decimal> {
        let units = Decimal::from(gas_estimate(kind)) * self.gas_buffer;
        let gas_price_native = u256_to_decimal(gas_price_wei, 18)?;
        Ok(units * gas_price_native * native_price_quote)
    }

    /// Runs checks in order and stops at the first failure. Returns the
    /// finished record, Qualified or Rejected.
    pub fn qualify(&self, candidate: &Candidate) -> Opportunity {
        let mut opp = candidate.opp.clone();
        opp.expires_at =
            opp.created_at + ChronoDuration::seconds(self.opportunity_timeout_secs as i64);

        if let Some(reason) = self.first_failure(candidate) {
            opp.status = OpportunityStatus::Rejected;
            opp.reject_reasons = vec![reason];
        } else {
            opp.status = OpportunityStatus::Qualified;
        }
        opp
    }

    fn first_failure(&self, candidate: &Candidate) -> Option<RejectReason> {
        let opp = &candidate.opp;

        if opp.net_profit_quote < self.min_profit_quote {
            return Some(RejectReason::BelowMinProfit);
        }
        if opp.margin < self.min_margin {
            return Some(RejectReason::BelowMinMargin);
        }
        let (first_liquidity, last_liquidity) = candidate.terminal_liquidity_quote;
        if first_liquidity < self.min_liquidity_quote || last_liquidity < self.min_liquidity_quote {
            return Some(RejectReason::InsufficientLiquidity);
        }
        if candidate
            .leg_impacts
            .iter()
            .any(|impact| *impact > self.max_price_impact)
        {
            return Some(RejectReason::PriceImpactTooHigh);
        }
        // The gas-price ceiling is enforced per tick before detection
        // runs; by the time a candidate exists the price was acceptable.
        let after_safety = opp.net_profit_quote * (Decimal::ONE - self.safety_margin);
        if after_safety < self.min_profit_quote {
            return Some(RejectReason::SafetyMarginShortfall);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PoolSide;
    use crate::types::{Leg, OpportunityKind};
    use alloy::primitives::{Address, B256};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn test_qualifier() -> Qualifier {
        Qualifier {
            min_profit_quote: dec!(10),
            min_margin: dec!(0.005),
            min_liquidity_quote: dec!(50000),
            max_price_impact: dec!(0.005),
            safety_margin: dec!(0.1),
            gas_buffer: dec!(1.2),
            opportunity_timeout_secs: 30,
        }
    }

    fn candidate(net: Decimal, margin: Decimal, liquidity: Decimal) -> Candidate {
        let created_at = Utc::now();
        Candidate {
            opp: Opportunity {
                id: "test".to_string(),
                kind: OpportunityKind::TwoLeg,
                legs: vec![Leg {
                    venue: "uniswap".to_string(),
                    token_in: Address::ZERO,
                    token_out: Address::from([1u8; 20]),
                }],
                trade_amount_in: U256::from(1_000_000u64),
                amount_out: U256::from(1_050_000u64),
                quote_token: Address::ZERO,
                gross_profit_quote: net + dec!(15),
                net_profit_quote: net,
                gas_cost_quote: dec!(10),
                fee_cost_quote: dec!(5),
                margin,
                block_number: 100,
                block_hash: B256::ZERO,
                created_at,
                expires_at: created_at,
                status: OpportunityStatus::Detected,
                reject_reasons: vec![],
            },
            leg_pools: vec![PoolSide::new(
                U256::from(1_000_000_000u64),
                U256::from(1_000_000_000u64),
                997,
                1000,
            )],
            leg_impacts: vec![dec!(0.001)],
            terminal_liquidity_quote: (liquidity, liquidity),
            quote_decimals: 6,
        }
    }

    #[test]
    fn healthy_candidate_qualifies() {
        let qualified = test_qualifier().qualify(&candidate(dec!(50), dec!(2), dec!(100000)));
        assert_eq!(qualified.status, OpportunityStatus::Qualified);
        assert!(qualified.reject_reasons.is_empty());
        assert!(qualified.expires_at > qualified.created_at);
    }

    #[test]
    fn thin_profit_rejected_first() {
        let rejected = test_qualifier().qualify(&candidate(dec!(5), dec!(0.001), dec!(1)));
        assert_eq!(rejected.status, OpportunityStatus::Rejected);
        // Ordered checks: profit fires before margin and liquidity.
        assert_eq!(rejected.reject_reasons, vec![RejectReason::BelowMinProfit]);
    }

    #[test]
    fn liquidity_veto() {
        let rejected = test_qualifier().qualify(&candidate(dec!(50), dec!(2), dec!(1000)));
        assert_eq!(
            rejected.reject_reasons,
            vec![RejectReason::InsufficientLiquidity]
        );
    }

    #[test]
    fn price_impact_veto() {
        let mut c = candidate(dec!(50), dec!(2), dec!(100000));
        c.leg_impacts = vec![dec!(0.01)];
        let rejected = test_qualifier().qualify(&c);
        assert_eq!(
            rejected.reject_reasons,
            vec![RejectReason::PriceImpactTooHigh]
        );
    }

    #[test]
    fn safety_margin_requalifies_profit() {
        // 11 passes the raw check but 11·0.9 = 9.9 < 10.
        let rejected = test_qualifier().qualify(&candidate(dec!(11), dec!(2), dec!(100000)));
        assert_eq!(
            rejected.reject_reasons,
            vec![RejectReason::SafetyMarginShortfall]
        );
    }

    #[test]
    fn raising_safety_margin_never_qualifies_more() {
        let lenient = test_qualifier();
        let mut strict = test_qualifier();
        strict.safety_margin = dec!(0.5);
        for net in [dec!(5), dec!(11), dec!(15), dec!(25), dec!(100)] {
            let c = candidate(net, dec!(2), dec!(100000));
            let lenient_ok = lenient.qualify(&c).status == OpportunityStatus::Qualified;
            let strict_ok = strict.qualify(&c).status == OpportunityStatus::Qualified;
            assert!(!strict_ok || lenient_ok, "monotonicity broken at net={net}");
        }
    }

    #[test]
    fn gas_price_boundary_is_inclusive() {
        let cap_gwei = 200u64;
        let exactly = U256::from(cap_gwei) * U256::from(1_000_000_000u64);
        assert!(gas_price_acceptable(exactly, cap_gwei));
        assert!(!gas_price_acceptable(exactly + U256::from(1), cap_gwei));
    }

    #[test]
    fn gas_cost_scales_with_kind_and_buffer() {
        let qualifier = test_qualifier();
        // 50 gwei, native at $2000.
        let gas_price = U256::from(50_000_000_000u64);
        let two_leg = qualifier
            .gas_cost_quote(OpportunityKind::TwoLeg, gas_price, dec!(2000))
            .unwrap();
        let triangular = qualifier
            .gas_cost_quote(OpportunityKind::Triangular, gas_price, dec!(2000))
            .unwrap();
        // 200k · 1.2 · 50e-9 ETH · $2000 = $24
        assert_eq!(two_leg, dec!(24));
        assert_eq!(triangular, dec!(36));
    }
}
