//! Risk gate: fractional-Kelly sizing plus portfolio limit checks

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::detector::Candidate;
use crate::math::{amounts_out, cycle_fee_cost, price_impact};
use crate::types::{Portfolio, PortfolioState, RejectReason};
use crate::utils::{decimal_to_u256, u256_to_decimal};

const KELLY_FRACTION: Decimal = dec!(0.25);
/// Constant volatility term of the observability score; no volatility
/// feed exists in a reserves-only scanner.
const VOLATILITY_TERM: Decimal = dec!(0.2);

/// Outcome of the risk gate for one qualified opportunity.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub approved: bool,
    /// `true` when the opportunity expired before assessment; dropped
    /// without a record.
    pub expired: bool,
    pub sized_amount: U256,
    pub sized_amount_quote: Decimal,
    /// Observability score in `[0, 1]`; higher is riskier. Not a gate.
    pub score: Decimal,
    pub reasons: Vec<RejectReason>,
}

pub struct RiskGate {
    portfolio: Arc<Portfolio>,
    min_position_quote: Decimal,
    max_position_quote: Decimal,
    max_portfolio_exposure: Decimal,
    max_daily_loss_quote: Decimal,
    max_drawdown: Decimal,
    assumed_loss_fraction: Decimal,
    max_concurrent_positions: u32,
    max_price_impact: Decimal,
    min_profit_quote: Decimal,
}

impl RiskGate {
    pub fn new(config: &Config, portfolio: Arc<Portfolio>) -> Self {
        Self {
            portfolio,
            min_position_quote: config.min_position_size_quote,
            max_position_quote: config.max_position_size_quote,
            max_portfolio_exposure: config.max_portfolio_exposure,
            max_daily_loss_quote: config.max_daily_loss_quote,
            max_drawdown: config.max_drawdown,
            assumed_loss_fraction: config.assumed_loss_fraction,
            max_concurrent_positions: config.max_concurrent_positions,
            max_price_impact: config.max_price_impact,
            min_profit_quote: config.min_profit_quote,
        }
    }

    /// Sizes a hypothetical position and vets it against portfolio
    /// limits. Approval reserves the position; the simulator settles
    /// it. Basic-check failures are reported synchronously and never
    /// retried.
    pub fn assess(&self, candidate: &Candidate, now: DateTime<Utc>) -> Assessment {
        let opp = &candidate.opp;

        if opp.is_expired(now) {
            return Assessment {
                approved: false,
                expired: true,
                sized_amount: U256::ZERO,
                sized_amount_quote: Decimal::ZERO,
                score: Decimal::ONE,
                reasons: Vec::new(),
            };
        }

        let snapshot = self.portfolio.snapshot();
        let optimum_quote =
            match u256_to_decimal(opp.trade_amount_in, candidate.quote_decimals) {
                Ok(v) => v,
                Err(e) => {
                    debug!("cannot value optimum in quote: {e}");
                    return self.reject(vec![RejectReason::ResizeUnprofitable]);
                }
            };

        // Fractional Kelly off the opportunity's margin.
        let kelly = if opp.margin > Decimal::ONE {
            (opp.margin - Decimal::ONE) / opp.margin
        } else {
            Decimal::ZERO
        };
        let mut sized_quote = (KELLY_FRACTION * kelly * snapshot.available_capital)
            .clamp(self.min_position_quote, self.max_position_quote)
            .min(optimum_quote);

        // Re-evaluate profit at the sized amount; the detector's profit
        // only holds at its own optimum.
        if sized_quote < optimum_quote {
            match self.net_profit_at(candidate, sized_quote) {
                Some(net) if net >= self.min_profit_quote => {}
                _ => {
                    // Documented fallback: take the detector's optimum
                    // if it fits the position limits, else reject.
                    if optimum_quote >= self.min_position_quote
                        && optimum_quote <= self.max_position_quote
                    {
                        sized_quote = optimum_quote;
                    } else {
                        return self.reject(vec![RejectReason::ResizeUnprofitable]);
                    }
                }
            }
        }

        let sized_raw = match decimal_to_u256(sized_quote, candidate.quote_decimals) {
            Ok(v) => v,
            Err(_) => return self.reject(vec![RejectReason::ResizeUnprofitable]),
        };

        let mut reasons = Vec::new();
        if snapshot.total_exposure() + sized_quote
            > self.max_portfolio_exposure * snapshot.equity
        {
            reasons.push(RejectReason::ExposureCapExceeded);
        }
        if snapshot.daily_loss() >= self.max_daily_loss_quote {
            reasons.push(RejectReason::DailyLossExceeded);
        }
        let potential_loss = sized_quote * self.assumed_loss_fraction;
        if potential_loss > self.max_daily_loss_quote - snapshot.daily_loss() {
            reasons.push(RejectReason::PotentialLossTooLarge);
        }
        if snapshot.active_positions >= self.max_concurrent_positions {
            reasons.push(RejectReason::TooManyPositions);
        }
        if snapshot.drawdown() > self.max_drawdown {
            reasons.push(RejectReason::DrawdownExceeded);
        }
        if self.impact_exceeded_at(candidate, sized_raw) {
            reasons.push(RejectReason::PriceImpactTooHigh);
        }

        let score = self.score(candidate, sized_quote, &snapshot);
        let approved = reasons.is_empty();
        if approved {
            let venue = opp.legs.first().map(|l| l.venue.as_str()).unwrap_or("-");
            self.portfolio.open_position(venue, sized_quote);
        }

        Assessment {
            approved,
            expired: false,
            sized_amount: sized_raw,
            sized_amount_quote: sized_quote,
            score,
            reasons,
        }
    }

    fn reject(&self, reasons: Vec<RejectReason>) -> Assessment {
        Assessment {
            approved: false,
            expired: false,
            sized_amount: U256::ZERO,
            sized_amount_quote: Decimal::ZERO,
            score: Decimal::ONE,
            reasons,
        }
    }

    /// Net profit of the cycle at an arbitrary size, in quote units.
    /// Cycles of three or more legs also pay their cumulative swap
    /// fees, matching the detector's acceptance rule.
    fn net_profit_at(&self, candidate: &Candidate, sized_quote: Decimal) -> Option<Decimal> {
        let sized_raw = decimal_to_u256(sized_quote, candidate.quote_decimals).ok()?;
        if sized_raw.is_zero() {
            return None;
        }
        let outputs = amounts_out(sized_raw, &candidate.leg_pools).ok()?;
        let out = *outputs.last()?;
        let out_quote = u256_to_decimal(out, candidate.quote_decimals).ok()?;
        let mut net = out_quote - sized_quote - candidate.opp.gas_cost_quote;
        if candidate.leg_pools.len() >= 3 {
            let fees = cycle_fee_cost(sized_raw, &outputs, &candidate.leg_pools).ok()?;
            net -= u256_to_decimal(fees, candidate.quote_decimals).ok()?;
        }
        Some(net)
    }

    fn impact_exceeded_at(&self, candidate: &Candidate, sized_raw: U256) -> bool {
        if sized_raw.is_zero() {
            return false;
        }
        let mut input = sized_raw;
        for pool in &candidate.leg_pools {
            match price_impact(input, pool.reserve_in, pool.reserve_out, pool.fee_num, pool.fee_den)
            {
                Ok(impact) if impact <= self.max_price_impact => {}
                _ => return true,
            }
            match crate::math::get_amount_out(
                input,
                pool.reserve_in,
                pool.reserve_out,
                pool.fee_num,
                pool.fee_den,
            ) {
                Ok(out) if !out.is_zero() => input = out,
                _ => return true,
            }
        }
        false
    }

    /// Weighted observability score; clamped to `[0, 1]`.
    fn score(
        &self,
        candidate: &Candidate,
        sized_quote: Decimal,
        snapshot: &PortfolioState,
    ) -> Decimal {
        let opp = &candidate.opp;
        let margin_term = (Decimal::ONE / (Decimal::ONE + opp.margin.max(Decimal::ZERO)))
            .min(Decimal::ONE);
        let min_liquidity = candidate
            .terminal_liquidity_quote
            .0
            .min(candidate.terminal_liquidity_quote.1);
        let liquidity_term = if min_liquidity > Decimal::ZERO {
            (sized_quote / min_liquidity).min(Decimal::ONE)
        } else {
            Decimal::ONE
        };
        let exposure_cap = self.max_portfolio_exposure * snapshot.equity;
        let exposure_term = if exposure_cap > Decimal::ZERO {
            ((snapshot.total_exposure() + sized_quote) / exposure_cap).min(Decimal::ONE)
        } else {
            Decimal::ONE
        };
        let gas_term = if opp.net_profit_quote + opp.gas_cost_quote > Decimal::ZERO {
            (opp.gas_cost_quote / (opp.net_profit_quote + opp.gas_cost_quote)).min(Decimal::ONE)
        } else {
            Decimal::ONE
        };

        let score = dec!(0.3) * margin_term
            + dec!(0.2) * liquidity_term
            + dec!(0.2) * exposure_term
            + dec!(0.2) * gas_term
            + dec!(0.1) * VOLATILITY_TERM;
        score.clamp(Decimal::ZERO, Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PoolSide;
    use crate::types::{
        Leg, Opportunity, OpportunityKind, OpportunityStatus,
    };
    use alloy::primitives::{Address, B256};
    use chrono::Duration as ChronoDuration;

    fn gate(portfolio: Arc<Portfolio>) -> RiskGate {
        RiskGate {
            portfolio,
            min_position_quote: dec!(100),
            max_position_quote: dec!(10000),
            max_portfolio_exposure: dec!(0.5),
            max_daily_loss_quote: dec!(500),
            max_drawdown: dec!(0.2),
            assumed_loss_fraction: dec!(0.1),
            max_concurrent_positions: 3,
            max_price_impact: dec!(0.05),
            min_profit_quote: dec!(10),
        }
    }

    /// A candidate over two deep, favorably-priced pools so profit at
    /// any reasonable size clears the minimum.
    fn candidate(expired: bool) -> Candidate {
        let created_at = Utc::now() - ChronoDuration::seconds(if expired { 60 } else { 0 });
        let expires_at = created_at + ChronoDuration::seconds(30);
        Candidate {
            opp: Opportunity {
                id: "risk-test".to_string(),
                kind: OpportunityKind::TwoLeg,
                legs: vec![
                    Leg {
                        venue: "uniswap".to_string(),
                        token_in: Address::ZERO,
                        token_out: Address::from([1u8; 20]),
                    },
                    Leg {
                        venue: "sushiswap".to_string(),
                        token_in: Address::from([1u8; 20]),
                        token_out: Address::ZERO,
                    },
                ],
                trade_amount_in: U256::from(5_000_000_000u64), // 5000 quote at 6 decimals
                amount_out: U256::from(5_200_000_000u64),
                quote_token: Address::ZERO,
                gross_profit_quote: dec!(200),
                net_profit_quote: dec!(176),
                gas_cost_quote: dec!(24),
                fee_cost_quote: dec!(30),
                margin: dec!(3.2),
                block_number: 100,
                block_hash: B256::ZERO,
                created_at,
                expires_at,
                status: OpportunityStatus::Qualified,
                reject_reasons: vec![],
            },
            leg_pools: vec![
                PoolSide::new(
                    U256::from(2_000_000_000_000u64),
                    U256::from(1_000_000_000_000_000_000_000u128),
                    997,
                    1000,
                ),
                PoolSide::new(
                    U256::from(1_000_000_000_000_000_000_000u128),
                    U256::from(2_200_000_000_000u64),
                    997,
                    1000,
                ),
            ],
            leg_impacts: vec![dec!(0.004), dec!(0.004)],
            terminal_liquidity_quote: (dec!(2000000), dec!(2200000)),
            quote_decimals: 6,
        }
    }

    #[test]
    fn approves_and_reserves_a_position() {
        let portfolio = Arc::new(Portfolio::new(dec!(100000), 0));
        let assessment = gate(portfolio.clone()).assess(&candidate(false), Utc::now());
        assert!(assessment.approved, "reasons: {:?}", assessment.reasons);
        assert!(assessment.sized_amount_quote >= dec!(100));
        assert!(assessment.sized_amount_quote <= dec!(5000));
        assert!(assessment.score >= Decimal::ZERO && assessment.score <= Decimal::ONE);
        let snapshot = portfolio.snapshot();
        assert_eq!(snapshot.active_positions, 1);
        assert_eq!(snapshot.total_exposure(), assessment.sized_amount_quote);
    }

    #[test]
    fn expired_opportunities_drop_silently() {
        let portfolio = Arc::new(Portfolio::new(dec!(100000), 0));
        let assessment = gate(portfolio).assess(&candidate(true), Utc::now());
        assert!(assessment.expired);
        assert!(!assessment.approved);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn sizing_never_exceeds_the_detector_optimum() {
        let portfolio = Arc::new(Portfolio::new(dec!(100000000), 0));
        let assessment = gate(portfolio).assess(&candidate(false), Utc::now());
        // Optimum is 5000 quote units; huge capital must not push past it.
        assert!(assessment.sized_amount_quote <= dec!(5000));
    }

    #[test]
    fn concurrent_position_cap_rejects() {
        let portfolio = Arc::new(Portfolio::new(dec!(100000), 0));
        for _ in 0..3 {
            portfolio.open_position("uniswap", dec!(10));
        }
        let assessment = gate(portfolio).assess(&candidate(false), Utc::now());
        assert!(!assessment.approved);
        assert!(assessment.reasons.contains(&RejectReason::TooManyPositions));
    }

    #[test]
    fn daily_loss_cap_rejects() {
        let portfolio = Arc::new(Portfolio::new(dec!(100000), 0));
        portfolio.open_position("uniswap", dec!(100));
        portfolio.settle_position("uniswap", dec!(100), dec!(-600));
        let assessment = gate(portfolio).assess(&candidate(false), Utc::now());
        assert!(!assessment.approved);
        assert!(assessment.reasons.contains(&RejectReason::DailyLossExceeded));
    }

    #[test]
    fn drawdown_cap_rejects() {
        let portfolio = Arc::new(Portfolio::new(dec!(100000), 0));
        // Lose 25% of equity: drawdown 0.25 > 0.2 cap.
        portfolio.open_position("uniswap", dec!(1000));
        portfolio.settle_position("uniswap", dec!(1000), dec!(-25000));
        let gate = RiskGate {
            max_daily_loss_quote: dec!(1000000),
            ..gate(portfolio)
        };
        let assessment = gate.assess(&candidate(false), Utc::now());
        assert!(!assessment.approved);
        assert!(assessment.reasons.contains(&RejectReason::DrawdownExceeded));
    }
}
