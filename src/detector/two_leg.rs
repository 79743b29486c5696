//! Cross-venue two-leg detection

use tracing::debug;

use crate::math::{optimal_two_leg_size, PoolSide, Ratio};
use crate::types::{Leg, OpportunityKind, PairKey};
use crate::utils::decimal_to_u256;

use super::{Candidate, DetectionContext, Detector};

impl Detector {
    /// For every monitored pair and every venue combination, compare
    /// spot prices in exact rationals and size the round trip when the
    /// gap clears the margin pre-filter.
    pub(crate) fn detect_two_leg(
        &self,
        ctx: &DetectionContext,
        candidates: &mut Vec<Candidate>,
        impacted: &mut Vec<PairKey>,
    ) {
        let min_margin = match Ratio::from_decimal(self.min_margin) {
            Ok(ratio) => ratio,
            Err(e) => {
                debug!("min_margin is not a valid ratio: {e}");
                return;
            }
        };
        let venues: Vec<_> = self.venues.iter().collect();

        for pair in &self.monitored {
            for i in 0..venues.len() {
                for j in (i + 1)..venues.len() {
                    let (v1, v2) = (venues[i], venues[j]);
                    let key1 = PairKey::new(v1.name.clone(), pair.base, pair.quote);
                    let key2 = PairKey::new(v2.name.clone(), pair.base, pair.quote);

                    let Some(snap1) = self.usable_snapshot(&key1, ctx.block_number) else {
                        continue;
                    };
                    let Some(snap2) = self.usable_snapshot(&key2, ctx.block_number) else {
                        continue;
                    };

                    // Spot price of the base token in quote units.
                    let Some(base1) = snap1.reserve_of(&pair.base) else { continue };
                    let Some(quote1) = snap1.reserve_of(&pair.quote) else { continue };
                    let Some(base2) = snap2.reserve_of(&pair.base) else { continue };
                    let Some(quote2) = snap2.reserve_of(&pair.quote) else { continue };
                    let (Ok(p1), Ok(p2)) = (Ratio::new(quote1, base1), Ratio::new(quote2, base2))
                    else {
                        continue;
                    };

                    let Ok(gap) = Ratio::relative_gap(&p1, &p2) else { continue };
                    if gap.lt(&min_margin) {
                        continue;
                    }

                    // Buy where the base is cheaper, sell where it is dearer.
                    let (buy_snap, sell_snap, buy_venue, sell_venue) = if p1.lt(&p2) {
                        (&snap1, &snap2, v1, v2)
                    } else {
                        (&snap2, &snap1, v2, v1)
                    };

                    let Some((buy_in, buy_out)) = buy_snap.oriented(&pair.quote) else {
                        continue;
                    };
                    let Some((sell_in, sell_out)) = sell_snap.oriented(&pair.base) else {
                        continue;
                    };
                    let buy_pool = PoolSide::new(buy_in, buy_out, buy_venue.fee_num, buy_venue.fee_den);
                    let sell_pool =
                        PoolSide::new(sell_in, sell_out, sell_venue.fee_num, sell_venue.fee_den);

                    let Ok(quote_decimals) = self.tokens().decimals(&pair.quote) else {
                        continue;
                    };
                    let Ok(max_in) = decimal_to_u256(self.max_position_size_quote, quote_decimals)
                    else {
                        continue;
                    };
                    let Ok(gas_raw) = decimal_to_u256(ctx.gas_cost_two_leg_quote, quote_decimals)
                    else {
                        continue;
                    };

                    let trade = match optimal_two_leg_size(&buy_pool, &sell_pool, max_in, gas_raw) {
                        Ok(Some(trade)) if trade.net_profit > alloy::primitives::I256::ZERO => trade,
                        Ok(_) => continue,
                        Err(e) => {
                            debug!("sizing failed for {key1}/{key2}: {e}");
                            continue;
                        }
                    };

                    let legs = vec![
                        Leg {
                            venue: buy_venue.name.clone(),
                            token_in: pair.quote,
                            token_out: pair.base,
                        },
                        Leg {
                            venue: sell_venue.name.clone(),
                            token_in: pair.base,
                            token_out: pair.quote,
                        },
                    ];
                    match self.build_candidate(
                        OpportunityKind::TwoLeg,
                        legs,
                        vec![buy_pool, sell_pool],
                        &trade,
                        ctx.gas_cost_two_leg_quote,
                        pair.quote,
                        ctx,
                    ) {
                        Ok(candidate) => {
                            // These reserves are exactly what the next
                            // block needs to re-check.
                            impacted.push(key1.clone());
                            impacted.push(key2.clone());
                            candidates.push(candidate);
                        }
                        Err(e) => debug!("candidate assembly failed: {e}"),
                    }
                }
            }
        }
    }
}
