//! Triangular cycle detection across venue assignments

use alloy::primitives::{Address, I256};
use tracing::debug;

use crate::math::{optimal_cycle_size, PoolSide};
use crate::types::{Leg, OpportunityKind, PairKey};
use crate::utils::decimal_to_u256;

use super::{Candidate, DetectionContext, Detector};

impl Detector {
    /// For each configured 3-token cycle, both traversal directions and
    /// every venue assignment with at least two distinct venues are
    /// sized with a coarse geometric probe followed by ternary search.
    pub(crate) fn detect_triangular(
        &self,
        ctx: &DetectionContext,
        candidates: &mut Vec<Candidate>,
        impacted: &mut Vec<PairKey>,
    ) {
        let venues: Vec<_> = self.venues.iter().collect();

        for cycle in &self.cycles {
            // Traverse starting and ending at the cycle's quote token.
            let start = cycle
                .tokens
                .iter()
                .position(|t| *t == cycle.quote)
                .unwrap_or(0);
            let q = cycle.tokens[start];
            let x = cycle.tokens[(start + 1) % 3];
            let y = cycle.tokens[(start + 2) % 3];

            for token_route in [[q, x, y, q], [q, y, x, q]] {
                for v1 in 0..venues.len() {
                    for v2 in 0..venues.len() {
                        for v3 in 0..venues.len() {
                            if v1 == v2 && v2 == v3 {
                                continue;
                            }
                            self.try_cycle(
                                ctx,
                                &token_route,
                                [venues[v1], venues[v2], venues[v3]],
                                cycle.quote,
                                candidates,
                                impacted,
                            );
                        }
                    }
                }
            }
        }
    }

    fn try_cycle(
        &self,
        ctx: &DetectionContext,
        route: &[Address; 4],
        venues: [&crate::types::Venue; 3],
        quote: Address,
        candidates: &mut Vec<Candidate>,
        impacted: &mut Vec<PairKey>,
    ) {
        let mut pools = Vec::with_capacity(3);
        let mut keys = Vec::with_capacity(3);
        let mut legs = Vec::with_capacity(3);

        for (i, venue) in venues.iter().enumerate() {
            let token_in = route[i];
            let token_out = route[i + 1];
            let key = PairKey::new(venue.name.clone(), token_in, token_out);
            let Some(snapshot) = self.usable_snapshot(&key, ctx.block_number) else {
                return;
            };
            let Some((reserve_in, reserve_out)) = snapshot.oriented(&token_in) else {
                return;
            };
            pools.push(PoolSide::new(
                reserve_in,
                reserve_out,
                venue.fee_num,
                venue.fee_den,
            ));
            keys.push(key);
            legs.push(Leg {
                venue: venue.name.clone(),
                token_in,
                token_out,
            });
        }

        let Ok(quote_decimals) = self.tokens().decimals(&quote) else {
            return;
        };
        let Ok(max_in) = decimal_to_u256(self.max_position_size_quote, quote_decimals) else {
            return;
        };
        let Ok(gas_raw) = decimal_to_u256(ctx.gas_cost_triangular_quote, quote_decimals) else {
            return;
        };

        let trade = match optimal_cycle_size(&pools, max_in, gas_raw) {
            Ok(Some(trade)) if trade.net_profit > I256::ZERO => trade,
            Ok(_) => return,
            Err(e) => {
                debug!("cycle sizing failed: {e}");
                return;
            }
        };

        match self.build_candidate(
            OpportunityKind::Triangular,
            legs,
            pools,
            &trade,
            ctx.gas_cost_triangular_quote,
            quote,
            ctx,
        ) {
            Ok(candidate) => {
                impacted.extend(keys);
                candidates.push(candidate);
            }
            Err(e) => debug!("triangular candidate assembly failed: {e}"),
        }
    }
}
