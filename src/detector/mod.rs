//! Two-leg and triangular arbitrage detection

pub mod two_leg;
pub mod triangular;

use alloy::primitives::B256;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::PairCache;
use crate::errors::{ScanError, ScanResult};
use crate::math::{amounts_out, cycle_fee_cost, price_impact, PoolSide, SizedTrade};
use crate::types::{
    Cycle, Freshness, Leg, MonitoredPair, Opportunity, OpportunityKind, OpportunityStatus,
    PairKey, ReserveSnapshot, TokenRegistry, VenueSet,
};
use crate::utils::u256_to_decimal;

/// Per-tick inputs shared by every candidate of one detection pass.
#[derive(Debug, Clone)]
pub struct DetectionContext {
    pub block_number: u64,
    pub block_hash: B256,
    /// Gas cost of the whole cycle, in quote units, per kind.
    pub gas_cost_two_leg_quote: Decimal,
    pub gas_cost_triangular_quote: Decimal,
}

/// A detected opportunity plus the data downstream filters need to
/// re-evaluate it at other sizes without another cache read.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub opp: Opportunity,
    pub leg_pools: Vec<PoolSide>,
    pub leg_impacts: Vec<Decimal>,
    /// Quote-side reserves of the first and last pool of the cycle.
    pub terminal_liquidity_quote: (Decimal, Decimal),
    pub quote_decimals: u8,
}

/// Result of one detection pass.
#[derive(Debug, Default)]
pub struct Detection {
    pub candidates: Vec<Candidate>,
    /// Pools whose reserves this pass wants re-read next block.
    pub impacted: Vec<PairKey>,
}

pub struct Detector {
    cache: Arc<PairCache>,
    venues: Arc<VenueSet>,
    tokens: TokenRegistry,
    monitored: Vec<MonitoredPair>,
    cycles: Vec<Cycle>,
    min_margin: Decimal,
    max_position_size_quote: Decimal,
    max_block_skew: u64,
    opportunity_timeout_secs: u64,
}

impl Detector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<PairCache>,
        venues: Arc<VenueSet>,
        tokens: TokenRegistry,
        monitored: Vec<MonitoredPair>,
        cycles: Vec<Cycle>,
        min_margin: Decimal,
        max_position_size_quote: Decimal,
        max_block_skew: u64,
        opportunity_timeout_secs: u64,
    ) -> Self {
        Self {
            cache,
            venues,
            tokens,
            monitored,
            cycles,
            min_margin,
            max_position_size_quote,
            max_block_skew,
            opportunity_timeout_secs,
        }
    }

    /// Runs both searches over the current snapshots. Deterministic:
    /// identical snapshots and configuration produce the same ordered
    /// candidates with the same ids.
    pub fn detect(&self, ctx: &DetectionContext) -> Detection {
        let mut candidates = Vec::new();
        let mut impacted: Vec<PairKey> = Vec::new();

        self.detect_two_leg(ctx, &mut candidates, &mut impacted);
        self.detect_triangular(ctx, &mut candidates, &mut impacted);

        // Overlap tie-break: largest net profit, then smallest amount,
        // then lexicographically smallest venue path.
        candidates.sort_by(|a, b| {
            b.opp
                .net_profit_quote
                .cmp(&a.opp.net_profit_quote)
                .then(a.opp.trade_amount_in.cmp(&b.opp.trade_amount_in))
                .then(a.opp.venue_path().cmp(&b.opp.venue_path()))
        });

        // Keep one candidate per involved pool set.
        let mut seen_pools: HashSet<Vec<PairKey>> = HashSet::new();
        candidates.retain(|candidate| {
            let mut pools: Vec<PairKey> = candidate
                .opp
                .legs
                .iter()
                .map(|leg| PairKey::new(leg.venue.clone(), leg.token_in, leg.token_out))
                .collect();
            pools.sort();
            seen_pools.insert(pools)
        });

        for (sequence, candidate) in candidates.iter_mut().enumerate() {
            candidate.opp.id = Opportunity::id_for(
                candidate.opp.kind,
                &candidate.opp.legs,
                ctx.block_number,
                sequence as u32,
            );
        }

        impacted.sort();
        impacted.dedup();
        Detection {
            candidates,
            impacted,
        }
    }

    /// A snapshot usable for detection at this block: present, not
    /// dead, and within the block-skew window of the run.
    fn usable_snapshot(
        &self,
        key: &PairKey,
        block_number: u64,
    ) -> Option<Arc<ReserveSnapshot>> {
        let (snapshot, freshness) = self.cache.snapshot(key)?;
        if freshness == Freshness::Dead {
            return None;
        }
        let skew = block_number.saturating_sub(snapshot.block_number);
        if skew > self.max_block_skew {
            return None;
        }
        Some(snapshot)
    }

    /// Assembles the full candidate record from a sized trade.
    #[allow(clippy::too_many_arguments)]
    fn build_candidate(
        &self,
        kind: OpportunityKind,
        legs: Vec<Leg>,
        pools: Vec<PoolSide>,
        trade: &SizedTrade,
        gas_cost_quote: Decimal,
        quote: alloy::primitives::Address,
        ctx: &DetectionContext,
    ) -> ScanResult<Candidate> {
        let quote_decimals = self.tokens.decimals(&quote)?;
        let hop_outputs = amounts_out(trade.amount_in, &pools)?;

        if trade.net_profit.is_negative() {
            return Err(ScanError::invalid_input("candidate with negative profit"));
        }
        let net_profit_quote = u256_to_decimal(trade.net_profit.unsigned_abs(), quote_decimals)?;
        let gross_profit_quote =
            u256_to_decimal(trade.amount_out - trade.amount_in, quote_decimals)?;
        let fee_raw = cycle_fee_cost(trade.amount_in, &hop_outputs, &pools)?;
        let fee_cost_quote = u256_to_decimal(fee_raw, quote_decimals)?;
        let margin = net_profit_quote / (gas_cost_quote + fee_cost_quote).max(Decimal::ONE);

        let mut leg_impacts = Vec::with_capacity(pools.len());
        for (i, pool) in pools.iter().enumerate() {
            let input = if i == 0 {
                trade.amount_in
            } else {
                hop_outputs[i - 1]
            };
            leg_impacts.push(price_impact(
                input,
                pool.reserve_in,
                pool.reserve_out,
                pool.fee_num,
                pool.fee_den,
            )?);
        }

        let terminal_liquidity_quote = (
            u256_to_decimal(pools[0].reserve_in, quote_decimals)?,
            u256_to_decimal(pools[pools.len() - 1].reserve_out, quote_decimals)?,
        );

        let created_at = Utc::now();
        let expires_at = created_at + ChronoDuration::seconds(self.opportunity_timeout_secs as i64);

        Ok(Candidate {
            opp: Opportunity {
                id: String::new(),
                kind,
                legs,
                trade_amount_in: trade.amount_in,
                amount_out: trade.amount_out,
                quote_token: quote,
                gross_profit_quote,
                net_profit_quote,
                gas_cost_quote,
                fee_cost_quote,
                margin,
                block_number: ctx.block_number,
                block_hash: ctx.block_hash,
                created_at,
                expires_at,
                status: OpportunityStatus::Detected,
                reject_reasons: Vec::new(),
            },
            leg_pools: pools,
            leg_impacts,
            terminal_liquidity_quote,
            quote_decimals,
        })
    }

    pub(crate) fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }
}

