//! Scanner statistics counters

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use super::OpportunityKind;

/// Counters reflecting the last completed tick. Updated serially by the
/// orchestrator, read by the statistics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub ticks_skipped_high_gas: u64,
    pub detected_two_leg: u64,
    pub detected_triangular: u64,
    pub qualified_two_leg: u64,
    pub qualified_triangular: u64,
    pub rejected: u64,
    pub approved: u64,
    pub simulated_executions: u64,
    pub cumulative_net_profit_quote: Decimal,
    pub per_venue: HashMap<String, u64>,
    pub dropped_rejected: u64,
    pub dropped_qualified: u64,
    pub last_block_processed: u64,
}

impl Stats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ticks: 0,
            ticks_skipped_high_gas: 0,
            detected_two_leg: 0,
            detected_triangular: 0,
            qualified_two_leg: 0,
            qualified_triangular: 0,
            rejected: 0,
            approved: 0,
            simulated_executions: 0,
            cumulative_net_profit_quote: Decimal::ZERO,
            per_venue: HashMap::new(),
            dropped_rejected: 0,
            dropped_qualified: 0,
            last_block_processed: 0,
        }
    }

    pub fn record_detected(&mut self, kind: OpportunityKind) {
        match kind {
            OpportunityKind::TwoLeg => self.detected_two_leg += 1,
            OpportunityKind::Triangular => self.detected_triangular += 1,
        }
    }

    pub fn record_qualified(&mut self, kind: OpportunityKind, net_profit: Decimal, venues: &[String]) {
        match kind {
            OpportunityKind::TwoLeg => self.qualified_two_leg += 1,
            OpportunityKind::Triangular => self.qualified_triangular += 1,
        }
        self.cumulative_net_profit_quote += net_profit;
        for venue in venues {
            *self.per_venue.entry(venue.clone()).or_default() += 1;
        }
    }

    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds()
    }
}
