//! Flat row representations for the store

use crate::types::{Opportunity, ReserveSnapshot, TradeExecution};

/// One row of the `opportunities` table. Decimal and big-integer
/// columns are stored as text to keep them exact.
#[derive(Debug, Clone)]
pub struct OpportunityRecord {
    pub id: String,
    pub kind: String,
    pub pair_path: String,
    pub venue_path: String,
    pub trade_amount_in: String,
    pub gross_profit_quote: String,
    pub net_profit_quote: String,
    pub gas_cost_quote: String,
    pub fee_cost_quote: String,
    pub margin: String,
    pub status: String,
    pub reason: String,
    pub block_number: i64,
    pub block_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl From<&Opportunity> for OpportunityRecord {
    fn from(opp: &Opportunity) -> Self {
        Self {
            id: opp.id.clone(),
            kind: opp.kind.as_str().to_string(),
            pair_path: opp.pair_path(),
            venue_path: opp.venue_path(),
            trade_amount_in: opp.trade_amount_in.to_string(),
            gross_profit_quote: opp.gross_profit_quote.to_string(),
            net_profit_quote: opp.net_profit_quote.to_string(),
            gas_cost_quote: opp.gas_cost_quote.to_string(),
            fee_cost_quote: opp.fee_cost_quote.to_string(),
            margin: opp.margin.to_string(),
            status: opp.status.as_str().to_string(),
            reason: opp
                .reject_reasons
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(","),
            block_number: opp.block_number as i64,
            block_hash: format!("{:#x}", opp.block_hash),
            created_at: opp.created_at.timestamp(),
            expires_at: opp.expires_at.timestamp(),
        }
    }
}

/// One row of the `price_history` table, appended at refresh time when
/// history recording is enabled. Also serialized directly by the
/// `/prices` endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PriceHistoryRecord {
    pub pair: String,
    pub venue: String,
    pub reserve0: String,
    pub reserve1: String,
    pub block_number: i64,
    pub observed_at: i64,
}

impl From<&ReserveSnapshot> for PriceHistoryRecord {
    fn from(snapshot: &ReserveSnapshot) -> Self {
        Self {
            pair: format!(
                "{:#x}/{:#x}",
                snapshot.pair.token0, snapshot.pair.token1
            ),
            venue: snapshot.pair.venue.clone(),
            reserve0: snapshot.reserve0.to_string(),
            reserve1: snapshot.reserve1.to_string(),
            block_number: snapshot.block_number as i64,
            observed_at: snapshot.observed_at.timestamp(),
        }
    }
}

/// One row of the `executions` table (simulated fills).
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub id: String,
    pub opportunity_id: String,
    pub venue_path: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub gas_used: i64,
    pub gas_price_gwei: String,
    pub execution_time_ms: i64,
    pub sized_amount_quote: String,
    pub expected_profit_quote: String,
    pub actual_profit_quote: Option<String>,
    pub slippage_bps: Option<i64>,
    pub error_message: Option<String>,
    pub timestamp: i64,
}

impl From<&TradeExecution> for ExecutionRecord {
    fn from(exec: &TradeExecution) -> Self {
        Self {
            id: exec.id.clone(),
            opportunity_id: exec.opportunity_id.clone(),
            venue_path: exec.venue_path.clone(),
            status: match exec.status {
                crate::types::ExecutionStatus::Simulated => "simulated".to_string(),
                crate::types::ExecutionStatus::Failed => "failed".to_string(),
            },
            tx_hash: exec.tx_hash.clone(),
            gas_used: exec.gas_used as i64,
            gas_price_gwei: exec.gas_price_gwei.to_string(),
            execution_time_ms: exec.execution_time_ms as i64,
            sized_amount_quote: exec.sized_amount_quote.to_string(),
            expected_profit_quote: exec.expected_profit_quote.to_string(),
            actual_profit_quote: exec.actual_profit_quote.map(|d| d.to_string()),
            slippage_bps: exec.slippage_bps.map(|s| s as i64),
            error_message: exec.error_message.clone(),
            timestamp: exec.timestamp.timestamp(),
        }
    }
}
