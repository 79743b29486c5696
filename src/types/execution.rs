//! Simulated trade execution telemetry

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Simulated,
    Failed,
}

/// Post-trade telemetry produced by the execution simulator. No real
/// transaction exists behind these records.
#[derive(Debug, Clone, Serialize)]
pub struct TradeExecution {
    pub id: String,
    pub opportunity_id: String,
    pub timestamp: DateTime<Utc>,
    pub venue_path: String,
    pub status: ExecutionStatus,
    pub tx_hash: Option<String>,
    pub gas_used: u64,
    pub gas_price_gwei: Decimal,
    pub execution_time_ms: u64,
    pub sized_amount_quote: Decimal,
    pub expected_profit_quote: Decimal,
    pub actual_profit_quote: Option<Decimal>,
    pub slippage_bps: Option<u32>,
    pub error_message: Option<String>,
}
