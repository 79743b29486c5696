//! Arbitrage opportunity records

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Shape of the detected cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    TwoLeg,
    Triangular,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::TwoLeg => "two_leg",
            OpportunityKind::Triangular => "triangular",
        }
    }
}

impl std::fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hop of the cycle: swap `token_in` for `token_out` on `venue`.
#[derive(Debug, Clone, Serialize)]
pub struct Leg {
    pub venue: String,
    pub token_in: Address,
    pub token_out: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Detected,
    Qualified,
    Rejected,
    Expired,
    SimulatedExecuted,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Detected => "detected",
            OpportunityStatus::Qualified => "qualified",
            OpportunityStatus::Rejected => "rejected",
            OpportunityStatus::Expired => "expired",
            OpportunityStatus::SimulatedExecuted => "simulated_executed",
        }
    }
}

/// Reason codes for qualifier and risk-gate rejections. These are
/// structured data on the record, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BelowMinProfit,
    BelowMinMargin,
    InsufficientLiquidity,
    PriceImpactTooHigh,
    GasPriceTooHigh,
    SafetyMarginShortfall,
    StaleData,
    ExposureCapExceeded,
    DailyLossExceeded,
    PotentialLossTooLarge,
    TooManyPositions,
    DrawdownExceeded,
    ResizeUnprofitable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BelowMinProfit => "below_min_profit",
            RejectReason::BelowMinMargin => "below_min_margin",
            RejectReason::InsufficientLiquidity => "insufficient_liquidity",
            RejectReason::PriceImpactTooHigh => "price_impact_too_high",
            RejectReason::GasPriceTooHigh => "gas_price_too_high",
            RejectReason::SafetyMarginShortfall => "safety_margin_shortfall",
            RejectReason::StaleData => "stale_data",
            RejectReason::ExposureCapExceeded => "exposure_cap_exceeded",
            RejectReason::DailyLossExceeded => "daily_loss_exceeded",
            RejectReason::PotentialLossTooLarge => "potential_loss_too_large",
            RejectReason::TooManyPositions => "too_many_positions",
            RejectReason::DrawdownExceeded => "drawdown_exceeded",
            RejectReason::ResizeUnprofitable => "resize_unprofitable",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable arbitrage opportunity record. Profit figures are in the
/// cycle's declared quote token; raw amounts are integer units of the
/// first leg's input token.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: String,
    pub kind: OpportunityKind,
    pub legs: Vec<Leg>,
    #[serde(serialize_with = "serialize_u256")]
    pub trade_amount_in: U256,
    #[serde(serialize_with = "serialize_u256")]
    pub amount_out: U256,
    pub quote_token: Address,
    pub gross_profit_quote: Decimal,
    pub net_profit_quote: Decimal,
    pub gas_cost_quote: Decimal,
    pub fee_cost_quote: Decimal,
    /// `net_profit / max(1, gas_cost + fee_cost)`.
    pub margin: Decimal,
    pub block_number: u64,
    pub block_hash: B256,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OpportunityStatus,
    pub reject_reasons: Vec<RejectReason>,
}

impl Opportunity {
    /// Deterministic id prefix from the cycle identity; the orchestrator
    /// appends a per-block sequence number in emission order.
    pub fn id_for(
        kind: OpportunityKind,
        legs: &[Leg],
        block_number: u64,
        sequence: u32,
    ) -> String {
        let venue_path: Vec<&str> = legs.iter().map(|l| l.venue.as_str()).collect();
        let mut token_path: Vec<String> = legs.iter().map(|l| format!("{:#x}", l.token_in)).collect();
        if let Some(last) = legs.last() {
            token_path.push(format!("{:#x}", last.token_out));
        }
        format!(
            "{}:{}:{}:{}:{:02}",
            kind.as_str(),
            venue_path.join(">"),
            token_path.join(">"),
            block_number,
            sequence
        )
    }

    pub fn venue_path(&self) -> String {
        self.legs
            .iter()
            .map(|l| l.venue.as_str())
            .collect::<Vec<_>>()
            .join(">")
    }

    pub fn pair_path(&self) -> String {
        let mut path: Vec<String> = self.legs.iter().map(|l| format!("{:#x}", l.token_in)).collect();
        if let Some(last) = self.legs.last() {
            path.push(format!("{:#x}", last.token_out));
        }
        path.join(">")
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn serialize_u256<S: serde::Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&value.to_string())
}
