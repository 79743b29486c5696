//! Trade execution simulation
//!
//! Consumes approved opportunities on its own task and produces
//! realistic post-trade telemetry. Nothing here touches the chain; the
//! only side effects are records and simulated portfolio fills.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use crate::api::ApiState;
use crate::qualifier::gas_estimate;
use crate::risk::Assessment;
use crate::storage::{ExecutionRecord, StorageChannel};
use crate::types::{
    ExecutionStatus, Opportunity, OpportunityStatus, Portfolio, TradeExecution,
};
use crate::utils::print_execution;

const BASE_LATENCY_MS: u64 = 100;
const LATENCY_JITTER_MS: u64 = 150;
const SUCCESS_RATE: f64 = 0.90;
const BASE_SLIPPAGE_BPS: u32 = 25;
const SLIPPAGE_JITTER_BPS: u32 = 50;

/// Work item handed to the simulator: the qualified opportunity, its
/// approved sizing, and the gas price seen at approval time.
pub struct SimulationRequest {
    pub opportunity: Opportunity,
    pub assessment: Assessment,
    pub gas_price_gwei: Decimal,
}

pub struct ExecutionSimulator {
    portfolio: Arc<Portfolio>,
    storage: StorageChannel,
    api: ApiState,
}

impl ExecutionSimulator {
    pub fn new(portfolio: Arc<Portfolio>, storage: StorageChannel, api: ApiState) -> Self {
        Self {
            portfolio,
            storage,
            api,
        }
    }

    /// Drains simulation requests until the channel closes. Runs in an
    /// independent task and never interleaves with detection.
    pub async fn run(self, mut rx: mpsc::Receiver<SimulationRequest>) {
        while let Some(request) = rx.recv().await {
            let execution = self.simulate(&request).await;
            print_execution(&execution);

            let venue = request
                .opportunity
                .legs
                .first()
                .map(|l| l.venue.clone())
                .unwrap_or_default();
            let realized = match execution.status {
                ExecutionStatus::Simulated => execution
                    .actual_profit_quote
                    .unwrap_or(Decimal::ZERO),
                // A failed trade still burns the gas it bid.
                ExecutionStatus::Failed => -request.opportunity.gas_cost_quote,
            };
            self.portfolio
                .settle_position(&venue, request.assessment.sized_amount_quote, realized);

            self.storage.record_execution(ExecutionRecord::from(&execution));
            self.api.record_execution();
            if execution.status == ExecutionStatus::Simulated {
                self.api.set_opportunity_status(
                    &request.opportunity.id,
                    OpportunityStatus::SimulatedExecuted,
                );
            }
        }
        info!("🎭 Execution simulator drained, exiting");
    }

    async fn simulate(&self, request: &SimulationRequest) -> TradeExecution {
        let started = Instant::now();
        let opportunity = &request.opportunity;

        // Model network latency.
        let latency = BASE_LATENCY_MS + (rand::random::<u64>() % LATENCY_JITTER_MS);
        tokio::time::sleep(Duration::from_millis(latency)).await;

        let succeeded = rand::random::<f64>() < SUCCESS_RATE;
        let slippage_bps = BASE_SLIPPAGE_BPS + (rand::random::<u32>() % SLIPPAGE_JITTER_BPS);
        let slippage_factor = Decimal::ONE - Decimal::from(slippage_bps) / dec!(10000);

        // Profit scaled to the sized amount, then shaved by slippage.
        let expected = self.expected_profit_at_size(request);
        let actual = expected * slippage_factor;

        info!(
            "🎭 Simulated execution: success={succeeded}, slippage={slippage_bps}bps, latency={latency}ms"
        );

        TradeExecution {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_id: opportunity.id.clone(),
            timestamp: Utc::now(),
            venue_path: opportunity.venue_path(),
            status: if succeeded {
                ExecutionStatus::Simulated
            } else {
                ExecutionStatus::Failed
            },
            tx_hash: if succeeded {
                Some(format!("0x{}", uuid::Uuid::new_v4().simple()))
            } else {
                None
            },
            gas_used: gas_estimate(opportunity.kind),
            gas_price_gwei: request.gas_price_gwei,
            execution_time_ms: started.elapsed().as_millis() as u64,
            sized_amount_quote: request.assessment.sized_amount_quote,
            expected_profit_quote: expected,
            actual_profit_quote: if succeeded { Some(actual) } else { None },
            slippage_bps: if succeeded { Some(slippage_bps) } else { None },
            error_message: if succeeded {
                None
            } else {
                Some("simulated revert: reserves moved against the trade".to_string())
            },
        }
    }

    /// Linear scale of the detected profit down to the gated size; the
    /// curve is concave so this slightly overstates, which the slippage
    /// haircut then erodes.
    fn expected_profit_at_size(&self, request: &SimulationRequest) -> Decimal {
        let opportunity = &request.opportunity;
        let sized = request.assessment.sized_amount_quote;
        let optimum = crate::utils::u256_to_decimal(
            opportunity.trade_amount_in,
            self.api.quote_decimals(&opportunity.quote_token).unwrap_or(18),
        )
        .unwrap_or(sized);
        if optimum.is_zero() {
            return opportunity.net_profit_quote;
        }
        opportunity.net_profit_quote * (sized / optimum).min(Decimal::ONE)
    }
}
