//! Display and printing utilities

use tracing::{info, warn};

use crate::types::{ExecutionStatus, Opportunity, Stats, TokenRegistry, TradeExecution};

pub fn print_opportunity(opportunity: &Opportunity, tokens: &TokenRegistry) {
    warn!("\n🎯 ARBITRAGE OPPORTUNITY {}", opportunity.id);
    warn!("📍 Kind: {} | Block: {}", opportunity.kind, opportunity.block_number);
    let route: Vec<String> = opportunity
        .legs
        .iter()
        .map(|leg| {
            format!(
                "{} {}→{}",
                leg.venue,
                tokens.symbol(&leg.token_in),
                tokens.symbol(&leg.token_out)
            )
        })
        .collect();
    warn!("📋 Route: {}", route.join(" | "));
    warn!("💰 Profit Analysis:");
    warn!("   Gross Profit: {:.4} {}", opportunity.gross_profit_quote, tokens.symbol(&opportunity.quote_token));
    warn!("   Gas Cost: {:.4}", opportunity.gas_cost_quote);
    warn!("   Fee Cost: {:.4}", opportunity.fee_cost_quote);
    warn!("   Net Profit: {:.4}", opportunity.net_profit_quote);
    warn!("   Margin: {:.4}", opportunity.margin);
}

pub fn print_execution(execution: &TradeExecution) {
    let status = match execution.status {
        ExecutionStatus::Simulated => "✅ SIMULATED",
        ExecutionStatus::Failed => "❌ FAILED",
    };
    info!("\n🎭 Trade Execution {}", execution.id);
    info!("   Status: {}", status);
    info!("   Route: {}", execution.venue_path);
    info!("   Expected Profit: {:.4}", execution.expected_profit_quote);
    if let Some(actual) = execution.actual_profit_quote {
        info!("   Actual Profit: {:.4}", actual);
    }
    if let Some(slippage) = execution.slippage_bps {
        info!("   Slippage: {} bps", slippage);
    }
    if let Some(err) = &execution.error_message {
        info!("   Error: {}", err);
    }
    info!("   Execution time: {}ms", execution.execution_time_ms);
}

pub fn print_session_stats(stats: &Stats) {
    let uptime_min = stats.uptime_seconds(chrono::Utc::now()) / 60;

    info!("\n📊 Session Statistics ({} minutes)", uptime_min);
    info!("   📈 DETECTION:");
    info!("     Two-leg detected: {}", stats.detected_two_leg);
    info!("     Triangular detected: {}", stats.detected_triangular);
    info!("     Qualified: {}", stats.qualified_two_leg + stats.qualified_triangular);
    info!("     Rejected: {}", stats.rejected);
    info!("     Cumulative net profit: {:.2}", stats.cumulative_net_profit_quote);
    info!("   🚀 SIMULATION:");
    info!("     Approved: {}", stats.approved);
    info!("     Executions simulated: {}", stats.simulated_executions);
    info!("   ⚙️  SYSTEM:");
    info!("     Ticks: {} ({} skipped on high gas)", stats.ticks, stats.ticks_skipped_high_gas);
    info!("     Last block processed: {}", stats.last_block_processed);
    if stats.dropped_rejected + stats.dropped_qualified > 0 {
        info!(
            "     Backpressure drops: {} rejected, {} qualified",
            stats.dropped_rejected, stats.dropped_qualified
        );
    }
    info!("");
}
