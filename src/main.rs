//! dex-arb-scanner - Main entry point
//!
//! Read-only arbitrage scanner: detects, qualifies, and simulates
//! constant-product DEX opportunities. Never submits a transaction.

use dex_arb_scanner::*;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};

use dex_arb_scanner::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Load configuration first; logging and directories are driven by
    // it, and any problem here is fatal with exit code 1.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    let _logging_guard = match utils::setup_logging(&config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = utils::setup_output_directories(&config.log_dir, &config.store_path) {
        error!("Failed to create output directories: {e}");
        return ExitCode::from(1);
    }

    info!("🔍 dex-arb-scanner v0.5.0 - DEX Arbitrage Opportunity Scanner");
    info!("📋 Configuration:");
    info!("   Endpoints: {}", config.endpoints.len());
    info!("   Venues: {}", config.venues.len());
    info!("   Monitored pairs: {}", config.monitored_pairs.len());
    info!("   Triangular cycles: {}", config.triangular_cycles.len());
    info!("   Min Profit: {} quote", config.min_profit_quote);
    info!("   Min Margin: {}", config.min_margin);
    info!("   Safety Margin: {}", config.safety_margin);
    info!("   Max Gas Price: {} gwei", config.max_gas_price_gwei);
    info!("   Store: {}", config.store_path);
    info!("   API Port: {}", config.api_port);
    info!("   ⚠️  READ-ONLY MODE - no transactions are ever submitted");

    // Ctrl+C flips the shutdown flag; the orchestrator drains from there.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("\n📛 Received shutdown signal (Ctrl+C)...");
            let _ = shutdown_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(config);
    let cause = orchestrator.run(shutdown_rx).await;

    info!("🛑 Shut down: {cause:?}");
    ExitCode::from(cause.exit_code() as u8)
}
