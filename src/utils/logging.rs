//! Logging setup and configuration

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub struct LoggingGuard {
    pub _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Console output plus a daily-rolling scanner log under `log_dir`.
/// `RUST_LOG` overrides the filter; the default keeps the scanner at
/// info while quieting the HTTP layers.
pub fn setup_logging(log_dir: &str) -> Result<LoggingGuard> {
    let file_appender = tracing_appender::rolling::daily(log_dir, "scanner.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("dex_arb_scanner=info,axum=warn,tower_http=warn")
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(true)
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact()
        )
        .with(filter)
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Creates the log directory and the store's parent directory.
pub fn setup_output_directories(log_dir: &str, store_path: &str) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;
    if let Some(parent) = Path::new(store_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
