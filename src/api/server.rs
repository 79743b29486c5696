//! Router construction and serving

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use super::state::ApiState;

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/opportunities", get(handlers::get_opportunities))
        .route("/opportunities/:id", get(handlers::get_opportunity))
        .route("/statistics", get(handlers::get_statistics))
        .route("/prices", get(handlers::get_prices))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves the read API until the shutdown flag flips.
pub async fn serve(state: ApiState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Read API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                if shutdown.changed().await.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}
