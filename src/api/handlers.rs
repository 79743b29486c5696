//! HTTP handlers for the read API

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::Opportunity;

use super::state::ApiState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct OpportunitiesQuery {
    pub limit: Option<usize>,
    pub kind: Option<String>,
    pub min_profit: Option<Decimal>,
    /// Unix seconds, inclusive.
    pub from: Option<i64>,
    pub to: Option<i64>,
}

pub async fn get_opportunities(
    State(state): State<ApiState>,
    Query(query): Query<OpportunitiesQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let items = state.list_opportunities(limit, |opp| {
        if let Some(kind) = &query.kind {
            if opp.kind.as_str() != kind {
                return false;
            }
        }
        if let Some(min_profit) = query.min_profit {
            if opp.net_profit_quote < min_profit {
                return false;
            }
        }
        if let Some(from) = query.from {
            if opp.created_at.timestamp() < from {
                return false;
            }
        }
        if let Some(to) = query.to {
            if opp.created_at.timestamp() > to {
                return false;
            }
        }
        true
    });
    Json(json!({
        "count": items.len(),
        "opportunities": items,
    }))
}

pub async fn get_opportunity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Opportunity>, StatusCode> {
    state
        .get_opportunity(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_statistics(State(state): State<ApiState>) -> Json<Value> {
    let stats = state.stats_snapshot();
    let now = chrono::Utc::now();
    Json(json!({
        "uptime_seconds": stats.uptime_seconds(now),
        "ticks": stats.ticks,
        "ticks_skipped_high_gas": stats.ticks_skipped_high_gas,
        "detected": {
            "two_leg": stats.detected_two_leg,
            "triangular": stats.detected_triangular,
        },
        "qualified": {
            "two_leg": stats.qualified_two_leg,
            "triangular": stats.qualified_triangular,
        },
        "rejected": stats.rejected,
        "approved": stats.approved,
        "simulated_executions": stats.simulated_executions,
        "cumulative_net_profit_quote": stats.cumulative_net_profit_quote,
        "per_venue": stats.per_venue,
        "dropped": {
            "rejected": stats.dropped_rejected,
            "qualified": stats.dropped_qualified,
        },
        "last_block_processed": stats.last_block_processed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    pub pair: Option<String>,
    pub venue: Option<String>,
    pub limit: Option<usize>,
}

pub async fn get_prices(
    State(state): State<ApiState>,
    Query(query): Query<PricesQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let items = state.list_prices(limit, |record| {
        if let Some(pair) = &query.pair {
            if !record.pair.eq_ignore_ascii_case(pair) {
                return false;
            }
        }
        if let Some(venue) = &query.venue {
            if &record.venue != venue {
                return false;
            }
        }
        true
    });
    Json(json!({
        "count": items.len(),
        "prices": items,
    }))
}

pub async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let report = state.health().await;
    Json(serde_json::to_value(&report).unwrap_or_else(|_| json!({"status": "unhealthy"})))
}
