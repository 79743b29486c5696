//! Health reporting types

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub url: String,
    pub consecutive_failures: u32,
    pub total_errors: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthLevel,
    pub last_block_number: u64,
    pub last_block_at: Option<DateTime<Utc>>,
    pub endpoint_index: usize,
    pub endpoint_errors: Vec<EndpointHealth>,
}
