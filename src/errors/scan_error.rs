//! Custom error types for the scanner

use alloy::primitives::Address;
use std::time::Duration;
use thiserror::Error;

/// Transport failure classification used by the RPC pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Refused,
    Malformed,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Refused => write!(f, "refused"),
            TransportKind::Malformed => write!(f, "malformed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid input: {context}")]
    InvalidInput { context: String },

    #[error("Insufficient liquidity: {pool} - {details}")]
    InsufficientLiquidity { pool: String, details: String },

    #[error("Transport {kind} on {endpoint}: {message}")]
    Transport {
        kind: TransportKind,
        endpoint: String,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
        retry_count: u32,
    },

    #[error("All endpoints exhausted after {attempts} attempts: {message}")]
    EndpointsExhausted { attempts: u32, message: String },

    #[error("Block subscription lost: {message}")]
    Subscription {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Stale data for {pair}: snapshot block {snapshot_block}, current {current_block}")]
    StaleData {
        pair: String,
        snapshot_block: u64,
        current_block: u64,
    },

    #[error("Contract call failed: {contract} - {message}")]
    Contract {
        contract: Address,
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Store error: {message}")]
    Store {
        message: String,
        outage: Option<Duration>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    pub fn invalid_input(context: impl Into<String>) -> Self {
        ScanError::InvalidInput {
            context: context.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ScanError::Config {
            message: message.into(),
        }
    }

    /// Transient failures are retried locally; everything else surfaces.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScanError::Transport { .. } | ScanError::Store { outage: None, .. }
        )
    }
}
