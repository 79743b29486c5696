//! Reserve snapshots and freshness tagging

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::PairKey;

/// Snapshot freshness relative to the TTL and the latest seen block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    Fresh,
    Stale,
    Dead,
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
            Freshness::Dead => write!(f, "dead"),
        }
    }
}

/// Reserves of one pool as observed at a specific block. Published
/// whole (`Arc` replace) so readers never see a torn update.
#[derive(Debug, Clone)]
pub struct ReserveSnapshot {
    pub pair: PairKey,
    pub pair_address: alloy::primitives::Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_number: u64,
    pub block_hash: B256,
    pub observed_at: DateTime<Utc>,
}

impl ReserveSnapshot {
    /// A snapshot with either reserve at zero is unusable for detection.
    pub fn is_dead(&self) -> bool {
        self.reserve0.is_zero() || self.reserve1.is_zero()
    }

    /// Reserves oriented for a swap of `token_in` into the pool.
    /// Returns `(reserve_in, reserve_out)`, or `None` if the token is
    /// not part of this pair.
    pub fn oriented(&self, token_in: &alloy::primitives::Address) -> Option<(U256, U256)> {
        if *token_in == self.pair.token0 {
            Some((self.reserve0, self.reserve1))
        } else if *token_in == self.pair.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// Reserve of a single side.
    pub fn reserve_of(&self, token: &alloy::primitives::Address) -> Option<U256> {
        if *token == self.pair.token0 {
            Some(self.reserve0)
        } else if *token == self.pair.token1 {
            Some(self.reserve1)
        } else {
            None
        }
    }
}
