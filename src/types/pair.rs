//! Pair identity and monitored-pair definitions

use alloy::primitives::Address;
use serde::Serialize;

/// Identity of a pool: `(venue, token0, token1)` with `token0 < token1`
/// by raw address bytes. Construction normalizes the token order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey {
    pub venue: String,
    pub token0: Address,
    pub token1: Address,
}

impl PairKey {
    pub fn new(venue: impl Into<String>, token_a: Address, token_b: Address) -> Self {
        let (token0, token1) = if token_a < token_b {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        Self {
            venue: venue.into(),
            token0,
            token1,
        }
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.token0 == *token || self.token1 == *token
    }

    /// The other side of the pair, if `token` is one of the two.
    pub fn counterpart(&self, token: &Address) -> Option<Address> {
        if self.token0 == *token {
            Some(self.token1)
        } else if self.token1 == *token {
            Some(self.token0)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.venue,
            super::short_address(&self.token0),
            super::short_address(&self.token1)
        )
    }
}

/// A resolved pool: identity plus its on-chain contract address.
#[derive(Debug, Clone)]
pub struct Pair {
    pub key: PairKey,
    pub address: Address,
}

/// A pair the scanner watches on every venue, with a declared quote
/// (numeraire) side. Profit for cycles over this pair is accounted in
/// the quote token.
#[derive(Debug, Clone)]
pub struct MonitoredPair {
    pub base: Address,
    pub quote: Address,
}

/// A configured 3-token cycle for triangular detection. The cycle is
/// traversed starting and ending at `quote`.
#[derive(Debug, Clone)]
pub struct Cycle {
    pub tokens: [Address; 3],
    pub quote: Address,
}
