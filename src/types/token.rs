//! Token metadata and the per-process token registry

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::errors::{ScanError, ScanResult};

/// A known ERC-20 token. Decimals come from configuration; tokens with
/// unknown decimals are rejected at startup.
#[derive(Debug, Clone)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Immutable lookup table built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_address: HashMap<Address, Token>,
}

impl TokenRegistry {
    pub fn new(tokens: Vec<Token>) -> Self {
        let by_address = tokens.into_iter().map(|t| (t.address, t)).collect();
        Self { by_address }
    }

    pub fn get(&self, address: &Address) -> Option<&Token> {
        self.by_address.get(address)
    }

    pub fn decimals(&self, address: &Address) -> ScanResult<u8> {
        self.by_address
            .get(address)
            .map(|t| t.decimals)
            .ok_or_else(|| ScanError::config(format!("unknown token decimals for {address}")))
    }

    /// Symbol for display, falling back to a shortened hex address.
    pub fn symbol(&self, address: &Address) -> String {
        match self.by_address.get(address) {
            Some(t) => t.symbol.clone(),
            None => short_address(address),
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }
}

pub fn short_address(address: &Address) -> String {
    let hex = format!("{address:#x}");
    format!("{}..{}", &hex[..6], &hex[hex.len() - 4..])
}
