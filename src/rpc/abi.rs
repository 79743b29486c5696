//! ABI encoding for the two contract calls the scanner makes

use alloy::primitives::{keccak256, Address, U256};
use alloy::sol_types::SolValue;
use anyhow::Context;

use crate::errors::{ScanError, ScanResult};

/// Calldata for `getReserves()` on a pair contract.
pub fn get_reserves_calldata() -> Vec<u8> {
    keccak256("getReserves()")[..4].to_vec()
}

/// Calldata for `getPair(address,address)` on a factory contract.
pub fn get_pair_calldata(token_a: Address, token_b: Address) -> Vec<u8> {
    let mut data = keccak256("getPair(address,address)")[..4].to_vec();
    data.extend_from_slice(&(token_a, token_b).abi_encode());
    data
}

/// Decodes `(uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)`.
/// The timestamp is dropped; block anchoring comes from the refresh.
pub fn decode_reserves(data: &[u8]) -> ScanResult<(U256, U256)> {
    let decoded = <(U256, U256, U256)>::abi_decode(data, true)
        .context("failed to decode reserves")
        .map_err(|e| ScanError::invalid_input(e.to_string()))?;
    Ok((decoded.0, decoded.1))
}

/// Decodes the pair address returned by the factory. The zero address
/// means no pair exists for the token combination.
pub fn decode_pair_address(data: &[u8]) -> ScanResult<Address> {
    Address::abi_decode(data, true)
        .context("failed to decode pair address")
        .map_err(|e| ScanError::invalid_input(e.to_string()))
}
