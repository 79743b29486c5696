//! Deterministic constant-product math over big integers

pub mod ratio;
pub mod swap;
pub mod optimal;

pub use ratio::*;
pub use swap::*;
pub use optimal::*;

use alloy::primitives::{U256, U512};

use crate::errors::{ScanError, ScanResult};

/// Narrows a 512-bit intermediate back to 256 bits, failing instead of
/// truncating when the value does not fit.
pub(crate) fn u512_to_u256(value: U512) -> ScanResult<U256> {
    if value > U512::from(U256::MAX) {
        return Err(ScanError::invalid_input("512-bit intermediate exceeds 256 bits"));
    }
    Ok(value.to::<U256>())
}
