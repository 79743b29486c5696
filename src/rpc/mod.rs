//! Multi-endpoint JSON-RPC transport with failover

pub mod jsonrpc;
pub mod abi;
pub mod pool;
pub mod subscription;

pub use jsonrpc::*;
pub use abi::*;
pub use pool::*;
pub use subscription::*;

use alloy::primitives::B256;

/// A new chain head as delivered by the block subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
}
