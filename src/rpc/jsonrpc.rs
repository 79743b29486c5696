//! JSON-RPC 2.0 request and response plumbing

use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::errors::{ScanError, ScanResult};

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn into_result(self) -> Result<Value, RpcErrorObject> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Parses an `0x`-prefixed quantity into a `u64`.
pub fn parse_quantity_u64(value: &Value) -> ScanResult<u64> {
    let raw = value
        .as_str()
        .ok_or_else(|| ScanError::invalid_input(format!("expected hex quantity, got {value}")))?;
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| ScanError::invalid_input(format!("bad hex quantity {raw}: {e}")))
}

pub fn parse_quantity_u256(value: &Value) -> ScanResult<U256> {
    let raw = value
        .as_str()
        .ok_or_else(|| ScanError::invalid_input(format!("expected hex quantity, got {value}")))?;
    U256::from_str(raw).map_err(|e| ScanError::invalid_input(format!("bad hex quantity {raw}: {e}")))
}

pub fn parse_hash(value: &Value) -> ScanResult<B256> {
    let raw = value
        .as_str()
        .ok_or_else(|| ScanError::invalid_input(format!("expected hash, got {value}")))?;
    B256::from_str(raw).map_err(|e| ScanError::invalid_input(format!("bad hash {raw}: {e}")))
}

pub fn parse_hex_bytes(value: &Value) -> ScanResult<Vec<u8>> {
    let raw = value
        .as_str()
        .ok_or_else(|| ScanError::invalid_input(format!("expected hex bytes, got {value}")))?;
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex_decode(stripped).map_err(|e| ScanError::invalid_input(format!("bad hex bytes: {e}")))
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd length".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Block tag for `eth_call` and friends.
pub fn block_tag(block: Option<u64>) -> Value {
    match block {
        Some(n) => Value::String(format!("{n:#x}")),
        None => Value::String("latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity_u64(&json!("0x10")).unwrap(), 16);
        assert_eq!(parse_quantity_u64(&json!("0x0")).unwrap(), 0);
        assert!(parse_quantity_u64(&json!(16)).is_err());
        assert!(parse_quantity_u64(&json!("0xzz")).is_err());
    }

    #[test]
    fn block_tags() {
        assert_eq!(block_tag(None), json!("latest"));
        assert_eq!(block_tag(Some(255)), json!("0xff"));
    }

    #[test]
    fn hex_round_trip() {
        let bytes = parse_hex_bytes(&json!("0x0902f1ac")).unwrap();
        assert_eq!(bytes, vec![0x09, 0x02, 0xf1, 0xac]);
        assert_eq!(encode_hex(&bytes), "0x0902f1ac");
    }

    #[test]
    fn error_responses_surface() {
        let response: RpcResponse =
            serde_json::from_value(json!({"id": 1, "error": {"code": -32601, "message": "nope"}}))
                .unwrap();
        assert!(response.into_result().is_err());
    }
}
