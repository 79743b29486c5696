//! Block header subscription over WebSocket, with polling fallback

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::errors::{ScanError, ScanResult};

use super::jsonrpc::{parse_hash, parse_quantity_u64};
use super::{BlockHeader, RpcPool};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Streams new block headers into `tx` until shutdown or transport
/// loss. Returns `Ok` on a clean shutdown; `Err` means the caller
/// should rotate endpoints and resubscribe. Consumers must tolerate
/// gaps and duplicate deliveries.
pub async fn run_block_stream(
    pool: Arc<RpcPool>,
    tx: mpsc::Sender<BlockHeader>,
    shutdown: watch::Receiver<bool>,
) -> ScanResult<()> {
    match pool.active_ws_url().await {
        Some(ws_url) => subscribe_websocket(&ws_url, tx, shutdown).await,
        None => {
            info!("No WebSocket endpoint configured, polling for new blocks");
            poll_blocks(pool, tx, shutdown).await
        }
    }
}

async fn subscribe_websocket(
    ws_url: &str,
    tx: mpsc::Sender<BlockHeader>,
    mut shutdown: watch::Receiver<bool>,
) -> ScanResult<()> {
    let (mut ws, _) = connect_async(ws_url).await.map_err(|e| ScanError::Subscription {
        message: format!("cannot connect to {ws_url}"),
        source: Some(e.into()),
    })?;

    let subscribe = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["newHeads"]
    });
    ws.send(Message::Text(subscribe.to_string()))
        .await
        .map_err(|e| ScanError::Subscription {
            message: "eth_subscribe send failed".to_string(),
            source: Some(e.into()),
        })?;
    info!("📡 Subscribed to newHeads on {ws_url}");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
            }
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(header) = parse_new_head(&text) {
                        debug!("New head #{} {}", header.number, header.hash);
                        if tx.send(header).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    ws.send(Message::Pong(payload)).await.map_err(|e| ScanError::Subscription {
                        message: "pong send failed".to_string(),
                        source: Some(e.into()),
                    })?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ScanError::Subscription {
                        message: format!("{ws_url} closed the subscription"),
                        source: None,
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(ScanError::Subscription {
                        message: format!("{ws_url} stream error"),
                        source: Some(e.into()),
                    });
                }
            }
        }
    }
}

async fn poll_blocks(
    pool: Arc<RpcPool>,
    tx: mpsc::Sender<BlockHeader>,
    mut shutdown: watch::Receiver<bool>,
) -> ScanResult<()> {
    let mut last_seen = 0u64;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let header = pool.get_block_by_number(None).await.map_err(|e| {
                    ScanError::Subscription {
                        message: "block polling failed".to_string(),
                        source: Some(anyhow::anyhow!("{e}")),
                    }
                })?;
                if header.number > last_seen {
                    last_seen = header.number;
                    if tx.send(header).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Extracts a header from an `eth_subscription` notification. Other
/// frames (subscription confirmations, keepalives) return `None`.
fn parse_new_head(text: &str) -> Option<BlockHeader> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let result = value.get("params")?.get("result")?;
    let number = parse_quantity_u64(result.get("number")?).ok()?;
    let hash = parse_hash(result.get("hash")?).ok()?;
    Some(BlockHeader { number, hash })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_head_notifications() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0x9ce59a13059e417087c02d3236a0b1cc",
                "result": {
                    "number": "0x1b4",
                    "hash": "0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
                }
            }
        }"#;
        let header = parse_new_head(text).unwrap();
        assert_eq!(header.number, 436);
    }

    #[test]
    fn ignores_subscription_confirmations() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":"0x9ce59a13059e417087c02d3236a0b1cc"}"#;
        assert!(parse_new_head(text).is_none());
    }

    #[test]
    fn ignores_garbage() {
        assert!(parse_new_head("not json").is_none());
        assert!(parse_new_head("{}").is_none());
    }
}
