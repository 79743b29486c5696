//! Block-synchronized price feed with impacted-pair tracking

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::cache::PairCache;
use crate::errors::{ScanError, ScanResult};
use crate::rpc::{
    decode_reserves, get_reserves_calldata, run_block_stream, BlockHeader, RpcPool,
};
use crate::storage::{PriceHistoryRecord, StorageChannel};
use crate::types::{Cycle, MonitoredPair, PairKey, ReserveSnapshot, VenueSet};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Subscription state of the feed. One feed per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Subscribing,
    Running,
}

/// Drives the per-block refresh loop: computes the impacted-pair set,
/// batches `getReserves` calls anchored to the new block, and publishes
/// fresh snapshots into the cache. Block events that arrive while a
/// refresh is running coalesce down to the latest one.
pub struct PriceFeed {
    rpc: Arc<RpcPool>,
    cache: Arc<PairCache>,
    watched: Vec<PairKey>,
    batch_size: usize,
    stagger_delay: Duration,
    state: RwLock<FeedState>,
    impacted: Mutex<HashSet<PairKey>>,
    cold_start: AtomicBool,
    consecutive_subscribe_failures: AtomicU32,
    refreshed_tx: watch::Sender<Option<BlockHeader>>,
    last_block_at: RwLock<Option<DateTime<Utc>>>,
    history: Option<StorageChannel>,
}

impl PriceFeed {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<RpcPool>,
        cache: Arc<PairCache>,
        venues: &VenueSet,
        monitored: &[MonitoredPair],
        cycles: &[Cycle],
        batch_size: usize,
        stagger_delay: Duration,
        history: Option<StorageChannel>,
    ) -> (Arc<Self>, watch::Receiver<Option<BlockHeader>>) {
        let watched = watched_keys(venues, monitored, cycles);
        let (refreshed_tx, refreshed_rx) = watch::channel(None);
        let feed = Arc::new(Self {
            rpc,
            cache,
            watched,
            batch_size: batch_size.max(1),
            stagger_delay,
            state: RwLock::new(FeedState::Idle),
            impacted: Mutex::new(HashSet::new()),
            cold_start: AtomicBool::new(true),
            consecutive_subscribe_failures: AtomicU32::new(0),
            refreshed_tx,
            last_block_at: RwLock::new(None),
            history,
        });
        (feed, refreshed_rx)
    }

    pub fn state(&self) -> FeedState {
        *self.state.read().expect("feed state lock")
    }

    fn set_state(&self, state: FeedState) {
        *self.state.write().expect("feed state lock") = state;
    }

    /// External signal that a pair's reserves likely changed and should
    /// be re-read on the next refresh. Without such signals every
    /// watched pair is refreshed each block.
    pub fn mark_impacted(&self, key: PairKey) {
        self.impacted.lock().expect("impacted lock").insert(key);
    }

    pub fn watched(&self) -> &[PairKey] {
        &self.watched
    }

    pub fn last_block_at(&self) -> Option<DateTime<Utc>> {
        *self.last_block_at.read().expect("last block lock")
    }

    /// Runs the subscription state machine until shutdown. Returns an
    /// error only when every resubscription avenue is exhausted, which
    /// the orchestrator treats as an unrecoverable RPC outage.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> ScanResult<()> {
        let max_subscribe_failures = (self.rpc.endpoint_count() as u32) * 3;

        loop {
            if *shutdown.borrow() {
                self.set_state(FeedState::Idle);
                return Ok(());
            }

            self.set_state(FeedState::Subscribing);
            let (block_tx, mut block_rx) = mpsc::channel::<BlockHeader>(16);
            let stream = tokio::spawn(run_block_stream(
                self.rpc.clone(),
                block_tx,
                shutdown.clone(),
            ));
            self.set_state(FeedState::Running);

            // Serial consumption: at most one refresh in flight. Headers
            // that queue up behind a slow refresh collapse to the newest.
            while let Some(header) = block_rx.recv().await {
                self.consecutive_subscribe_failures.store(0, Ordering::SeqCst);
                let mut latest = header;
                while let Ok(next) = block_rx.try_recv() {
                    latest = next;
                }
                if let Err(e) = self.refresh_for_block(latest).await {
                    warn!("Refresh for block {} failed: {e}", latest.number);
                }
                if *shutdown.borrow() {
                    break;
                }
            }

            let stream_result = stream.await;
            if *shutdown.borrow() {
                self.set_state(FeedState::Idle);
                return Ok(());
            }

            match stream_result {
                Ok(Ok(())) => {
                    self.set_state(FeedState::Idle);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    let failures = self
                        .consecutive_subscribe_failures
                        .fetch_add(1, Ordering::SeqCst)
                        + 1;
                    warn!("Block subscription lost ({e}), resubscribing (attempt {failures})");
                    if failures >= max_subscribe_failures {
                        self.set_state(FeedState::Idle);
                        return Err(ScanError::Subscription {
                            message: format!(
                                "subscription lost {failures} times in a row, endpoints exhausted"
                            ),
                            source: Some(anyhow::anyhow!("{e}")),
                        });
                    }
                    self.rpc.rotate().await;
                    tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                }
                Err(join_error) => {
                    self.set_state(FeedState::Idle);
                    return Err(ScanError::Subscription {
                        message: "block stream task panicked".to_string(),
                        source: Some(join_error.into()),
                    });
                }
            }
        }
    }

    /// The pairs to refresh for this block: everything on a cold start,
    /// otherwise impacted signals plus TTL-expired snapshots.
    fn impacted_set(&self) -> Vec<PairKey> {
        if self.cold_start.load(Ordering::SeqCst) {
            return self.watched.clone();
        }
        let marked: HashSet<PairKey> = {
            let mut impacted = self.impacted.lock().expect("impacted lock");
            std::mem::take(&mut *impacted)
        };
        self.watched
            .iter()
            .filter(|key| marked.contains(key) || self.cache.needs_refresh(key))
            .cloned()
            .collect()
    }

    /// Refreshes the impacted set at `header.number` and publishes the
    /// results. Individual failures keep the prior snapshot, which ages
    /// into staleness on its own.
    pub async fn refresh_for_block(&self, header: BlockHeader) -> ScanResult<()> {
        self.cache.note_block(header.number);
        *self.last_block_at.write().expect("last block lock") = Some(Utc::now());

        let impacted = self.impacted_set();
        if impacted.is_empty() {
            self.refreshed_tx.send_replace(Some(header));
            return Ok(());
        }
        debug!(
            "Refreshing {} pairs at block {}",
            impacted.len(),
            header.number
        );

        // Resolve addresses first; pairs without a pool are skipped.
        let mut resolved: Vec<(PairKey, Address)> = Vec::with_capacity(impacted.len());
        for key in impacted {
            match self.cache.resolve(&key).await {
                Ok(Some(address)) => resolved.push((key, address)),
                Ok(None) => {}
                Err(e) => debug!("Pair resolution failed for {key}: {e}"),
            }
        }

        let calldata = get_reserves_calldata();
        let mut first = true;
        for chunk in resolved.chunks(self.batch_size) {
            if !first {
                tokio::time::sleep(self.stagger_delay).await;
            }
            first = false;

            let calls: Vec<(String, serde_json::Value)> = chunk
                .iter()
                .map(|(_, address)| {
                    (
                        "eth_call".to_string(),
                        RpcPool::eth_call_params(*address, &calldata, Some(header.number)),
                    )
                })
                .collect();

            let results = match self.rpc.batch_call(&calls).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(
                        "Reserve batch failed entirely at block {}: {e}",
                        header.number
                    );
                    continue;
                }
            };

            for ((key, address), result) in chunk.iter().zip(results) {
                match result.and_then(|value| {
                    let bytes = crate::rpc::parse_hex_bytes(&value)?;
                    decode_reserves(&bytes)
                }) {
                    Ok((reserve0, reserve1)) => {
                        let snapshot = ReserveSnapshot {
                            pair: key.clone(),
                            pair_address: *address,
                            reserve0,
                            reserve1,
                            block_number: header.number,
                            block_hash: header.hash,
                            observed_at: Utc::now(),
                        };
                        if let Some(history) = &self.history {
                            history.record_price_history(PriceHistoryRecord::from(&snapshot));
                        }
                        self.cache.publish(snapshot);
                    }
                    Err(e) => {
                        // Prior snapshot is retained; it goes stale by TTL.
                        debug!("getReserves failed for {key}: {e}");
                    }
                }
            }
        }

        self.cold_start.store(false, Ordering::SeqCst);
        self.refreshed_tx.send_replace(Some(header));
        Ok(())
    }
}

/// Every pool the feed watches: monitored pairs and triangular cycle
/// edges, on every venue. Deterministic order, deduplicated.
fn watched_keys(venues: &VenueSet, monitored: &[MonitoredPair], cycles: &[Cycle]) -> Vec<PairKey> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for venue in venues.iter() {
        for pair in monitored {
            let key = PairKey::new(venue.name.clone(), pair.base, pair.quote);
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        for cycle in cycles {
            let [a, b, c] = cycle.tokens;
            for (x, y) in [(a, b), (b, c), (c, a)] {
                let key = PairKey::new(venue.name.clone(), x, y);
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
    }
    keys
}
