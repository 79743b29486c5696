//! TTL'd pair-address cache and the snapshot store

use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::errors::{ScanError, ScanResult};
use crate::rpc::{decode_pair_address, get_pair_calldata, RpcPool};
use crate::types::{Freshness, PairKey, ReserveSnapshot, VenueSet};

#[derive(Debug, Clone, Copy)]
enum AddressEntry {
    Resolved { address: Address, fetched_at: Instant },
    /// The factory returned the zero address. Cached with a shorter TTL
    /// so repeated lookups do not hammer the endpoint.
    NoPair { fetched_at: Instant },
}

/// Owns pair-address resolution and the most recent reserve snapshot
/// per pair. Snapshot reads never suspend; resolution may go to the
/// chain through the RPC pool.
pub struct PairCache {
    rpc: Arc<RpcPool>,
    venues: Arc<VenueSet>,
    ttl: Duration,
    negative_ttl: Duration,
    addresses: tokio::sync::RwLock<HashMap<PairKey, AddressEntry>>,
    snapshots: RwLock<HashMap<PairKey, Arc<ReserveSnapshot>>>,
    latest_block: AtomicU64,
}

impl PairCache {
    pub fn new(
        rpc: Arc<RpcPool>,
        venues: Arc<VenueSet>,
        ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            rpc,
            venues,
            ttl,
            negative_ttl,
            addresses: tokio::sync::RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            latest_block: AtomicU64::new(0),
        }
    }

    /// Resolves the pool address for a pair, consulting the cache
    /// first. `Ok(None)` means the venue's factory has no pool for the
    /// token combination.
    pub async fn resolve(&self, key: &PairKey) -> ScanResult<Option<Address>> {
        {
            let map = self.addresses.read().await;
            match map.get(key) {
                Some(AddressEntry::Resolved { address, fetched_at })
                    if fetched_at.elapsed() < self.ttl =>
                {
                    return Ok(Some(*address));
                }
                Some(AddressEntry::NoPair { fetched_at })
                    if fetched_at.elapsed() < self.negative_ttl =>
                {
                    return Ok(None);
                }
                _ => {}
            }
        }

        let venue = self.venues.get(&key.venue).ok_or_else(|| {
            ScanError::config(format!("unknown venue {} in pair lookup", key.venue))
        })?;
        let calldata = get_pair_calldata(key.token0, key.token1);
        let bytes = self.rpc.eth_call(venue.factory, &calldata, None).await?;
        let address = decode_pair_address(&bytes)?;

        let mut map = self.addresses.write().await;
        if address == Address::ZERO {
            debug!("No pool for {key} on {}", key.venue);
            map.insert(
                key.clone(),
                AddressEntry::NoPair {
                    fetched_at: Instant::now(),
                },
            );
            Ok(None)
        } else {
            info!("Resolved {key} → {address}");
            map.insert(
                key.clone(),
                AddressEntry::Resolved {
                    address,
                    fetched_at: Instant::now(),
                },
            );
            Ok(Some(address))
        }
    }

    /// Publishes a new snapshot. A reader sees either the previous
    /// snapshot or this one, never a mix; snapshots from older blocks
    /// never displace newer ones.
    pub fn publish(&self, snapshot: ReserveSnapshot) {
        let mut map = self.snapshots.write().expect("snapshot lock poisoned");
        match map.get(&snapshot.pair) {
            Some(existing) if existing.block_number > snapshot.block_number => {}
            _ => {
                map.insert(snapshot.pair.clone(), Arc::new(snapshot));
            }
        }
    }

    /// Borrow-free snapshot read with its freshness tag. Never
    /// suspends.
    pub fn snapshot(&self, key: &PairKey) -> Option<(Arc<ReserveSnapshot>, Freshness)> {
        let map = self.snapshots.read().expect("snapshot lock poisoned");
        let snapshot = map.get(key)?.clone();
        let freshness = self.freshness(&snapshot);
        Some((snapshot, freshness))
    }

    pub fn freshness(&self, snapshot: &ReserveSnapshot) -> Freshness {
        if snapshot.is_dead() {
            return Freshness::Dead;
        }
        let age = chrono::Utc::now() - snapshot.observed_at;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        if age > ttl {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// `true` when a refresh is needed: no snapshot, or one past TTL.
    pub fn needs_refresh(&self, key: &PairKey) -> bool {
        match self.snapshot(key) {
            Some((_, Freshness::Fresh)) => false,
            _ => true,
        }
    }

    pub fn note_block(&self, number: u64) {
        self.latest_block.fetch_max(number, Ordering::SeqCst);
    }

    pub fn latest_block(&self) -> u64 {
        self.latest_block.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};
    use std::time::Duration;

    fn test_cache(ttl_secs: u64) -> PairCache {
        let rpc = Arc::new(
            RpcPool::new(
                vec![crate::config::EndpointConfig {
                    http_url: "http://localhost:8545".to_string(),
                    ws_url: None,
                    weight: 1,
                    max_retries: 1,
                    timeout_ms: 100,
                }],
                3,
                Duration::from_secs(60),
            )
            .unwrap(),
        );
        let venues = Arc::new(VenueSet::new(vec![]));
        PairCache::new(rpc, venues, Duration::from_secs(ttl_secs), Duration::from_secs(5))
    }

    fn key() -> PairKey {
        PairKey::new(
            "uniswap",
            Address::from([1u8; 20]),
            Address::from([2u8; 20]),
        )
    }

    fn snapshot_at(block: u64, reserve0: u64, observed_secs_ago: i64) -> ReserveSnapshot {
        ReserveSnapshot {
            pair: key(),
            pair_address: Address::from([9u8; 20]),
            reserve0: U256::from(reserve0),
            reserve1: U256::from(1_000_000u64),
            block_number: block,
            block_hash: B256::ZERO,
            observed_at: chrono::Utc::now() - chrono::Duration::seconds(observed_secs_ago),
        }
    }

    #[test]
    fn publish_then_read() {
        let cache = test_cache(30);
        cache.publish(snapshot_at(100, 5, 0));
        let (snapshot, freshness) = cache.snapshot(&key()).unwrap();
        assert_eq!(snapshot.block_number, 100);
        assert_eq!(freshness, Freshness::Fresh);
    }

    #[test]
    fn older_block_never_supersedes() {
        let cache = test_cache(30);
        cache.publish(snapshot_at(100, 5, 0));
        cache.publish(snapshot_at(99, 7, 0));
        let (snapshot, _) = cache.snapshot(&key()).unwrap();
        assert_eq!(snapshot.block_number, 100);
        cache.publish(snapshot_at(101, 7, 0));
        let (snapshot, _) = cache.snapshot(&key()).unwrap();
        assert_eq!(snapshot.block_number, 101);
    }

    #[test]
    fn zero_reserves_tag_dead() {
        let cache = test_cache(30);
        cache.publish(snapshot_at(100, 0, 0));
        let (_, freshness) = cache.snapshot(&key()).unwrap();
        assert_eq!(freshness, Freshness::Dead);
    }

    #[test]
    fn ttl_expiry_tags_stale() {
        let cache = test_cache(30);
        cache.publish(snapshot_at(100, 5, 31));
        let (_, freshness) = cache.snapshot(&key()).unwrap();
        assert_eq!(freshness, Freshness::Stale);
        assert!(cache.needs_refresh(&key()));
    }

    #[test]
    fn missing_snapshot_needs_refresh() {
        let cache = test_cache(30);
        assert!(cache.needs_refresh(&key()));
    }

    #[test]
    fn latest_block_is_monotonic() {
        let cache = test_cache(30);
        cache.note_block(10);
        cache.note_block(8);
        assert_eq!(cache.latest_block(), 10);
    }
}
