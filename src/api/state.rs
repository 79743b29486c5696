//! Shared in-memory state behind the read API
//!
//! The orchestrator and simulator write here; HTTP handlers only read.
//! The SQLite store remains the durable copy.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::cache::PairCache;
use crate::feed::PriceFeed;
use crate::rpc::RpcPool;
use crate::storage::PriceHistoryRecord;
use crate::types::{
    HealthLevel, HealthReport, Opportunity, OpportunityStatus, Stats, TokenRegistry,
};

const OPPORTUNITY_LOG_CAPACITY: usize = 1024;
const PRICE_LOG_CAPACITY: usize = 4096;
/// An endpoint failure within this window flips health to degraded.
const DEGRADED_WINDOW: Duration = Duration::from_secs(60);

/// Ring of recent opportunities, newest first, with id lookup.
#[derive(Default)]
pub struct OpportunityLog {
    deque: VecDeque<Opportunity>,
    by_id: HashMap<String, Opportunity>,
}

impl OpportunityLog {
    pub fn insert(&mut self, opp: Opportunity) {
        self.by_id.insert(opp.id.clone(), opp.clone());
        self.deque.push_front(opp);
        while self.deque.len() > OPPORTUNITY_LOG_CAPACITY {
            if let Some(evicted) = self.deque.pop_back() {
                self.by_id.remove(&evicted.id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Opportunity> {
        self.by_id.get(id)
    }

    pub fn set_status(&mut self, id: &str, status: OpportunityStatus) {
        if let Some(opp) = self.by_id.get_mut(id) {
            opp.status = status;
        }
        if let Some(opp) = self.deque.iter_mut().find(|o| o.id == id) {
            opp.status = status;
        }
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &Opportunity> {
        self.deque.iter()
    }
}

/// Recent reserve samples for `GET /prices`, newest first.
#[derive(Default)]
pub struct PriceLog {
    deque: VecDeque<PriceHistoryRecord>,
}

impl PriceLog {
    /// Appends unless the same pool at the same block is already the
    /// newest entry for that pool.
    pub fn record(&mut self, record: PriceHistoryRecord) {
        let duplicate = self.deque.iter().any(|r| {
            r.pair == record.pair && r.venue == record.venue && r.block_number == record.block_number
        });
        if duplicate {
            return;
        }
        self.deque.push_front(record);
        while self.deque.len() > PRICE_LOG_CAPACITY {
            self.deque.pop_back();
        }
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &PriceHistoryRecord> {
        self.deque.iter()
    }
}

/// Cloneable handle shared between the orchestrator, the simulator,
/// and the HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    stats: Arc<RwLock<Stats>>,
    opportunities: Arc<RwLock<OpportunityLog>>,
    prices: Arc<RwLock<PriceLog>>,
    tokens: Arc<TokenRegistry>,
    rpc: Arc<RpcPool>,
    feed: Arc<PriceFeed>,
    cache: Arc<PairCache>,
    unhealthy_after: Duration,
}

impl ApiState {
    pub fn new(
        tokens: TokenRegistry,
        rpc: Arc<RpcPool>,
        feed: Arc<PriceFeed>,
        cache: Arc<PairCache>,
        unhealthy_after: Duration,
    ) -> Self {
        Self {
            stats: Arc::new(RwLock::new(Stats::new(Utc::now()))),
            opportunities: Arc::new(RwLock::new(OpportunityLog::default())),
            prices: Arc::new(RwLock::new(PriceLog::default())),
            tokens: Arc::new(tokens),
            rpc,
            feed,
            cache,
            unhealthy_after,
        }
    }

    pub fn with_stats<R>(&self, f: impl FnOnce(&mut Stats) -> R) -> R {
        let mut stats = self.stats.write().expect("stats lock poisoned");
        f(&mut stats)
    }

    pub fn stats_snapshot(&self) -> Stats {
        self.stats.read().expect("stats lock poisoned").clone()
    }

    pub fn record_opportunity(&self, opp: Opportunity) {
        self.opportunities
            .write()
            .expect("opportunity log lock poisoned")
            .insert(opp);
    }

    pub fn set_opportunity_status(&self, id: &str, status: OpportunityStatus) {
        self.opportunities
            .write()
            .expect("opportunity log lock poisoned")
            .set_status(id, status);
    }

    pub fn get_opportunity(&self, id: &str) -> Option<Opportunity> {
        self.opportunities
            .read()
            .expect("opportunity log lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn list_opportunities(
        &self,
        limit: usize,
        filter: impl Fn(&Opportunity) -> bool,
    ) -> Vec<Opportunity> {
        self.opportunities
            .read()
            .expect("opportunity log lock poisoned")
            .newest_first()
            .filter(|o| filter(o))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn record_price(&self, record: PriceHistoryRecord) {
        self.prices
            .write()
            .expect("price log lock poisoned")
            .record(record);
    }

    pub fn list_prices(
        &self,
        limit: usize,
        filter: impl Fn(&PriceHistoryRecord) -> bool,
    ) -> Vec<PriceHistoryRecord> {
        self.prices
            .read()
            .expect("price log lock poisoned")
            .newest_first()
            .filter(|r| filter(r))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn record_execution(&self) {
        self.with_stats(|stats| {
            stats.simulated_executions += 1;
        });
    }

    pub fn quote_decimals(&self, token: &alloy::primitives::Address) -> Option<u8> {
        self.tokens.get(token).map(|t| t.decimals)
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Health per the contract: degraded on a recent endpoint failure,
    /// unhealthy when block observations dry up.
    pub async fn health(&self) -> HealthReport {
        let (endpoint_index, endpoint_errors) = self.rpc.endpoint_health().await;
        let last_block_at = self.feed.last_block_at();
        let now = Utc::now();

        let block_overdue = match last_block_at {
            Some(at) => {
                (now - at).to_std().unwrap_or(Duration::ZERO) > self.unhealthy_after
            }
            None => true,
        };
        let recent_endpoint_failure = endpoint_errors.iter().any(|e| {
            e.last_failure_at
                .map(|at| (now - at).to_std().unwrap_or(Duration::ZERO) < DEGRADED_WINDOW)
                .unwrap_or(false)
        });

        let status = if block_overdue {
            HealthLevel::Unhealthy
        } else if recent_endpoint_failure {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };

        HealthReport {
            status,
            last_block_number: self.cache.latest_block(),
            last_block_at,
            endpoint_index,
            endpoint_errors,
        }
    }
}
