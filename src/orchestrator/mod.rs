//! Scheduling, lifecycle, and emission to sinks

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::{self, ApiState};
use crate::cache::PairCache;
use crate::config::Config;
use crate::detector::{Candidate, DetectionContext, Detector};
use crate::execution::{ExecutionSimulator, SimulationRequest};
use crate::feed::PriceFeed;
use crate::math::Ratio;
use crate::qualifier::{gas_price_acceptable, Qualifier};
use crate::risk::{Assessment, RiskGate};
use crate::rpc::{BlockHeader, RpcPool};
use crate::storage::{create_storage_channel, OpportunityRecord, PriceHistoryRecord, StorageChannel};
use crate::types::{
    Freshness, MonitoredPair, Opportunity, OpportunityKind, OpportunityStatus, PairKey, Portfolio,
    TokenRegistry, VenueSet,
};
use crate::utils::{pow10_u256, print_opportunity, print_session_stats, wei_to_gwei};

const STATS_PRINT_EVERY_TICKS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Why the process is going down; maps to the CLI exit code.
#[derive(Debug)]
pub enum ShutdownCause {
    Clean,
    RpcOutage(String),
    StoreOutage(String),
}

impl ShutdownCause {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownCause::Clean => 0,
            ShutdownCause::RpcOutage(_) => 2,
            ShutdownCause::StoreOutage(_) => 3,
        }
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    state: RwLock<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            state: RwLock::new(OrchestratorState::Stopped),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.read().expect("orchestrator state lock")
    }

    fn set_state(&self, state: OrchestratorState) {
        *self.state.write().expect("orchestrator state lock") = state;
        debug!("Orchestrator state → {state:?}");
    }

    /// Brings the system up (store, RPC pool, cache, feed, API,
    /// simulator), runs the tick loop until shutdown or an
    /// unrecoverable failure, then tears everything down in reverse.
    pub async fn run(&self, mut external_shutdown: watch::Receiver<bool>) -> ShutdownCause {
        let config = self.config.clone();
        self.set_state(OrchestratorState::Starting);

        let storage = match create_storage_channel(&config.store_path, config.store_buffer_limit) {
            Ok(channel) => channel,
            Err(e) => {
                error!("Store unavailable at startup: {e}");
                self.set_state(OrchestratorState::Stopped);
                return ShutdownCause::StoreOutage(e.to_string());
            }
        };
        let store_health = storage.health();

        let rpc = match RpcPool::new(
            config.endpoints.clone(),
            config.failover_threshold,
            Duration::from_secs(config.cooldown_period_secs),
        ) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                error!("RPC pool construction failed: {e}");
                self.set_state(OrchestratorState::Stopped);
                return ShutdownCause::RpcOutage(e.to_string());
            }
        };

        let venues = Arc::new(config.venue_set());
        let tokens = config.token_registry();
        let monitored = config.monitored();
        let cycles = config.cycles();

        let cache = Arc::new(PairCache::new(
            rpc.clone(),
            venues.clone(),
            Duration::from_secs(config.cache_ttl_secs),
            Duration::from_secs(config.negative_cache_ttl_secs),
        ));
        let (feed, mut refreshed_rx) = PriceFeed::new(
            rpc.clone(),
            cache.clone(),
            &venues,
            &monitored,
            &cycles,
            config.batch_size,
            Duration::from_millis(config.stagger_delay_ms),
            config.record_price_history.then(|| storage.clone()),
        );
        let detector = Detector::new(
            cache.clone(),
            venues.clone(),
            tokens.clone(),
            monitored.clone(),
            cycles,
            config.min_margin,
            config.max_position_size_quote,
            config.max_block_skew,
            config.opportunity_timeout_secs,
        );
        let qualifier = Qualifier::new(&config);
        let portfolio = Arc::new(Portfolio::new(
            config.starting_capital_quote,
            config.daily_reset_hour_utc,
        ));
        let risk_gate = RiskGate::new(&config, portfolio.clone());
        let api = ApiState::new(
            tokens.clone(),
            rpc.clone(),
            feed.clone(),
            cache.clone(),
            Duration::from_secs(config.unhealthy_after_secs),
        );

        let (internal_tx, internal_rx) = watch::channel(false);
        let (sim_tx, sim_rx) = mpsc::channel::<SimulationRequest>(64);

        let mut feed_task = tokio::spawn(feed.clone().run(internal_rx.clone()));
        let api_task = tokio::spawn(api::serve(
            api.clone(),
            config.api_port,
            internal_rx.clone(),
        ));
        let sim_task = tokio::spawn(
            ExecutionSimulator::new(portfolio.clone(), storage.clone(), api.clone()).run(sim_rx),
        );

        let pipeline = Pipeline {
            config: config.clone(),
            rpc,
            cache,
            venues,
            tokens,
            monitored,
            feed,
            detector,
            qualifier,
            risk_gate,
            portfolio,
            api: api.clone(),
            storage: storage.clone(),
            sim_tx,
        };

        self.set_state(OrchestratorState::Running);
        info!("🚀 Orchestrator running, waiting for blocks");

        let mut interval =
            tokio::time::interval(Duration::from_secs(config.scan_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_run_at: Option<Instant> = None;
        let mut last_header: Option<BlockHeader> = None;

        let cause = loop {
            tokio::select! {
                changed = refreshed_rx.changed() => {
                    if changed.is_err() {
                        break ShutdownCause::RpcOutage("price feed channel closed".to_string());
                    }
                    let header = *refreshed_rx.borrow_and_update();
                    if let Some(header) = header {
                        last_header = Some(header);
                        pipeline.tick(header).await;
                        last_run_at = Some(Instant::now());
                    }
                }
                _ = interval.tick() => {
                    // Backup cadence only: skip when a block-driven run
                    // happened inside the interval.
                    let fresh_run = last_run_at
                        .map(|t| t.elapsed() < Duration::from_secs(config.scan_interval_secs.max(1)))
                        .unwrap_or(false);
                    if fresh_run {
                        continue;
                    }
                    if let Some(header) = last_header {
                        pipeline.tick(header).await;
                        last_run_at = Some(Instant::now());
                    }
                }
                result = &mut feed_task => {
                    break match result {
                        Ok(Ok(())) => ShutdownCause::Clean,
                        Ok(Err(e)) => {
                            error!("Price feed gave up: {e}");
                            ShutdownCause::RpcOutage(e.to_string())
                        }
                        Err(join_error) => {
                            error!("Price feed task failed: {join_error}");
                            ShutdownCause::RpcOutage(join_error.to_string())
                        }
                    };
                }
                changed = external_shutdown.changed() => {
                    if changed.is_err() || *external_shutdown.borrow() {
                        info!("📛 Shutdown requested");
                        break ShutdownCause::Clean;
                    }
                }
            }

            if let Some(outage) = store_health.outage() {
                if outage > Duration::from_secs(config.store_outage_max_secs) {
                    error!("Store has been failing for {outage:?}, shutting down");
                    break ShutdownCause::StoreOutage(format!(
                        "store outage exceeded {}s",
                        config.store_outage_max_secs
                    ));
                }
            }
        };

        // Reverse teardown with a bounded grace period.
        self.set_state(OrchestratorState::Stopping);
        let _ = internal_tx.send(true);
        drop(pipeline); // closes the simulator channel so it drains
        storage.shutdown();

        let grace = Duration::from_secs(config.shutdown_grace_secs);
        let drained = tokio::time::timeout(grace, async {
            let _ = api_task.await;
            let _ = sim_task.await;
        })
        .await;
        if drained.is_err() {
            warn!("Shutdown grace of {grace:?} elapsed, forcing stop");
        }
        feed_task.abort();

        print_session_stats(&api.stats_snapshot());
        self.set_state(OrchestratorState::Stopped);
        cause
    }
}

/// Everything one detection tick needs. Ticks run strictly serially:
/// refresh → detect → qualify → gate → emit.
struct Pipeline {
    config: Arc<Config>,
    rpc: Arc<RpcPool>,
    cache: Arc<PairCache>,
    venues: Arc<VenueSet>,
    tokens: TokenRegistry,
    monitored: Vec<MonitoredPair>,
    feed: Arc<PriceFeed>,
    detector: Detector,
    qualifier: Qualifier,
    risk_gate: RiskGate,
    portfolio: Arc<Portfolio>,
    api: ApiState,
    storage: StorageChannel,
    sim_tx: mpsc::Sender<SimulationRequest>,
}

impl Pipeline {
    async fn tick(&self, header: BlockHeader) {
        self.portfolio.roll_day(Utc::now());

        let gas_price = match self.rpc.get_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!("Gas price unavailable, skipping tick: {e}");
                return;
            }
        };
        if !gas_price_acceptable(gas_price, self.config.max_gas_price_gwei) {
            self.api.with_stats(|s| s.ticks_skipped_high_gas += 1);
            debug!(
                "Gas price {} above cap of {} gwei, skipping detection",
                gas_price, self.config.max_gas_price_gwei
            );
            return;
        }

        let native_price = self.native_price_quote();
        let (gas_two_leg, gas_triangular) = match (
            self.qualifier
                .gas_cost_quote(OpportunityKind::TwoLeg, gas_price, native_price),
            self.qualifier
                .gas_cost_quote(OpportunityKind::Triangular, gas_price, native_price),
        ) {
            (Ok(two), Ok(three)) => (two, three),
            _ => {
                warn!("Gas cost conversion failed, skipping tick");
                return;
            }
        };

        let ctx = DetectionContext {
            block_number: header.number,
            block_hash: header.hash,
            gas_cost_two_leg_quote: gas_two_leg,
            gas_cost_triangular_quote: gas_triangular,
        };
        let detection = self.detector.detect(&ctx);

        for key in detection.impacted {
            self.feed.mark_impacted(key);
        }
        self.api.with_stats(|stats| {
            stats.ticks += 1;
            stats.last_block_processed = header.number;
            for candidate in &detection.candidates {
                stats.record_detected(candidate.opp.kind);
            }
        });

        let mut qualified: Vec<(Candidate, Opportunity)> = Vec::new();
        let mut rejected: Vec<Opportunity> = Vec::new();
        for candidate in detection.candidates {
            let opp = self.qualifier.qualify(&candidate);
            if opp.status == OpportunityStatus::Qualified {
                let venues: Vec<String> = opp.legs.iter().map(|l| l.venue.clone()).collect();
                self.api.with_stats(|stats| {
                    stats.record_qualified(opp.kind, opp.net_profit_quote, &venues)
                });
                qualified.push((candidate, opp));
            } else {
                rejected.push(opp);
            }
        }

        // Every qualified candidate goes through the risk gate; only
        // the emissions afterwards are capped.
        let mut approved: Vec<(Opportunity, Assessment)> = Vec::new();
        for (candidate, mut opp) in qualified {
            let assessment = self.risk_gate.assess(&candidate, Utc::now());
            if assessment.expired {
                continue;
            }
            if assessment.approved {
                approved.push((opp, assessment));
            } else {
                opp.status = OpportunityStatus::Rejected;
                opp.reject_reasons = assessment.reasons.clone();
                rejected.push(opp);
            }
        }

        // Emission cap, highest margin first. Approvals that lose the
        // race give back the position the gate reserved for them.
        approved.sort_by(|a, b| b.0.margin.cmp(&a.0.margin));
        let cap = self.config.max_opportunities_per_block;
        if approved.len() > cap {
            for (opp, assessment) in approved.drain(cap..) {
                let venue = opp.legs.first().map(|l| l.venue.as_str()).unwrap_or("-");
                self.portfolio
                    .settle_position(venue, assessment.sized_amount_quote, Decimal::ZERO);
                self.api.with_stats(|s| s.dropped_qualified += 1);
            }
        }

        let gas_price_gwei = wei_to_gwei(gas_price).unwrap_or_default();
        for (opp, assessment) in approved {
            self.api.with_stats(|s| s.approved += 1);
            print_opportunity(&opp, self.api.tokens());
            if !self
                .storage
                .record_opportunity(OpportunityRecord::from(&opp))
            {
                self.api.with_stats(|s| s.dropped_qualified += 1);
            }
            self.api.record_opportunity(opp.clone());
            let request = SimulationRequest {
                opportunity: opp,
                assessment,
                gas_price_gwei,
            };
            if let Err(e) = self.sim_tx.try_send(request) {
                debug!("Simulator backlog, dropping request: {e}");
            }
        }

        self.api
            .with_stats(|s| s.rejected += rejected.len() as u64);
        if self.config.emit_rejected {
            // Under backpressure the lowest margins go first.
            rejected.sort_by(|a, b| b.margin.cmp(&a.margin));
            for opp in rejected {
                if self
                    .storage
                    .record_opportunity(OpportunityRecord::from(&opp))
                {
                    self.api.record_opportunity(opp);
                } else {
                    self.api.with_stats(|s| s.dropped_rejected += 1);
                }
            }
        }

        // Sample fresh reserves into the /prices window.
        for key in self.feed.watched() {
            if let Some((snapshot, Freshness::Fresh)) = self.cache.snapshot(key) {
                self.api.record_price(PriceHistoryRecord::from(&*snapshot));
            }
        }

        let ticks = self.api.with_stats(|s| s.ticks);
        if ticks % STATS_PRINT_EVERY_TICKS == 0 {
            print_session_stats(&self.api.stats_snapshot());
        }
    }

    /// Price of the native token in quote units, from the freshest
    /// monitored native pool, falling back to configuration.
    fn native_price_quote(&self) -> Decimal {
        for pair in &self.monitored {
            if pair.base != self.config.native_token {
                continue;
            }
            let (Ok(base_decimals), Ok(quote_decimals)) = (
                self.tokens.decimals(&pair.base),
                self.tokens.decimals(&pair.quote),
            ) else {
                continue;
            };
            for venue in self.venues.iter() {
                let key = PairKey::new(venue.name.clone(), pair.base, pair.quote);
                let Some((snapshot, Freshness::Fresh)) = self.cache.snapshot(&key) else {
                    continue;
                };
                let (Some(base_reserve), Some(quote_reserve)) = (
                    snapshot.reserve_of(&pair.base),
                    snapshot.reserve_of(&pair.quote),
                ) else {
                    continue;
                };
                let num = quote_reserve * pow10_u256(base_decimals);
                let den = base_reserve * pow10_u256(quote_decimals);
                let Ok(ratio) = Ratio::new(num, den) else { continue };
                if let Ok(price) = ratio.to_decimal(6) {
                    if price > Decimal::ZERO {
                        return price;
                    }
                }
            }
        }
        self.config.fallback_native_price_quote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_contract() {
        assert_eq!(ShutdownCause::Clean.exit_code(), 0);
        assert_eq!(ShutdownCause::RpcOutage("x".to_string()).exit_code(), 2);
        assert_eq!(ShutdownCause::StoreOutage("x".to_string()).exit_code(), 3);
    }

    #[test]
    fn orchestrator_starts_stopped() {
        let config = sample_config();
        let orchestrator = Orchestrator::new(config);
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    }

    fn sample_config() -> Config {
        let json = serde_json::json!({
            "endpoints": [{"http_url": "http://localhost:8545"}],
            "venues": [
                {"name": "uniswap", "factory": "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"},
                {"name": "sushiswap", "factory": "0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac"}
            ],
            "tokens": [
                {"address": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "symbol": "WETH", "decimals": 18},
                {"address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "symbol": "USDC", "decimals": 6}
            ],
            "monitored_pairs": [{
                "token_a": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
                "token_b": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                "quote_token": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
            }],
            "native_token": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
        });
        serde_json::from_value(json).unwrap()
    }
}
