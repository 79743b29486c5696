//! Scanner configuration: JSON file plus environment overrides

use alloy::primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::errors::{ScanError, ScanResult};
use crate::types::{Cycle, MonitoredPair, Token, TokenRegistry, Venue, VenueSet};

// Configuration bounds
pub const DEFAULT_FEE_NUM: u32 = 997;
pub const DEFAULT_FEE_DEN: u32 = 1000;
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 100;
pub const MAX_EMISSIONS_PER_BLOCK: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub http_url: String,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    pub factory: Address,
    #[serde(default = "default_fee_num")]
    pub fee_num: u32,
    #[serde(default = "default_fee_den")]
    pub fee_den: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoredPairConfig {
    pub token_a: Address,
    pub token_b: Address,
    /// The side profit is accounted in; must be one of the two tokens.
    pub quote_token: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    pub tokens: [Address; 3],
    /// Defaults to the first token of the cycle.
    #[serde(default)]
    pub quote_token: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub endpoints: Vec<EndpointConfig>,
    pub venues: Vec<VenueConfig>,
    pub tokens: Vec<TokenConfig>,
    pub monitored_pairs: Vec<MonitoredPairConfig>,
    #[serde(default)]
    pub triangular_cycles: Vec<CycleConfig>,

    /// Native (gas) token; must appear in the token table.
    pub native_token: Address,
    /// Used when no monitored pool can price the native token.
    #[serde(default = "default_native_price")]
    pub fallback_native_price_quote: Decimal,

    #[serde(default = "default_min_profit")]
    pub min_profit_quote: Decimal,
    #[serde(default = "default_min_margin")]
    pub min_margin: Decimal,
    #[serde(default = "default_safety_margin")]
    pub safety_margin: Decimal,
    #[serde(default = "default_max_position")]
    pub max_position_size_quote: Decimal,
    #[serde(default = "default_min_position")]
    pub min_position_size_quote: Decimal,
    #[serde(default = "default_gas_buffer")]
    pub gas_buffer: Decimal,
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity_quote: Decimal,
    /// Per-leg price impact cap, as a fraction (0.005 = 0.5%).
    #[serde(default = "default_max_price_impact")]
    pub max_price_impact: Decimal,
    #[serde(default = "default_opportunity_timeout")]
    pub opportunity_timeout_secs: u64,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stagger_delay")]
    pub stagger_delay_ms: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_negative_cache_ttl")]
    pub negative_cache_ttl_secs: u64,
    #[serde(default = "default_max_block_skew")]
    pub max_block_skew: u64,

    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,
    #[serde(default = "default_cooldown_period")]
    pub cooldown_period_secs: u64,

    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss_quote: Decimal,
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: Decimal,
    #[serde(default = "default_max_portfolio_exposure")]
    pub max_portfolio_exposure: Decimal,
    #[serde(default = "default_assumed_loss_fraction")]
    pub assumed_loss_fraction: Decimal,
    #[serde(default = "default_starting_capital")]
    pub starting_capital_quote: Decimal,
    #[serde(default)]
    pub daily_reset_hour_utc: u32,

    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_max_opportunities_per_block")]
    pub max_opportunities_per_block: usize,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_store_buffer_limit")]
    pub store_buffer_limit: usize,
    #[serde(default = "default_store_outage_max")]
    pub store_outage_max_secs: u64,
    #[serde(default = "default_true")]
    pub emit_rejected: bool,
    #[serde(default)]
    pub record_price_history: bool,

    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_unhealthy_after")]
    pub unhealthy_after_secs: u64,
}

fn default_weight() -> u32 { 1 }
fn default_max_retries() -> u32 { 3 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_fee_num() -> u32 { DEFAULT_FEE_NUM }
fn default_fee_den() -> u32 { DEFAULT_FEE_DEN }
fn default_native_price() -> Decimal { dec!(2000) }
fn default_min_profit() -> Decimal { dec!(10) }
fn default_min_margin() -> Decimal { dec!(0.005) }
fn default_safety_margin() -> Decimal { dec!(0.1) }
fn default_max_position() -> Decimal { dec!(10000) }
fn default_min_position() -> Decimal { dec!(100) }
fn default_gas_buffer() -> Decimal { dec!(1.2) }
fn default_max_gas_price_gwei() -> u64 { 200 }
fn default_min_liquidity() -> Decimal { dec!(50000) }
fn default_max_price_impact() -> Decimal { dec!(0.005) }
fn default_opportunity_timeout() -> u64 { 30 }
fn default_scan_interval() -> u64 { 5 }
fn default_batch_size() -> usize { 25 }
fn default_stagger_delay() -> u64 { 100 }
fn default_cache_ttl() -> u64 { 30 }
fn default_negative_cache_ttl() -> u64 { 10 }
fn default_max_block_skew() -> u64 { 1 }
fn default_failover_threshold() -> u32 { 3 }
fn default_cooldown_period() -> u64 { 60 }
fn default_max_concurrent_positions() -> u32 { 3 }
fn default_max_daily_loss() -> Decimal { dec!(500) }
fn default_max_drawdown() -> Decimal { dec!(0.2) }
fn default_max_portfolio_exposure() -> Decimal { dec!(0.5) }
fn default_assumed_loss_fraction() -> Decimal { dec!(0.1) }
fn default_starting_capital() -> Decimal { dec!(100000) }
fn default_shutdown_grace() -> u64 { 5 }
fn default_max_opportunities_per_block() -> usize { 3 }
fn default_log_dir() -> String { "output/logs".to_string() }
fn default_store_path() -> String { "data/opportunities.db".to_string() }
fn default_store_buffer_limit() -> usize { 10_000 }
fn default_store_outage_max() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_api_port() -> u16 { 3000 }
fn default_unhealthy_after() -> u64 { 30 }

impl Config {
    /// Loads configuration from `CONFIG_PATH` (default `config.json`),
    /// then applies environment overrides and validates. Any failure
    /// here is fatal at startup.
    pub fn load() -> ScanResult<Self> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> ScanResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScanError::config(format!("cannot read {path}: {e}")))?;
        let mut config: Config = serde_json::from_str(&raw)
            .map_err(|e| ScanError::config(format!("cannot parse {path}: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.min_profit_quote = env::var("MIN_PROFIT_QUOTE")
            .ok()
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or(self.min_profit_quote);
        self.min_margin = env::var("MIN_MARGIN")
            .ok()
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or(self.min_margin);
        self.safety_margin = env::var("SAFETY_MARGIN")
            .ok()
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or(self.safety_margin);
        self.max_gas_price_gwei = env::var("MAX_GAS_PRICE_GWEI")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.max_gas_price_gwei);
        self.scan_interval_secs = env::var("SCAN_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.scan_interval_secs);
        self.api_port = env::var("API_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.api_port);
        self.store_path = env::var("STORE_PATH").unwrap_or_else(|_| self.store_path.clone());
        self.batch_size = self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        self.max_opportunities_per_block = self
            .max_opportunities_per_block
            .clamp(1, MAX_EMISSIONS_PER_BLOCK);
    }

    fn validate(&self) -> ScanResult<()> {
        if self.endpoints.is_empty() {
            return Err(ScanError::config("at least one RPC endpoint is required"));
        }
        if self.venues.len() < 2 {
            return Err(ScanError::config(
                "cross-venue detection requires at least two venues",
            ));
        }
        for venue in &self.venues {
            if venue.fee_num == 0 || venue.fee_den == 0 || venue.fee_num >= venue.fee_den {
                return Err(ScanError::config(format!(
                    "venue {} has invalid fee {}/{}",
                    venue.name, venue.fee_num, venue.fee_den
                )));
            }
        }
        let registry = self.token_registry();
        if !registry.contains(&self.native_token) {
            return Err(ScanError::config("native_token missing from token table"));
        }
        for pair in &self.monitored_pairs {
            if pair.token_a == pair.token_b {
                return Err(ScanError::config("monitored pair references one token twice"));
            }
            if pair.quote_token != pair.token_a && pair.quote_token != pair.token_b {
                return Err(ScanError::config(format!(
                    "quote token {} is not part of its monitored pair",
                    pair.quote_token
                )));
            }
            for token in [&pair.token_a, &pair.token_b] {
                if !registry.contains(token) {
                    return Err(ScanError::config(format!(
                        "monitored pair references token {token} with unknown decimals"
                    )));
                }
            }
        }
        for cycle in &self.triangular_cycles {
            let [a, b, c] = cycle.tokens;
            if a == b || b == c || a == c {
                return Err(ScanError::config("triangular cycle tokens must be distinct"));
            }
            for token in &cycle.tokens {
                if !registry.contains(token) {
                    return Err(ScanError::config(format!(
                        "cycle references token {token} with unknown decimals"
                    )));
                }
            }
            if let Some(quote) = cycle.quote_token {
                if !cycle.tokens.contains(&quote) {
                    return Err(ScanError::config("cycle quote token must be part of the cycle"));
                }
            }
        }
        if self.safety_margin < Decimal::ZERO || self.safety_margin >= Decimal::ONE {
            return Err(ScanError::config("safety_margin must be in [0, 1)"));
        }
        if self.max_position_size_quote <= Decimal::ZERO {
            return Err(ScanError::config("max_position_size_quote must be positive"));
        }
        if self.min_position_size_quote > self.max_position_size_quote {
            return Err(ScanError::config(
                "min_position_size_quote exceeds max_position_size_quote",
            ));
        }
        if self.gas_buffer < Decimal::ONE {
            return Err(ScanError::config("gas_buffer must be >= 1"));
        }
        if self.store_buffer_limit == 0 {
            return Err(ScanError::config("store_buffer_limit must be positive"));
        }
        Ok(())
    }

    pub fn token_registry(&self) -> TokenRegistry {
        TokenRegistry::new(
            self.tokens
                .iter()
                .map(|t| Token {
                    address: t.address,
                    symbol: t.symbol.clone(),
                    decimals: t.decimals,
                })
                .collect(),
        )
    }

    pub fn venue_set(&self) -> VenueSet {
        VenueSet::new(
            self.venues
                .iter()
                .map(|v| Venue {
                    name: v.name.clone(),
                    factory: v.factory,
                    fee_num: v.fee_num,
                    fee_den: v.fee_den,
                })
                .collect(),
        )
    }

    pub fn monitored(&self) -> Vec<MonitoredPair> {
        self.monitored_pairs
            .iter()
            .map(|p| MonitoredPair {
                base: if p.token_a == p.quote_token { p.token_b } else { p.token_a },
                quote: p.quote_token,
            })
            .collect()
    }

    pub fn cycles(&self) -> Vec<Cycle> {
        self.triangular_cycles
            .iter()
            .map(|c| Cycle {
                tokens: c.tokens,
                quote: c.quote_token.unwrap_or(c.tokens[0]),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config_json() -> serde_json::Value {
        serde_json::json!({
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
        })
    }

    fn parse(value: serde_json::Value) -> ScanResult<Config> {
        let mut config: Config = serde_json::from_value(value)
            .map_err(|e| ScanError::config(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_apply() {
        let config = parse(base_config_json()).unwrap();
        assert_eq!(config.min_profit_quote, dec!(10));
        assert_eq!(config.min_margin, dec!(0.005));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_opportunities_per_block, 3);
        assert_eq!(config.venues[0].fee_num, 997);
        assert!(config.emit_rejected);
    }

    #[test]
    fn quote_token_must_belong_to_pair() {
        let mut json = base_config_json();
        json["monitored_pairs"][0]["quote_token"] =
            serde_json::json!("0x0000000000000000000000000000000000000001");
        assert!(parse(json).is_err());
    }

    #[test]
    fn single_venue_rejected() {
        let mut json = base_config_json();
        json["venues"].as_array_mut().unwrap().pop();
        assert!(parse(json).is_err());
    }

    #[test]
    fn unknown_token_decimals_rejected() {
        let mut json = base_config_json();
        json["tokens"].as_array_mut().unwrap().pop();
        assert!(parse(json).is_err());
    }

    #[test]
    fn monitored_base_is_the_non_quote_side() {
        let config = parse(base_config_json()).unwrap();
        let monitored = config.monitored();
        assert_eq!(monitored.len(), 1);
        assert_eq!(
            monitored[0].quote,
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".parse::<Address>().unwrap()
        );
        assert_eq!(
            monitored[0].base,
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse::<Address>().unwrap()
        );
    }
}
