//! Layered settings: defaults, optional TOML file, `STOCKBOT__*` environment,
//! then the legacy flat variables (`ALPACA_KEY`, `SMA_SMALL`, ...).

use crate::api::alpaca::{LIVE_TRADING_URL, MARKET_DATA_URL, PAPER_TRADING_URL};
use crate::api::stream::{IEX_STREAM_URL, LIVE_TRADE_STREAM_URL, PAPER_TRADE_STREAM_URL};
use crate::api::{AlpacaConfig, StreamConfig};
use crate::models::Resolution;
use crate::registry::SeedConfig;
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config/stockbot";

const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("ALPACA_KEY", "alpaca.key_id"),
    ("ALPACA_SECRET", "alpaca.secret_key"),
    ("RESOLUTION", "strategy.resolution"),
    ("SMA_SMALL", "strategy.short_window"),
    ("SMA_LARGE", "strategy.long_window"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub alpaca: AlpacaSettings,
    pub strategy: StrategySettings,
    pub instruments_path: PathBuf,
    pub polling: PollingSettings,
    pub execution: ExecutionSettings,
    pub server: ServerSettings,
    pub require_open_market: bool,
    pub baseline_equity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaSettings {
    pub key_id: String,
    pub secret_key: String,
    pub paper: bool,
    pub trading_url: Option<String>,
    pub data_url: String,
    pub feed: String,
    pub stream_url: String,
    pub trade_stream_url: Option<String>,
    pub request_timeout_secs: u64,
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategySettings {
    pub resolution: Resolution,
    pub short_window: usize,
    pub long_window: usize,
    pub seed_lookback_multiplier: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingSettings {
    pub interval_secs: u64,
    pub window_secs: u64,
    pub clock_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    pub dispatch_timeout_secs: u64,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Settings {
    /// Load from `path` (or `config/stockbot.*` if present) plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = defaults(Config::builder())?
            .add_source(file)
            .add_source(
                Environment::with_prefix("STOCKBOT")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        builder.build()?.try_deserialize()
    }

    /// Defaults only; no file, no environment
    pub fn defaults() -> Result<Self, ConfigError> {
        defaults(Config::builder())?.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alpaca.key_id.is_empty() || self.alpaca.secret_key.is_empty() {
            return Err(ConfigError::Message(
                "Alpaca credentials missing: set ALPACA_KEY/ALPACA_SECRET or alpaca.key_id/alpaca.secret_key"
                    .to_string(),
            ));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Message(
                "polling.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn alpaca_config(&self) -> AlpacaConfig {
        let trading_url = self.alpaca.trading_url.clone().unwrap_or_else(|| {
            if self.alpaca.paper {
                PAPER_TRADING_URL.to_string()
            } else {
                LIVE_TRADING_URL.to_string()
            }
        });

        AlpacaConfig {
            key_id: self.alpaca.key_id.clone(),
            secret_key: self.alpaca.secret_key.clone(),
            trading_url,
            data_url: self.alpaca.data_url.clone(),
            feed: self.alpaca.feed.clone(),
            request_timeout: Duration::from_secs(self.alpaca.request_timeout_secs),
            rate_limit_per_minute: self.alpaca.rate_limit_per_minute,
        }
    }

    pub fn bar_stream_config(&self) -> StreamConfig {
        StreamConfig::new(
            self.alpaca.stream_url.clone(),
            self.alpaca.key_id.clone(),
            self.alpaca.secret_key.clone(),
        )
    }

    pub fn trade_stream_config(&self) -> StreamConfig {
        let url = self.alpaca.trade_stream_url.clone().unwrap_or_else(|| {
            if self.alpaca.paper {
                PAPER_TRADE_STREAM_URL.to_string()
            } else {
                LIVE_TRADE_STREAM_URL.to_string()
            }
        });
        StreamConfig::new(url, self.alpaca.key_id.clone(), self.alpaca.secret_key.clone())
    }

    pub fn seed_config(&self) -> SeedConfig {
        SeedConfig {
            resolution: self.strategy.resolution,
            short_window: self.strategy.short_window,
            long_window: self.strategy.long_window,
            lookback_multiplier: self.strategy.seed_lookback_multiplier,
        }
    }
}

fn defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("alpaca.key_id", "")?
        .set_default("alpaca.secret_key", "")?
        .set_default("alpaca.paper", true)?
        .set_default("alpaca.data_url", MARKET_DATA_URL)?
        .set_default("alpaca.feed", "iex")?
        .set_default("alpaca.stream_url", IEX_STREAM_URL)?
        .set_default("alpaca.request_timeout_secs", 10)?
        .set_default("alpaca.rate_limit_per_minute", 200)?
        .set_default("strategy.resolution", "1Min")?
        .set_default("strategy.short_window", 20)?
        .set_default("strategy.long_window", 50)?
        .set_default("strategy.seed_lookback_multiplier", 1)?
        .set_default("instruments_path", "./data/data.csv")?
        .set_default("polling.interval_secs", 30)?
        .set_default("polling.window_secs", 15)?
        .set_default("polling.clock_ttl_secs", 30)?
        .set_default("execution.dispatch_timeout_secs", 15)?
        .set_default("execution.queue_capacity", 256)?
        .set_default("server.port", 3000)?
        .set_default("server.static_dir", "public")?
        .set_default("require_open_market", true)
}
