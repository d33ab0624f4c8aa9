//! Configuration loading from TOML.
//!
//! Reads `config.toml` (or the path in `UPDOWN_CONFIG`) and deserializes
//! into strongly-typed structs. Every field has a default, so a missing
//! file or a partial file is fine.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::types::{GameError, StoredState, DEFAULT_CREDITS, DEFAULT_JACKPOT};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub game: GameConfig,
    pub feed: FeedConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    pub betting_window_secs: u64,
    pub round_window_secs: u64,
    pub payout_multiplier: Decimal,
    pub initial_credits: Decimal,
    pub initial_jackpot: Decimal,
    pub state_file: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            betting_window_secs: 30,
            round_window_secs: 180,
            payout_multiplier: dec!(1.95),
            initial_credits: DEFAULT_CREDITS,
            initial_jackpot: DEFAULT_JACKPOT,
            state_file: "updown_state.json".to_string(),
        }
    }
}

impl GameConfig {
    /// Snapshot used when nothing has been persisted yet.
    pub fn initial_state(&self) -> StoredState {
        StoredState {
            credits: self.initial_credits,
            jackpot: self.initial_jackpot,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub primary_base_url: String,
    pub secondary_base_url: String,
    /// CoinGecko coin id.
    pub asset_id: String,
    /// Binance ticker symbol.
    pub symbol: String,
    pub timeout_secs: u64,
    pub refresh_interval_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            primary_base_url: "https://api.coingecko.com".to_string(),
            secondary_base_url: "https://api.binance.com".to_string(),
            asset_id: "bitcoin".to_string(),
            symbol: "BTCUSDT".to_string(),
            timeout_secs: 10,
            refresh_interval_ms: 5_000,
            tick_interval_ms: 1_000,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the round engine can't honour.
    pub fn validate(&self) -> Result<(), GameError> {
        let g = &self.game;
        if g.betting_window_secs == 0 || g.round_window_secs == 0 {
            return Err(GameError::Config("round windows must be non-zero".into()));
        }
        if g.betting_window_secs > g.round_window_secs {
            return Err(GameError::Config(format!(
                "betting window ({}s) exceeds round window ({}s)",
                g.betting_window_secs, g.round_window_secs
            )));
        }
        if g.payout_multiplier <= Decimal::ZERO {
            return Err(GameError::Config("payout_multiplier must be positive".into()));
        }
        if g.initial_credits < Decimal::ZERO || g.initial_jackpot < Decimal::ZERO {
            return Err(GameError::Config("initial balances must be non-negative".into()));
        }
        let f = &self.feed;
        if f.refresh_interval_ms == 0 || f.tick_interval_ms == 0 {
            return Err(GameError::Config("feed intervals must be non-zero".into()));
        }
        Ok(())
    }
}
