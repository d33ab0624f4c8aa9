//! Price feed.
//!
//! Defines the `PriceSource` trait, the two concrete quote sources
//! (CoinGecko primary, Binance secondary), and `PriceFeed`, the two-tier
//! failover wrapper the round engine depends on.
//!
//! There is no retry or backoff here. A failed `fetch_price` is simply
//! reported; the engine's polling cadence is the retry.

pub mod binance;
pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::types::GameError;

use binance::BinanceSource;
use coingecko::CoinGeckoSource;

/// Abstraction over a single read-only USD price quote endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Source name for logging and the quote record.
    fn name(&self) -> String;

    /// Fetch the current USD price. Any transport, status, or schema
    /// problem is an error; a returned price is always positive.
    async fn fetch_price(&self) -> Result<Decimal>;
}

/// A successfully fetched price.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub source: String,
}

/// Primary-then-secondary price feed.
pub struct PriceFeed {
    primary: Box<dyn PriceSource>,
    secondary: Box<dyn PriceSource>,
}

impl PriceFeed {
    pub fn new(primary: Box<dyn PriceSource>, secondary: Box<dyn PriceSource>) -> Self {
        Self { primary, secondary }
    }

    /// CoinGecko primary, Binance secondary, as configured.
    pub fn from_config(cfg: &FeedConfig) -> Result<Self> {
        let primary = CoinGeckoSource::new(&cfg.primary_base_url, &cfg.asset_id, cfg.timeout())?;
        let secondary = BinanceSource::new(&cfg.secondary_base_url, &cfg.symbol, cfg.timeout())?;
        Ok(Self::new(Box::new(primary), Box::new(secondary)))
    }

    /// Query the primary, fall back to the secondary on any failure.
    pub async fn fetch_price(&self) -> Result<Quote, GameError> {
        let primary_err = match self.primary.fetch_price().await {
            Ok(price) => return Ok(self.quote(price, self.primary.name())),
            Err(e) => e,
        };

        warn!(
            primary = %self.primary.name(),
            fallback = %self.secondary.name(),
            error = %primary_err,
            "Primary price source failed, falling back"
        );

        match self.secondary.fetch_price().await {
            Ok(price) => Ok(self.quote(price, self.secondary.name())),
            Err(secondary_err) => Err(GameError::FeedUnavailable {
                primary: format!("{primary_err:#}"),
                secondary: format!("{secondary_err:#}"),
            }),
        }
    }

    fn quote(&self, price: Decimal, source: String) -> Quote {
        debug!(price = %price, source = %source, "Price fetched");
        Quote { price, source }
    }
}

/// Shared check for parsed prices. A zero or negative quote would poison
/// settlement, so it counts as malformed.
pub(crate) fn ensure_positive(source: &str, price: Decimal) -> Result<Decimal, GameError> {
    if price <= Decimal::ZERO {
        return Err(GameError::MalformedQuote {
            source_name: source.to_string(),
            message: format!("non-positive price {price}"),
        });
    }
    Ok(price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
