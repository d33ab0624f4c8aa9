//! Binance ticker source (secondary).
//!
//! API: `GET /api/v3/ticker/price?symbol={symbol}`
//! Response: `{ "symbol": "BTCUSDT", "price": "64250.12000000" }`
//! The price arrives as a decimal string and is parsed without going
//! through a float.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Request};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{ensure_positive, PriceSource};
use crate::types::GameError;

const SOURCE_NAME: &str = "binance";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(default)]
    symbol: String,
    price: String,
}

pub struct BinanceSource {
    http: Client,
    base_url: String,
    symbol: String,
}

impl BinanceSource {
    pub fn new(base_url: &str, symbol: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("UPDOWN/0.1.0")
            .build()
            .context("Failed to build Binance HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
        })
    }

    fn request(&self) -> reqwest::Result<Request> {
        self.http
            .get(format!("{}/api/v3/ticker/price", self.base_url))
            .query(&[("symbol", self.symbol.as_str())])
            .build()
    }

    fn parse_price(body: &str, symbol: &str) -> Result<Decimal, GameError> {
        let malformed = |message: String| GameError::MalformedQuote {
            source_name: SOURCE_NAME.to_string(),
            message,
        };

        let ticker: TickerPrice =
            serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

        if !ticker.symbol.is_empty() && !ticker.symbol.eq_ignore_ascii_case(symbol) {
            return Err(malformed(format!(
                "expected {symbol}, got {}",
                ticker.symbol
            )));
        }

        let price = Decimal::from_str(ticker.price.trim())
            .map_err(|e| malformed(format!("bad price {:?}: {e}", ticker.price)))?;

        // Binance pads to 8 places.
        ensure_positive(SOURCE_NAME, price.normalize())
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn name(&self) -> String {
        SOURCE_NAME.to_string()
    }

    async fn fetch_price(&self) -> Result<Decimal> {
        let req = self.request().context("Failed to build Binance request")?;
        debug!(url = %req.url(), "Fetching Binance price");

        let resp = self
            .http
            .execute(req)
            .await
            .context("Binance request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Binance API error: {status}");
        }

        let body = resp
            .text()
            .await
            .context("Failed to read Binance response")?;

        Ok(Self::parse_price(&body, &self.symbol)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
