//! CoinGecko simple-price source (primary).
//!
//! API: `GET /api/v3/simple/price?ids={asset}&vs_currencies=usd`
//! Auth: none for the public tier.
//! Response: `{ "bitcoin": { "usd": 64250.12 } }`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Request};
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{ensure_positive, PriceSource};
use crate::types::GameError;

const SOURCE_NAME: &str = "coingecko";

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

pub struct CoinGeckoSource {
    http: Client,
    base_url: String,
    asset_id: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, asset_id: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("UPDOWN/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            asset_id: asset_id.to_string(),
        })
    }

    fn request(&self) -> reqwest::Result<Request> {
        self.http
            .get(format!("{}/api/v3/simple/price", self.base_url))
            .query(&[("ids", self.asset_id.as_str()), ("vs_currencies", "usd")])
            .build()
    }

    /// Pull `<asset>.usd` out of a simple-price body.
    fn parse_price(body: &str, asset_id: &str) -> Result<Decimal, GameError> {
        let malformed = |message: String| GameError::MalformedQuote {
            source_name: SOURCE_NAME.to_string(),
            message,
        };

        let quotes: HashMap<String, UsdQuote> =
            serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

        let usd = quotes
            .get(asset_id)
            .and_then(|q| q.usd)
            .ok_or_else(|| malformed(format!("missing {asset_id}.usd")))?;

        let price = Decimal::from_f64(usd)
            .ok_or_else(|| malformed(format!("unrepresentable price {usd}")))?;

        ensure_positive(SOURCE_NAME, price)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> String {
        SOURCE_NAME.to_string()
    }

    async fn fetch_price(&self) -> Result<Decimal> {
        let req = self.request().context("Failed to build CoinGecko request")?;
        debug!(url = %req.url(), "Fetching CoinGecko price");

        let resp = self
            .http
            .execute(req)
            .await
            .context("CoinGecko request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("CoinGecko API error: {status}");
        }

        let body = resp
            .text()
            .await
            .context("Failed to read CoinGecko response")?;

        Ok(Self::parse_price(&body, &self.asset_id)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
