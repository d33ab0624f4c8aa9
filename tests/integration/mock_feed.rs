//! Scripted price source and manual clock for integration testing.
//!
//! Both are cheap clones over shared state, so a test keeps one copy to
//! steer prices and time while the engine owns the other.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use updown::engine::Clock;
use updown::feed::PriceSource;

/// A price source whose quote (or failure) is set from test code.
#[derive(Clone)]
pub struct ScriptedSource {
    name: String,
    /// `None` makes every fetch fail.
    price: Arc<Mutex<Option<Decimal>>>,
    calls: Arc<Mutex<u64>>,
}

impl ScriptedSource {
    pub fn quoting(name: &str, price: Decimal) -> Self {
        Self {
            name: name.to_string(),
            price: Arc::new(Mutex::new(Some(price))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            price: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        *self.price.lock().unwrap() = Some(price);
    }

    pub fn fail(&self) {
        *self.price.lock().unwrap() = None;
    }

    pub fn calls(&self) -> u64 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn fetch_price(&self) -> Result<Decimal> {
        *self.calls.lock().unwrap() += 1;
        let price = *self.price.lock().unwrap();
        price.ok_or_else(|| anyhow!("{} unavailable", self.name))
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        *self.now.lock().unwrap() += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
