//! Core engine: the round lifecycle.
//!
//! `round` is the pure state machine, `settlement` the outcome maths, and
//! `driver` the single-owner task that feeds both from timers, the price
//! feed, and player commands.

pub mod driver;
pub mod round;
pub mod settlement;

use chrono::{DateTime, Utc};

/// Source of "now" for the driver. Swappable so rounds can be driven
/// through their windows without waiting on the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
