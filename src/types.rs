//! Shared types for the UPDOWN game.
//!
//! The round data model, the persisted snapshot, and the domain error
//! type. Engine, feed, storage, and API modules all depend on these
//! without depending on each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Round phase. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Bets accepted.
    Betting,
    /// Locked, awaiting settlement.
    Playing,
    /// Settled, awaiting acknowledgement.
    Result,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Betting => write!(f, "BETTING"),
            Phase::Playing => write!(f, "PLAYING"),
            Phase::Result => write!(f, "RESULT"),
        }
    }
}

/// Which way the player expects the price to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Outcome of a settled round that had a bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundResult {
    Win,
    Miss,
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundResult::Win => write!(f, "WIN"),
            RoundResult::Miss => write!(f, "MISS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// The player's stake for the current round.
///
/// `amount > 0` if and only if `direction` is set. Use [`Bet::none`] and
/// [`Bet::new`] rather than building one by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub amount: Decimal,
    pub direction: Option<Direction>,
}

impl Bet {
    pub fn none() -> Self {
        Self {
            amount: Decimal::ZERO,
            direction: None,
        }
    }

    pub fn new(direction: Direction, amount: Decimal) -> Self {
        Self {
            amount,
            direction: Some(direction),
        }
    }

    pub fn is_placed(&self) -> bool {
        self.direction.is_some() && self.amount > Decimal::ZERO
    }
}

impl Default for Bet {
    fn default() -> Self {
        Self::none()
    }
}

// ---------------------------------------------------------------------------
// Round state
// ---------------------------------------------------------------------------

/// Everything the engine knows about the game. Serialised as-is for the
/// presentation layer; only `credits` and `jackpot` are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    pub credits: Decimal,
    /// Display-only. Nothing in the engine changes it.
    pub jackpot: Decimal,
    pub current_price: Decimal,
    pub round_start_price: Decimal,
    /// Zero when no bet has been placed this round.
    pub bet_placement_price: Decimal,
    pub betting_ends_at: Option<DateTime<Utc>>,
    pub round_ends_at: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub bet: Bet,
    pub result: Option<RoundResult>,
    pub win_amount: Decimal,
    /// `None` until the first round opens.
    pub round_id: Option<Uuid>,
    /// Set when the last price fetch failed, cleared by the next success.
    pub feed_error: Option<String>,
}

impl RoundState {
    /// Fresh state before any round has opened.
    pub fn new(stored: StoredState) -> Self {
        Self {
            credits: stored.credits,
            jackpot: stored.jackpot,
            current_price: Decimal::ZERO,
            round_start_price: Decimal::ZERO,
            bet_placement_price: Decimal::ZERO,
            betting_ends_at: None,
            round_ends_at: None,
            phase: Phase::Betting,
            bet: Bet::none(),
            result: None,
            win_amount: Decimal::ZERO,
            round_id: None,
            feed_error: None,
        }
    }

    /// Whether a round has been opened (the initial open may have failed).
    pub fn is_round_open(&self) -> bool {
        self.betting_ends_at.is_some() && self.round_ends_at.is_some()
    }

    /// The subset that survives restarts.
    pub fn stored(&self) -> StoredState {
        StoredState {
            credits: self.credits,
            jackpot: self.jackpot,
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | credits={:.2} | price=${:.2} | bet={}",
            self.phase,
            self.credits,
            self.current_price,
            match self.bet.direction {
                Some(d) => format!("{d} {:.2}", self.bet.amount),
                None => "none".to_string(),
            },
        )?;
        if let Some(result) = self.result {
            write!(f, " | result={result} won={:.2}", self.win_amount)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persisted snapshot
// ---------------------------------------------------------------------------

pub const DEFAULT_CREDITS: Decimal = dec!(1000);
pub const DEFAULT_JACKPOT: Decimal = dec!(10000);

/// Key-value snapshot written to disk. Decimals are stored as strings so
/// reloading yields exactly what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(with = "rust_decimal::serde::str")]
    pub credits: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub jackpot: Decimal,
}

impl Default for StoredState {
    fn default() -> Self {
        Self {
            credits: DEFAULT_CREDITS,
            jackpot: DEFAULT_JACKPOT,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for UPDOWN.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Price feed unavailable (primary: {primary}; secondary: {secondary})")]
    FeedUnavailable { primary: String, secondary: String },

    #[error("Malformed quote from {source_name}: {message}")]
    MalformedQuote { source_name: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Round engine has stopped")]
    EngineStopped,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
