//! Round engine: the phase state machine.
//!
//! Owns the single `RoundState` and is the only thing that mutates it.
//! Every operation is synchronous and takes `now` explicitly; fetching
//! prices and running timers is the driver's job.
//!
//! BETTING --(now >= betting_ends_at)--> PLAYING
//! PLAYING --(now >= round_ends_at)----> RESULT (settlement)
//! RESULT  --(acknowledge + open)------> BETTING (new round)

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::settlement::{self, Settlement, DEFAULT_PAYOUT_MULTIPLIER};
use crate::config::GameConfig;
use crate::types::{Bet, Direction, Phase, RoundState, StoredState};

/// Default stake offered to the player when they have enough credits.
const DEFAULT_STAKE: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Fixed parameters of every round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundRules {
    pub betting_window: Duration,
    pub round_window: Duration,
    pub payout_multiplier: Decimal,
}

impl Default for RoundRules {
    fn default() -> Self {
        Self {
            betting_window: Duration::seconds(30),
            round_window: Duration::seconds(180),
            payout_multiplier: DEFAULT_PAYOUT_MULTIPLIER,
        }
    }
}

impl From<&GameConfig> for RoundRules {
    fn from(cfg: &GameConfig) -> Self {
        Self {
            betting_window: Duration::seconds(cfg.betting_window_secs as i64),
            round_window: Duration::seconds(cfg.round_window_secs as i64),
            payout_multiplier: cfg.payout_multiplier,
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions & snapshot
// ---------------------------------------------------------------------------

/// A phase change produced by `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// BETTING → PLAYING.
    BettingClosed,
    /// PLAYING → RESULT. `None` when the round had no bet.
    Settled(Option<Settlement>),
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSnapshot {
    #[serde(flatten)]
    pub state: RoundState,
    /// Change since bet placement; absent without a bet.
    pub price_change: Option<Decimal>,
    /// The deadline the countdown should show.
    pub active_deadline: Option<DateTime<Utc>>,
    pub seconds_remaining: i64,
    pub suggested_stake: Decimal,
    pub as_of: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RoundEngine {
    state: RoundState,
    rules: RoundRules,
}

impl RoundEngine {
    /// Start from a persisted snapshot. No round is open until
    /// `open_round` succeeds.
    pub fn new(stored: StoredState, rules: RoundRules) -> Self {
        Self {
            state: RoundState::new(stored),
            rules,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    // -- Round lifecycle -------------------------------------------------

    /// Apply a successful open: anchor both windows to `now`, reset the
    /// per-round fields, and enter BETTING.
    pub fn open_round(&mut self, price: Decimal, now: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        let betting_ends = now + self.rules.betting_window;
        let round_ends = now + self.rules.round_window;
        let s = &mut self.state;

        s.round_start_price = price;
        s.current_price = price;
        s.bet_placement_price = Decimal::ZERO;
        s.betting_ends_at = Some(betting_ends);
        s.round_ends_at = Some(round_ends);
        s.phase = Phase::Betting;
        s.bet = Bet::none();
        s.result = None;
        s.win_amount = Decimal::ZERO;
        s.round_id = Some(id);
        s.feed_error = None;

        info!(
            round_id = %id,
            start_price = %price,
            betting_ends_at = %betting_ends,
            round_ends_at = %round_ends,
            "Round opened"
        );
        id
    }

    /// Whether an acknowledgement should open a new round: the last round
    /// is settled, or no round has opened yet because the feed was down.
    pub fn awaiting_open(&self) -> bool {
        self.state.phase == Phase::Result || !self.state.is_round_open()
    }

    /// Price refreshes only matter while a round can still change.
    pub fn accepts_price_updates(&self) -> bool {
        matches!(self.state.phase, Phase::Betting | Phase::Playing)
    }

    pub fn record_price(&mut self, price: Decimal) {
        self.state.current_price = price;
        self.state.feed_error = None;
    }

    /// Flag a failed fetch for display. Nothing else changes.
    pub fn record_feed_failure(&mut self, message: impl Into<String>) {
        self.state.feed_error = Some(message.into());
    }

    // -- Bets ------------------------------------------------------------

    /// Whether `place_bet(_, amount)` would currently be accepted.
    pub fn can_bet(&self, amount: Decimal) -> bool {
        let s = &self.state;
        s.phase == Phase::Betting
            && s.is_round_open()
            && s.bet.direction.is_none()
            && amount > Decimal::ZERO
            && amount <= s.credits
    }

    /// Accept a bet at the current price. Anything that fails a
    /// precondition is ignored and returns `false`.
    pub fn place_bet(&mut self, direction: Direction, amount: Decimal) -> bool {
        if !self.can_bet(amount) {
            debug!(
                direction = %direction,
                amount = %amount,
                phase = %self.state.phase,
                credits = %self.state.credits,
                "Bet ignored"
            );
            return false;
        }

        let s = &mut self.state;
        s.credits -= amount;
        s.bet = Bet::new(direction, amount);
        s.bet_placement_price = s.current_price;

        info!(
            round_id = ?s.round_id,
            direction = %direction,
            amount = %amount,
            placement_price = %s.bet_placement_price,
            credits = %s.credits,
            "Bet placed"
        );
        true
    }

    // -- Phase advance -----------------------------------------------------

    /// Advance the phase if a deadline has passed. Repeated calls after a
    /// threshold produce nothing further.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Transition> {
        let mut transitions = Vec::new();

        if self.state.phase == Phase::Betting {
            match self.state.betting_ends_at {
                Some(ends) if now >= ends => {
                    self.state.phase = Phase::Playing;
                    info!(round_id = ?self.state.round_id, "Betting closed");
                    transitions.push(Transition::BettingClosed);
                }
                _ => return transitions,
            }
        }

        if self.state.phase == Phase::Playing {
            if let Some(ends) = self.state.round_ends_at {
                if now >= ends {
                    transitions.push(Transition::Settled(self.settle()));
                }
            }
        }

        transitions
    }

    /// Resolve the round against the last known price and enter RESULT.
    fn settle(&mut self) -> Option<Settlement> {
        let s = &mut self.state;
        let outcome = settlement::evaluate(
            &s.bet,
            s.bet_placement_price,
            s.current_price,
            self.rules.payout_multiplier,
        );

        match outcome {
            Some(settled) => {
                s.credits = s.credits.saturating_add(settled.win_amount);
                s.result = Some(settled.result);
                s.win_amount = settled.win_amount;
                info!(
                    round_id = ?s.round_id,
                    result = %settled.result,
                    placement_price = %s.bet_placement_price,
                    final_price = %s.current_price,
                    change_pct = format!("{:.4}%", settled.price_change * dec!(100)),
                    win_amount = %settled.win_amount,
                    credits = %s.credits,
                    "Round settled"
                );
            }
            None => {
                s.result = None;
                s.win_amount = Decimal::ZERO;
                info!(round_id = ?s.round_id, "Round ended without a bet");
            }
        }

        s.phase = Phase::Result;
        outcome
    }

    // -- Derived display values ------------------------------------------

    pub fn price_change(&self) -> Option<Decimal> {
        let s = &self.state;
        if !s.bet.is_placed() || s.bet_placement_price.is_zero() {
            return None;
        }
        Some(settlement::price_change(s.bet_placement_price, s.current_price))
    }

    pub fn active_deadline(&self) -> Option<DateTime<Utc>> {
        match self.state.phase {
            Phase::Betting => self.state.betting_ends_at,
            _ => self.state.round_ends_at,
        }
    }

    /// Whole seconds left on the active deadline, never negative.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.active_deadline()
            .map(|d| (d - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    pub fn suggested_stake(&self) -> Decimal {
        DEFAULT_STAKE.min(self.state.credits)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> RoundSnapshot {
        RoundSnapshot {
            state: self.state.clone(),
            price_change: self.price_change(),
            active_deadline: self.active_deadline(),
            seconds_remaining: self.time_remaining(now),
            suggested_stake: self.suggested_stake(),
            as_of: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
