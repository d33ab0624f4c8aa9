//! Outcome evaluation.
//!
//! Compares the price at bet placement with the price at round end and
//! decides WIN/MISS and the payout. Pure and deterministic given
//! `(placement_price, final_price, direction)`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{Bet, Direction, RoundResult};

/// Payout on a winning bet, as a multiple of the stake (house edge ≈ 2.5%).
pub const DEFAULT_PAYOUT_MULTIPLIER: Decimal = dec!(1.95);

/// Result of evaluating one bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub result: RoundResult,
    /// Credited back to the player. Zero on a miss.
    pub win_amount: Decimal,
    /// Fractional change from placement to final price.
    pub price_change: Decimal,
}

/// Fractional price change. A zero reference price yields zero change.
pub fn price_change(reference: Decimal, current: Decimal) -> Decimal {
    if reference.is_zero() {
        return Decimal::ZERO;
    }
    (current - reference) / reference
}

/// Evaluate a placed bet. Returns `None` when `bet` carries no direction.
/// Payouts saturate at `Decimal::MAX`.
///
/// Only a strictly positive change counts as "up". An unchanged price is
/// treated as "down", so UP loses and DOWN wins on a flat round.
pub fn evaluate(
    bet: &Bet,
    placement_price: Decimal,
    final_price: Decimal,
    multiplier: Decimal,
) -> Option<Settlement> {
    let direction = bet.direction?;
    if bet.amount <= Decimal::ZERO {
        return None;
    }

    let change = price_change(placement_price, final_price);
    let is_up = change > Decimal::ZERO;
    let is_win = match direction {
        Direction::Up => is_up,
        Direction::Down => !is_up,
    };

    let (result, win_amount) = if is_win {
        (RoundResult::Win, bet.amount.saturating_mul(multiplier))
    } else {
        (RoundResult::Miss, Decimal::ZERO)
    };

    Some(Settlement {
        result,
        win_amount,
        price_change: change,
    })
}
