//! Full round lifecycle through the engine driver.
//!
//! Timers run fast (10ms tick, 20ms refresh) while the manual clock
//! decides when the betting and round windows close.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use updown::engine::driver::{self, DriverSettings, EngineHandle};
use updown::engine::round::{RoundEngine, RoundRules, RoundSnapshot};
use updown::feed::PriceFeed;
use updown::storage;
use updown::types::{Direction, GameError, Phase, RoundResult, StoredState};

use crate::mock_feed::{ManualClock, ScriptedSource};

struct Harness {
    handle: EngineHandle,
    task: tokio::task::JoinHandle<()>,
    primary: ScriptedSource,
    secondary: ScriptedSource,
    clock: ManualClock,
    state_file: String,
}

impl Harness {
    fn start(primary: ScriptedSource, secondary: ScriptedSource) -> Self {
        let clock = ManualClock::new();
        let state_file = std::env::temp_dir()
            .join(format!("updown_it_state_{}.json", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();

        let feed = PriceFeed::new(Box::new(primary.clone()), Box::new(secondary.clone()));
        let (handle, task) = driver::spawn(
            RoundEngine::new(StoredState::default(), RoundRules::default()),
            Arc::new(feed),
            Arc::new(clock.clone()),
            DriverSettings {
                tick_interval: Duration::from_millis(10),
                refresh_interval: Duration::from_millis(20),
                state_file: Some(state_file.clone()),
            },
        );

        Self {
            handle,
            task,
            primary,
            secondary,
            clock,
            state_file,
        }
    }

    async fn wait_until(&self, what: &str, f: impl FnMut(&RoundSnapshot) -> bool) -> RoundSnapshot {
        let mut rx = self.handle.subscribe();
        let snap = tokio::time::timeout(Duration::from_secs(3), rx.wait_for(f))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .expect("engine stopped");
        snap.clone()
    }

    async fn wait_for_open_round(&self) -> RoundSnapshot {
        self.wait_until("round open", |s| s.state.round_id.is_some()).await
    }

    fn stored(&self) -> Option<StoredState> {
        storage::load_state(Some(&self.state_file)).unwrap()
    }

    async fn stop(self) {
        self.handle.shutdown().await.unwrap();
        self.task.await.unwrap();
        let _ = std::fs::remove_file(&self.state_file);
    }
}

#[tokio::test]
async fn test_winning_round_end_to_end() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );

    let opened = h.wait_for_open_round().await;
    assert_eq!(opened.state.phase, Phase::Betting);
    assert_eq!(opened.state.round_start_price, dec!(100));
    assert_eq!(opened.seconds_remaining, 30);

    assert!(h.handle.place_bet(Direction::Up, dec!(100)).await.unwrap());
    assert_eq!(h.handle.snapshot().state.credits, dec!(900));
    assert_eq!(h.stored().unwrap().credits, dec!(900));

    h.primary.set_price(dec!(105));
    h.wait_until("price refresh", |s| s.state.current_price == dec!(105)).await;

    h.clock.advance_secs(30);
    h.wait_until("betting closed", |s| s.state.phase == Phase::Playing).await;
    assert!(!h.handle.place_bet(Direction::Down, dec!(10)).await.unwrap());

    h.clock.advance_secs(150);
    let settled = h.wait_until("settlement", |s| s.state.phase == Phase::Result).await;
    assert_eq!(settled.state.result, Some(RoundResult::Win));
    assert_eq!(settled.state.win_amount, dec!(195));
    assert_eq!(settled.state.credits, dec!(1095));
    assert_eq!(h.stored().unwrap().credits, dec!(1095));
    assert_eq!(h.stored().unwrap().jackpot, dec!(10000));

    h.stop().await;
}

#[tokio::test]
async fn test_repeated_ticks_do_not_double_settle() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );
    h.wait_for_open_round().await;
    assert!(h.handle.place_bet(Direction::Down, dec!(200)).await.unwrap());

    h.primary.set_price(dec!(90));
    h.wait_until("price refresh", |s| s.state.current_price == dec!(90)).await;

    h.clock.advance_secs(500);
    h.wait_until("settlement", |s| s.state.phase == Phase::Result).await;

    // Many more ticks fire while we sit here.
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.clock.advance_secs(500);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let s = h.handle.snapshot().state;
    assert_eq!(s.result, Some(RoundResult::Win));
    assert_eq!(s.credits, dec!(800) + dec!(390));
    assert_eq!(s.phase, Phase::Result);

    h.stop().await;
}

#[tokio::test]
async fn test_acknowledge_opens_next_round() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );
    let first = h.wait_for_open_round().await.state.round_id;

    // Not settled yet: acknowledgement is ignored.
    assert!(!h.handle.acknowledge_result().await.unwrap());

    h.handle.place_bet(Direction::Up, dec!(50)).await.unwrap();
    h.clock.advance_secs(180);
    h.wait_until("settlement", |s| s.state.phase == Phase::Result).await;
    // Flat price: UP misses.
    assert_eq!(h.handle.snapshot().state.result, Some(RoundResult::Miss));

    h.primary.set_price(dec!(120));
    assert!(h.handle.acknowledge_result().await.unwrap());
    let next = h
        .wait_until("next round", |s| s.state.phase == Phase::Betting && s.state.round_id != first)
        .await;

    assert_eq!(next.state.round_start_price, dec!(120));
    assert!(next.state.bet.direction.is_none());
    assert_eq!(next.state.bet.amount, Decimal::ZERO);
    assert!(next.state.result.is_none());
    assert_eq!(next.state.credits, dec!(950));

    h.stop().await;
}

#[tokio::test]
async fn test_no_bet_round_moves_no_credits() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );
    h.wait_for_open_round().await;

    h.primary.set_price(dec!(140));
    h.clock.advance_secs(180);
    let s = h.wait_until("settlement", |s| s.state.phase == Phase::Result).await;

    assert!(s.state.result.is_none());
    assert_eq!(s.state.credits, dec!(1000));
    // Nothing changed, so nothing was written.
    assert!(h.stored().is_none());

    h.stop().await;
}

#[tokio::test]
async fn test_secondary_used_when_primary_down() {
    let h = Harness::start(
        ScriptedSource::failing("primary"),
        ScriptedSource::quoting("secondary", dec!(64000)),
    );
    let s = h.wait_for_open_round().await;
    assert_eq!(s.state.round_start_price, dec!(64000));
    assert!(s.state.feed_error.is_none());
    assert!(h.primary.calls() >= 1);

    h.stop().await;
}

#[tokio::test]
async fn test_secondary_untouched_when_primary_up() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::quoting("secondary", dec!(999)),
    );
    h.wait_for_open_round().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.primary.calls() >= 2);
    assert_eq!(h.secondary.calls(), 0);
    assert_eq!(h.handle.snapshot().state.current_price, dec!(100));

    h.stop().await;
}

#[tokio::test]
async fn test_feed_down_at_startup_then_retry() {
    let h = Harness::start(
        ScriptedSource::failing("primary"),
        ScriptedSource::failing("secondary"),
    );
    let s = h.wait_until("feed error", |s| s.state.feed_error.is_some()).await;
    assert!(s.state.round_id.is_none());
    assert!(s.state.feed_error.as_deref().unwrap().contains("unavailable"));

    // No round yet, so no bets.
    assert!(!h.handle.place_bet(Direction::Up, dec!(10)).await.unwrap());
    assert_eq!(h.handle.snapshot().state.credits, dec!(1000));

    // The acknowledgement and the next refresh race to open the round.
    // Whichever wins, exactly one round opens at the recovered price.
    h.secondary.set_price(dec!(101));
    h.handle.acknowledge_result().await.unwrap();
    let s = h.wait_for_open_round().await;
    assert_eq!(s.state.round_start_price, dec!(101));
    assert!(s.state.feed_error.is_none());

    h.stop().await;
}

#[tokio::test]
async fn test_feed_recovery_opens_round_without_acknowledge() {
    let h = Harness::start(
        ScriptedSource::failing("primary"),
        ScriptedSource::failing("secondary"),
    );
    h.wait_until("feed error", |s| s.state.feed_error.is_some()).await;

    h.primary.set_price(dec!(100));
    let s = h.wait_for_open_round().await;
    assert_eq!(s.state.phase, Phase::Betting);
    assert_eq!(s.state.round_start_price, dec!(100));
    assert!(s.state.betting_ends_at.is_some());
    assert!(s.state.feed_error.is_none());

    assert!(h.handle.place_bet(Direction::Up, dec!(10)).await.unwrap());

    h.stop().await;
}

#[tokio::test]
async fn test_refresh_failure_keeps_last_price() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );
    h.wait_for_open_round().await;

    h.primary.fail();
    let s = h.wait_until("feed error", |s| s.state.feed_error.is_some()).await;
    assert_eq!(s.state.current_price, dec!(100));
    assert_eq!(s.state.phase, Phase::Betting);

    h.primary.set_price(dec!(101));
    let s = h
        .wait_until("recovery", |s| s.state.feed_error.is_none() && s.state.current_price == dec!(101))
        .await;
    assert_eq!(s.state.round_start_price, dec!(100));

    h.stop().await;
}

#[tokio::test]
async fn test_insufficient_credits_ignored() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );
    h.wait_for_open_round().await;

    assert!(!h.handle.place_bet(Direction::Up, dec!(1000.01)).await.unwrap());
    assert!(h.handle.place_bet(Direction::Up, dec!(1000)).await.unwrap());
    assert_eq!(h.handle.snapshot().state.credits, Decimal::ZERO);
    assert_eq!(h.handle.snapshot().suggested_stake, Decimal::ZERO);

    h.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_engine() {
    let h = Harness::start(
        ScriptedSource::quoting("primary", dec!(100)),
        ScriptedSource::failing("secondary"),
    );
    h.wait_for_open_round().await;
    let handle = h.handle.clone();
    let file = h.state_file.clone();
    h.stop().await;

    let err = handle.place_bet(Direction::Up, dec!(1)).await.unwrap_err();
    assert!(matches!(err, GameError::EngineStopped));
    // The last snapshot is still readable.
    assert_eq!(handle.snapshot().state.phase, Phase::Betting);
    assert!(storage::load_state(Some(&file)).unwrap().is_none());
}
