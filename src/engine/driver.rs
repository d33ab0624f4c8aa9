//! Engine driver: the task that owns the `RoundEngine`.
//!
//! Everything that touches round state funnels through one tokio task:
//! - a phase-check interval (default 1s) calling `tick`,
//! - a price-refresh interval (default 5s) spawning feed fetches,
//! - player commands arriving over an mpsc channel,
//! - fetch completions arriving over an internal channel.
//!
//! Fetches run in their own tasks so a slow feed never holds up the
//! timers; their results are applied on this task like any other event.
//! Observers get read-only snapshots over a `watch` channel.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::round::{RoundEngine, RoundSnapshot, Transition};
use super::Clock;
use crate::config::AppConfig;
use crate::feed::{PriceFeed, Quote};
use crate::storage;
use crate::types::{Direction, GameError, StoredState};

const COMMAND_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Settings & commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub tick_interval: Duration,
    pub refresh_interval: Duration,
    /// Where to persist `{credits, jackpot}`. `None` disables persistence.
    pub state_file: Option<String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(5),
            state_file: None,
        }
    }
}

impl From<&AppConfig> for DriverSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            tick_interval: cfg.feed.tick_interval(),
            refresh_interval: cfg.feed.refresh_interval(),
            state_file: Some(cfg.game.state_file.clone()),
        }
    }
}

#[derive(Debug)]
pub enum EngineCommand {
    PlaceBet {
        direction: Direction,
        amount: Decimal,
        reply: oneshot::Sender<bool>,
    },
    /// Acknowledge the result and open the next round.
    Acknowledge { reply: oneshot::Sender<bool> },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPurpose {
    OpenRound,
    Refresh,
}

struct FetchCompletion {
    purpose: FetchPurpose,
    /// Round that was current when the fetch started.
    round_id: Option<Uuid>,
    result: Result<Quote, GameError>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    snapshots: watch::Receiver<RoundSnapshot>,
}

impl EngineHandle {
    /// Latest published state.
    pub fn snapshot(&self) -> RoundSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RoundSnapshot> {
        self.snapshots.clone()
    }

    /// Submit a bet. `Ok(false)` means the engine ignored it.
    pub async fn place_bet(&self, direction: Direction, amount: Decimal) -> Result<bool, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::PlaceBet {
            direction,
            amount,
            reply,
        })
        .await?;
        rx.await.map_err(|_| GameError::EngineStopped)
    }

    /// Acknowledge the settled round. `Ok(true)` means a new round is
    /// being opened; the snapshot changes once the price arrives.
    pub async fn acknowledge_result(&self) -> Result<bool, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Acknowledge { reply }).await?;
        rx.await.map_err(|_| GameError::EngineStopped)
    }

    /// Stop the driver and its timers.
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, cmd: EngineCommand) -> Result<(), GameError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| GameError::EngineStopped)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Spawn the driver task. The first round is opened immediately.
pub fn spawn(
    engine: RoundEngine,
    feed: Arc<PriceFeed>,
    clock: Arc<dyn Clock>,
    settings: DriverSettings,
) -> (EngineHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
    let (snap_tx, snap_rx) = watch::channel(engine.snapshot(clock.now()));

    let driver = Driver::new(engine, feed, clock, settings, fetch_tx, snap_tx);
    let task = tokio::spawn(driver.run(cmd_rx, fetch_rx));
    let handle = EngineHandle {
        commands: cmd_tx,
        snapshots: snap_rx,
    };
    (handle, task)
}

struct Driver {
    engine: RoundEngine,
    feed: Arc<PriceFeed>,
    clock: Arc<dyn Clock>,
    settings: DriverSettings,
    fetch_tx: mpsc::UnboundedSender<FetchCompletion>,
    snapshots: watch::Sender<RoundSnapshot>,
    last_stored: StoredState,
    /// An open-round fetch is in flight.
    opening: bool,
    /// A refresh fetch is in flight.
    refreshing: bool,
}

impl Driver {
    fn new(
        engine: RoundEngine,
        feed: Arc<PriceFeed>,
        clock: Arc<dyn Clock>,
        settings: DriverSettings,
        fetch_tx: mpsc::UnboundedSender<FetchCompletion>,
        snapshots: watch::Sender<RoundSnapshot>,
    ) -> Self {
        Self {
            last_stored: engine.state().stored(),
            engine,
            feed,
            clock,
            settings,
            fetch_tx,
            snapshots,
            opening: false,
            refreshing: false,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut fetches: mpsc::UnboundedReceiver<FetchCompletion>,
    ) {
        let mut tick = time::interval(self.settings.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The opening fetch already supplies a fresh price.
        let refresh_period = self.settings.refresh_interval;
        let mut refresh = time::interval_at(Instant::now() + refresh_period, refresh_period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            refresh_ms = refresh_period.as_millis() as u64,
            credits = %self.engine.state().credits,
            "Round engine started"
        );

        self.begin_open();

        loop {
            tokio::select! {
                _ = tick.tick() => self.on_tick(),
                _ = refresh.tick() => self.on_refresh(),
                Some(done) = fetches.recv() => self.on_fetch(done),
                cmd = commands.recv() => match cmd {
                    // Publish before replying so the caller's next read
                    // already sees the effect.
                    Some(EngineCommand::PlaceBet { direction, amount, reply }) => {
                        let accepted = self.engine.place_bet(direction, amount);
                        self.persist_if_changed();
                        self.publish();
                        let _ = reply.send(accepted);
                        continue;
                    }
                    Some(EngineCommand::Acknowledge { reply }) => {
                        let opening = self.on_acknowledge();
                        self.publish();
                        let _ = reply.send(opening);
                        continue;
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
            }
            self.publish();
        }

        info!(credits = %self.engine.state().credits, "Round engine stopped");
    }

    fn on_tick(&mut self) {
        for transition in self.engine.tick(self.clock.now()) {
            if let Transition::Settled(_) = transition {
                self.persist_if_changed();
            }
        }
    }

    fn on_refresh(&mut self) {
        if !self.engine.accepts_price_updates() || self.refreshing {
            return;
        }
        self.refreshing = true;
        self.spawn_fetch(FetchPurpose::Refresh);
    }

    fn on_acknowledge(&mut self) -> bool {
        if self.opening || !self.engine.awaiting_open() {
            debug!(
                opening = self.opening,
                phase = %self.engine.state().phase,
                "Acknowledge ignored"
            );
            return false;
        }
        self.begin_open();
        true
    }

    fn begin_open(&mut self) {
        self.opening = true;
        self.spawn_fetch(FetchPurpose::OpenRound);
    }

    fn spawn_fetch(&self, purpose: FetchPurpose) {
        let feed = Arc::clone(&self.feed);
        let tx = self.fetch_tx.clone();
        let round_id = self.engine.state().round_id;
        tokio::spawn(async move {
            let result = feed.fetch_price().await;
            // The driver may have stopped; nothing to deliver to then.
            let _ = tx.send(FetchCompletion {
                purpose,
                round_id,
                result,
            });
        });
    }

    fn on_fetch(&mut self, done: FetchCompletion) {
        match done.purpose {
            FetchPurpose::OpenRound => {
                self.opening = false;
                match done.result {
                    Ok(quote) if self.engine.awaiting_open() => {
                        self.engine.open_round(quote.price, self.clock.now());
                    }
                    Ok(_) => debug!("Round already open, discarding opening quote"),
                    Err(e) if self.engine.awaiting_open() => {
                        warn!(error = %e, "Could not open round, retrying on the next refresh");
                        self.engine.record_feed_failure(e.to_string());
                    }
                    Err(e) => debug!(error = %e, "Round already open, discarding failed open"),
                }
            }
            FetchPurpose::Refresh => {
                self.refreshing = false;
                if done.round_id != self.engine.state().round_id {
                    debug!("Round changed during refresh, discarding quote");
                    return;
                }
                match done.result {
                    // Nothing open yet because the feed was down; the
                    // refresh cadence doubles as the retry.
                    Ok(quote) if !self.engine.state().is_round_open() => {
                        info!(price = %quote.price, source = %quote.source, "Price feed recovered");
                        self.engine.open_round(quote.price, self.clock.now());
                    }
                    Ok(quote) if self.engine.accepts_price_updates() => {
                        debug!(price = %quote.price, source = %quote.source, "Price refreshed");
                        self.engine.record_price(quote.price);
                    }
                    Ok(_) => debug!("Round settled, discarding late quote"),
                    Err(e) => {
                        warn!(error = %e, "Price refresh failed");
                        self.engine.record_feed_failure(e.to_string());
                    }
                }
            }
        }
    }

    /// Write `{credits, jackpot}` if either moved since the last write.
    fn persist_if_changed(&mut self) {
        let stored = self.engine.state().stored();
        if stored == self.last_stored {
            return;
        }
        if let Some(path) = self.settings.state_file.as_deref() {
            if let Err(e) = storage::save_state(&stored, Some(path)) {
                error!(error = %e, "Failed to save state");
                return;
            }
        }
        self.last_stored = stored;
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.engine.snapshot(self.clock.now()));
    }
}
