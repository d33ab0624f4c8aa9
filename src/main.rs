//! UPDOWN: price up/down round game
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the credit balance from disk (or starts fresh), starts the
//! round engine and the API server, and runs until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use updown::api;
use updown::config;
use updown::engine::driver::{self, DriverSettings};
use updown::engine::round::{RoundEngine, RoundRules};
use updown::engine::SystemClock;
use updown::feed::PriceFeed;
use updown::storage;

const BANNER: &str = r#"
 _   _ ____  ____   _____        ___   _
| | | |  _ \|  _ \ / _ \ \      / / \ | |
| | | | |_) | | | | | | \ \ /\ / /|  \| |
| |_| |  __/| |_| | |_| |\ V  V / | |\  |
 \___/|_|   |____/ \___/  \_/\_/  |_| \_|

  Call the next move. v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("UPDOWN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

    init_logging();

    // Parsed files are validated on load; the defaults are always valid.
    let cfg = config::AppConfig::load_or_default(&config_path)?;

    println!("{BANNER}");
    info!(
        betting_window_secs = cfg.game.betting_window_secs,
        round_window_secs = cfg.game.round_window_secs,
        payout = %cfg.game.payout_multiplier,
        asset = %cfg.feed.asset_id,
        "UPDOWN starting up"
    );

    // -- Restore or create balance ---------------------------------------

    let stored = match storage::load_state(Some(&cfg.game.state_file))? {
        Some(s) => {
            info!(credits = %s.credits, jackpot = %s.jackpot, "Resumed from saved state");
            s
        }
        None => {
            let s = cfg.game.initial_state();
            info!(credits = %s.credits, jackpot = %s.jackpot, "Fresh start");
            s
        }
    };

    // -- Initialise components -------------------------------------------

    let feed = PriceFeed::from_config(&cfg.feed)?;
    let engine = RoundEngine::new(stored, RoundRules::from(&cfg.game));

    let (handle, engine_task) = driver::spawn(
        engine,
        Arc::new(feed),
        Arc::new(SystemClock),
        DriverSettings::from(&cfg),
    );

    let server = if cfg.server.enabled {
        Some(api::spawn_server(handle.clone(), cfg.server.port).await?)
    } else {
        info!("API server disabled");
        None
    };

    info!("Game running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    if let Some(server) = server {
        server.abort();
    }
    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "Engine already stopped");
    }
    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task panicked");
    }

    let last = handle.snapshot();
    info!(
        credits = format!("{:.2}", last.state.credits),
        jackpot = %last.state.jackpot,
        "UPDOWN shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("updown=info"));

    let json_logging = std::env::var("UPDOWN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
