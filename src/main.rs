//! # signaldesk — headless dashboard runner
//!
//! Runs the synchronization core without a visual layer: keeps the stream
//! connected, holds the configured watchlist subscribed, refreshes
//! recommendations on a timer and logs every dashboard event.
//!
//! ## Environment Variables
//!
//! | Variable                | Default                          | Description                     |
//! |-------------------------|----------------------------------|---------------------------------|
//! | `STREAM_URL`            | `ws://localhost:8000/ws/stream`  | Streaming endpoint              |
//! | `API_BASE_URL`          | `http://localhost:8000`          | Pull endpoint base              |
//! | `UNIVERSE`              | `NIFTY50`                        | Active universe                 |
//! | `PRIMARY_MODE`          | `Swing`                          | Active mode                     |
//! | `WATCHLIST`             | (empty)                          | Comma-separated symbols         |
//! | `REFRESH_INTERVAL_SECS` | `300`                            | Recommendation refresh cadence  |
//! | `STORE_DIR`             | `.signaldesk`                    | Durable store directory         |
//! | `RUST_LOG`              | `signaldesk=debug`               | Tracing filter                  |
//!
//! The full list lives on [`signaldesk::config::SyncConfig::from_env`].

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use signaldesk::api::HttpApi;
use signaldesk::clock::SessionClock;
use signaldesk::config::SyncConfig;
use signaldesk::events::DashboardEvent;
use signaldesk::storage::FileStore;
use signaldesk::Dashboard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional) ──────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("signaldesk=debug".parse()?)
            .add_directive("reqwest=warn".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        SIGNALDESK — Dashboard Sync Core       ║
  ║        Stream · Picks · Plans · Exits         ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Configuration and ports ───────────────────────────────────────────
    let config = SyncConfig::from_env()?;
    info!(
        stream   = %config.stream_url,
        api      = %config.api_base_url,
        universe = %config.universe,
        mode     = %config.primary_mode,
        session  = %config.session_id,
        "Configuration loaded"
    );

    let client = reqwest::Client::builder()
        .user_agent(concat!("signaldesk/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let api = Arc::new(HttpApi::new(client, &config.api_base_url, config.http_timeout));
    let store = Arc::new(FileStore::new(config.store_dir.clone()));
    let refresh_every = config.refresh_every;
    let watchlist = config.watchlist.clone();

    let desk = Dashboard::new(config, api, store, Arc::new(SessionClock::nse()));

    // ── 4. Background tasks ──────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let _watchlist = desk.watch_symbols(watchlist.as_slice());
    let workers = desk.spawn_background(&cancel);
    let logger = tokio::spawn(log_events(desk.clone(), cancel.child_token()));

    // ── 5. Periodic recommendation refresh until Ctrl-C ──────────────────────
    let mut ticker = tokio::time::interval(refresh_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                // Later ticks are timer-driven refreshes.
                let force = !first;
                first = false;
                // A slow pull must not hold up Ctrl-C.
                let refreshed = tokio::select! {
                    _ = &mut shutdown => break,
                    view = desk.refresh_recommendations(force, &cancel) => view,
                };
                if let Some(view) = refreshed {
                    info!(
                        count      = view.items.len(),
                        provenance = ?view.provenance,
                        message    = ?view.system_message,
                        "Recommendations refreshed"
                    );
                }
            }
        }
    }
    info!("Ctrl-C received, shutting down");

    cancel.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    let _ = logger.await;

    info!("signaldesk stopped");
    Ok(())
}

async fn log_events(desk: Dashboard, cancel: CancellationToken) {
    let mut rx = desk.events.subscribe();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(DashboardEvent::Quote { tick }) => {
                debug!(symbol = %tick.symbol, price = tick.last_price, "Quote");
            }
            Ok(event) => info!(event = %event.to_json(), "Dashboard event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}
