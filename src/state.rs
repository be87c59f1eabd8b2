//! # state
//!
//! The signaldesk **composition root**: one instance of every component,
//! wired to the same ports and the same event bus.
//!
//! ```text
//!                       ┌────────────────────────── Dashboard ──────────────────────────┐
//!   stream frames ────▶ │ StreamConnection ─▶ StreamRouter ─┬─▶ QuoteStore              │
//!                       │        ▲                          ├─▶ RecommendationCache ─┐  │
//!                       │  SubscriptionMultiplexer          ├─▶ ExitAlertBook ◀─ ExitPoller
//!                       │                                   └─▶ MonitorBoard         │  │
//!                       │                    StrategyPlanCache ◀── prefetch on change ┘  │
//!                       └──────────────────────────────┬────────────────────────────────┘
//!                                                      ▼
//!                                          EventBus ─▶ visual layer / runner log
//! ```
//!
//! Background work is started by [`Dashboard::spawn_background`] and stopped
//! by cancelling the token handed to it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::DashboardApi;
use crate::clock::MarketClock;
use crate::config::SyncConfig;
use crate::events::EventBus;
use crate::exits::{ExitAlertBook, ExitPoller};
use crate::models::Pick;
use crate::monitor::MonitorBoard;
use crate::quotes::QuoteStore;
use crate::recommendations::{RecommendationCache, RecommendationView};
use crate::storage::KeyValueStore;
use crate::strategy_cache::{PlanRequest, PlanView, StrategyPlanCache};
use crate::stream::{StreamConnection, StreamRouter, SubscriptionGuard, SubscriptionMultiplexer};

#[derive(Clone)]
pub struct Dashboard {
    pub config:          Arc<SyncConfig>,
    pub events:          EventBus,
    pub mux:             Arc<SubscriptionMultiplexer>,
    pub quotes:          QuoteStore,
    pub recommendations: RecommendationCache,
    pub strategies:      StrategyPlanCache,
    pub exits:           ExitAlertBook,
    pub monitor:         MonitorBoard,
    api:                 Arc<dyn DashboardApi>,
    clock:               Arc<dyn MarketClock>,
}

impl Dashboard {
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn DashboardApi>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn MarketClock>,
    ) -> Self {
        let events = EventBus::new();

        let recommendations = RecommendationCache::new(
            api.clone(),
            store.clone(),
            clock.clone(),
            config.staleness.clone(),
            events.clone(),
        );
        let strategies =
            StrategyPlanCache::new(api.clone(), store.clone(), events.clone(), config.prefetch_limit);

        Self {
            quotes: QuoteStore::new(events.clone()),
            exits: ExitAlertBook::new(store, events.clone()),
            monitor: MonitorBoard::new(api.clone(), events.clone()),
            mux: Arc::new(SubscriptionMultiplexer::new()),
            config: Arc::new(config),
            recommendations,
            strategies,
            events,
            api,
            clock,
        }
    }

    /// Holds interest in `symbols` until the guard is dropped.
    pub fn watch_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> SubscriptionGuard {
        self.mux.subscribe_guard(symbols)
    }

    pub fn stream_connection(&self) -> StreamConnection {
        let router = StreamRouter {
            quotes:          self.quotes.clone(),
            recommendations: self.recommendations.clone(),
            exits:           self.exits.clone(),
            monitor:         self.monitor.clone(),
        };
        StreamConnection::new(
            self.config.stream_url.clone(),
            self.config.reconnect_delay,
            self.mux.clone(),
            router,
            self.events.clone(),
        )
    }

    pub fn exit_poller(&self) -> ExitPoller {
        ExitPoller::new(
            self.exits.clone(),
            self.api.clone(),
            self.clock.clone(),
            self.config.exit_strategy_id.clone(),
            self.config.exit_poll_every,
        )
    }

    /// Stream connection, exit poller and strategy prefetch, all bound to
    /// `cancel`.
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.stream_connection().run(cancel.child_token())),
            tokio::spawn(self.exit_poller().run(cancel.child_token())),
            tokio::spawn(prefetch_on_change(
                self.recommendations.watch(),
                self.strategies.clone(),
                self.config.risk_profile.clone(),
                self.config.session_id.clone(),
                cancel.child_token(),
            )),
        ]
    }

    /// Fetches recommendations for the configured selection.
    pub async fn refresh_recommendations(
        &self,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Option<RecommendationView> {
        self.recommendations
            .fetch(
                &self.config.universe,
                &self.config.primary_mode,
                &self.config.session_id,
                force_refresh,
                cancel,
            )
            .await
    }

    /// On-demand plan for one displayed pick.
    pub async fn analyze(&self, pick: &Pick) -> watch::Receiver<PlanView> {
        let view = self.recommendations.current();
        let mode = if view.mode.is_empty() { self.config.primary_mode.as_str() } else { view.mode.as_str() };
        let request = PlanRequest::for_pick(
            pick,
            mode,
            &self.config.risk_profile,
            view.as_of.as_deref(),
            &self.config.session_id,
        );
        self.strategies.analyze(request).await
    }
}

/// Primes strategy plans whenever the displayed pick list changes.
async fn prefetch_on_change(
    mut views: watch::Receiver<RecommendationView>,
    strategies: StrategyPlanCache,
    risk: String,
    session_id: String,
    cancel: CancellationToken,
) {
    let mut last: Option<(String, Option<String>, Vec<String>)> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let view = views.borrow_and_update().clone();
        if view.items.is_empty() {
            continue;
        }

        let signature = (
            view.mode.clone(),
            view.as_of.clone(),
            view.items.iter().map(|p| p.symbol.clone()).collect::<Vec<_>>(),
        );
        if last.as_ref() == Some(&signature) {
            continue;
        }
        last = Some(signature);

        debug!(mode = %view.mode, count = view.items.len(), "Pick list changed, prefetching plans");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = strategies.prefetch(&view.items, &view.mode, &risk, view.as_of.as_deref(), &session_id) => {}
        }
    }

    info!("Strategy prefetch stopped");
}
