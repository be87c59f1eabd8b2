//! # exits — ExitEventDeduplicator
//!
//! Exit alerts reach the dashboard twice: pushed inside
//! `scalping_monitor_update` frames and pulled by the periodic poller.  Both
//! paths feed [`ExitAlertBook::ingest`], which keeps one alert per symbol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::DashboardApi;
use crate::clock::MarketClock;
use crate::events::{DashboardEvent, EventBus};
use crate::models::ExitAlert;
use crate::storage::{load_json, save_json, KeyValueStore, EXIT_HISTORY_KEY};

// ─── Merge ────────────────────────────────────────────────────────────────────

fn symbol_key(alert: &ExitAlert) -> String {
    alert.symbol.trim().to_uppercase()
}

/// `candidate` replaces `existing` only with a strictly later, parsable
/// `exit_time`.  Ties and unparsable timestamps keep what is already there.
fn supersedes(candidate: &ExitAlert, existing: &ExitAlert) -> bool {
    match (candidate.exit_timestamp(), existing.exit_timestamp()) {
        (Some(new), Some(old)) => new > old,
        _ => false,
    }
}

/// One alert per symbol, in first-seen order (`current` before `incoming`).
pub fn merge(current: &[ExitAlert], incoming: &[ExitAlert]) -> Vec<ExitAlert> {
    let mut merged: Vec<ExitAlert> = Vec::with_capacity(current.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for alert in current.iter().chain(incoming) {
        let key = symbol_key(alert);
        match index.get(&key) {
            Some(&slot) => {
                if supersedes(alert, &merged[slot]) {
                    merged[slot] = alert.clone();
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(alert.clone());
            }
        }
    }

    merged
}

// ─── Book ─────────────────────────────────────────────────────────────────────

/// The deduplicated alert set, persisted across restarts.
#[derive(Clone)]
pub struct ExitAlertBook {
    alerts: Arc<RwLock<Vec<ExitAlert>>>,
    store:  Arc<dyn KeyValueStore>,
    events: EventBus,
}

impl ExitAlertBook {
    pub fn new(store: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        let history: Vec<ExitAlert> = load_json(store.as_ref(), EXIT_HISTORY_KEY).unwrap_or_default();
        // Older histories may predate deduplication.
        let history = merge(&history, &[]);
        Self {
            alerts: Arc::new(RwLock::new(history)),
            store,
            events,
        }
    }

    pub async fn alerts(&self) -> Vec<ExitAlert> {
        self.alerts.read().await.clone()
    }

    /// Merges a batch.  Returns `true` when the visible set changed.
    pub async fn ingest(&self, incoming: &[ExitAlert]) -> bool {
        if incoming.is_empty() {
            return false;
        }

        let snapshot = {
            let mut alerts = self.alerts.write().await;
            let merged = merge(&alerts, incoming);
            if merged == *alerts {
                return false;
            }
            *alerts = merged;
            save_json(self.store.as_ref(), EXIT_HISTORY_KEY, &*alerts);
            alerts.clone()
        };

        debug!(received = incoming.len(), total = snapshot.len(), "Exit alerts merged");
        self.events.publish(DashboardEvent::ExitAlerts { alerts: snapshot });
        true
    }
}

// ─── Poller ───────────────────────────────────────────────────────────────────

/// Pulls the day's exit events on a fixed cadence and feeds the book.
pub struct ExitPoller {
    book:        ExitAlertBook,
    api:         Arc<dyn DashboardApi>,
    clock:       Arc<dyn MarketClock>,
    strategy_id: String,
    every:       Duration,
}

impl ExitPoller {
    pub fn new(
        book: ExitAlertBook,
        api: Arc<dyn DashboardApi>,
        clock: Arc<dyn MarketClock>,
        strategy_id: impl Into<String>,
        every: Duration,
    ) -> Self {
        Self { book, api, clock, strategy_id: strategy_id.into(), every }
    }

    /// One pull.  Failures are logged; the book is left untouched.
    pub async fn poll_once(&self) -> bool {
        let date = self.clock.now().date_naive();
        match self.api.fetch_exit_events(date, &self.strategy_id).await {
            Ok(exits) => self.book.ingest(&exits).await,
            Err(e) => {
                warn!(error = %e, strategy = %self.strategy_id, "Exit events pull failed");
                false
            }
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            every_secs = self.every.as_secs(),
            strategy   = %self.strategy_id,
            "Exit poller started"
        );
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
        info!("Exit poller stopped");
    }
}
