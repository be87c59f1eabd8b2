//! # strategy_cache — StrategyPlanCache
//!
//! Memoizes per-symbol strategy plans under `SYMBOL|mode|risk|day` keys and
//! guarantees at most one outstanding request per key.
//!
//! ```text
//!  get_or_fetch(key)
//!    ├─ entry with a plan  → return it (no network)
//!    ├─ key in flight      → wait on the leader's outcome
//!    └─ otherwise          → become leader: spawn fetch, store + persist,
//!                            clear in-flight marker, broadcast outcome
//! ```
//!
//! The leader runs in its own task, so a caller that gives up waiting never
//! leaves a dangling in-flight marker behind.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{DashboardApi, StrategyQuery};
use crate::error::{SyncError, SyncResult};
use crate::events::{DashboardEvent, EventBus};
use crate::models::{build_key, Pick, StrategyCacheEntry};
use crate::storage::{load_json, save_json, KeyValueStore, STRATEGY_PLANS_KEY};

type Outcome = Option<SyncResult<StrategyCacheEntry>>;

/// Everything needed to key and request one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub symbol:     String,
    pub mode:       String,
    pub risk:       String,
    pub as_of:      Option<String>,
    pub session_id: String,
    /// The pick row forwarded to the server as request context.
    pub context:    Value,
}

impl PlanRequest {
    pub fn for_pick(pick: &Pick, mode: &str, risk: &str, as_of: Option<&str>, session_id: &str) -> Self {
        Self {
            symbol:     pick.symbol.trim().to_uppercase(),
            mode:       mode.to_string(),
            risk:       risk.to_string(),
            as_of:      as_of.map(str::to_string),
            session_id: session_id.to_string(),
            context:    pick.to_context(),
        }
    }

    pub fn key(&self) -> String {
        build_key(&self.symbol, &self.mode, &self.risk, self.as_of.as_deref())
    }

    fn query(&self) -> StrategyQuery {
        StrategyQuery {
            symbol:     self.symbol.clone(),
            session_id: self.session_id.clone(),
            risk:       self.risk.clone(),
            mode:       self.mode.clone(),
            context:    self.context.clone(),
        }
    }
}

/// What the on-demand "analyze" panel renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanView {
    pub key:     String,
    pub entry:   StrategyCacheEntry,
    pub loading: bool,
    pub error:   Option<String>,
}

struct PlanInner {
    api:            Arc<dyn DashboardApi>,
    store:          Arc<dyn KeyValueStore>,
    events:         EventBus,
    entries:        RwLock<HashMap<String, StrategyCacheEntry>>,
    in_flight:      Mutex<HashMap<String, watch::Receiver<Outcome>>>,
    prefetch_limit: usize,
}

impl PlanInner {
    async fn cached_plan(&self, key: &str) -> Option<StrategyCacheEntry> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.has_plan())
            .cloned()
    }

    async fn store_entry(&self, key: &str, entry: StrategyCacheEntry) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        save_json(self.store.as_ref(), STRATEGY_PLANS_KEY, &*entries);
    }
}

#[derive(Clone)]
pub struct StrategyPlanCache {
    inner: Arc<PlanInner>,
}

impl StrategyPlanCache {
    /// Restores the persisted plan map, if one decodes.
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
        prefetch_limit: usize,
    ) -> Self {
        let entries: HashMap<String, StrategyCacheEntry> =
            load_json(store.as_ref(), STRATEGY_PLANS_KEY).unwrap_or_default();
        debug!(restored = entries.len(), "Strategy plan cache loaded");

        Self {
            inner: Arc::new(PlanInner {
                api,
                store,
                events,
                entries: RwLock::new(entries),
                in_flight: Mutex::new(HashMap::new()),
                prefetch_limit,
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Option<StrategyCacheEntry> {
        self.inner.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_in_flight(&self, key: &str) -> bool {
        self.inner.in_flight.lock().await.contains_key(key)
    }

    /// Returns the cached plan or fetches it, coalescing concurrent callers
    /// for the same key onto one request.
    pub async fn get_or_fetch(&self, request: &PlanRequest) -> SyncResult<StrategyCacheEntry> {
        let key = request.key();
        if let Some(entry) = self.inner.cached_plan(&key).await {
            return Ok(entry);
        }

        let rx = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(rx) => {
                    debug!(key = %key, "Joining in-flight strategy fetch");
                    rx.clone()
                }
                None => {
                    // Re-check under the marker lock: the previous leader may
                    // have stored its result after our first lookup.
                    if let Some(entry) = self.inner.cached_plan(&key).await {
                        return Ok(entry);
                    }
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx.clone());
                    self.spawn_leader(key.clone(), request.clone(), tx);
                    rx
                }
            }
        };

        await_outcome(rx).await
    }

    fn spawn_leader(&self, key: String, request: PlanRequest, tx: watch::Sender<Outcome>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            debug!(key = %key, "Fetching strategy plan");
            let outcome = inner
                .api
                .suggest_strategy(&request.query())
                .await
                .map(|response| response.into_entry(&request.symbol));

            match &outcome {
                Ok(entry) => {
                    inner.store_entry(&key, entry.clone()).await;
                    inner.events.publish(DashboardEvent::StrategyPlan {
                        key:   key.clone(),
                        ready: entry.has_plan(),
                    });
                }
                Err(e) => warn!(key = %key, error = %e, "Strategy plan fetch failed"),
            }

            inner.in_flight.lock().await.remove(&key);
            let _ = tx.send(Some(outcome));
        });
    }

    /// Warms the cache for the top-ranked picks, one at a time.  Failures are
    /// logged and skipped.
    pub async fn prefetch(
        &self,
        picks: &[Pick],
        mode: &str,
        risk: &str,
        as_of: Option<&str>,
        session_id: &str,
    ) -> usize {
        let mut warmed = 0;
        for pick in picks.iter().take(self.inner.prefetch_limit) {
            let request = PlanRequest::for_pick(pick, mode, risk, as_of, session_id);
            match self.get_or_fetch(&request).await {
                Ok(_) => warmed += 1,
                Err(e) => debug!(symbol = %request.symbol, error = %e, "Prefetch skipped"),
            }
        }
        if warmed > 0 {
            info!(warmed, mode, "Strategy plans prefetched");
        }
        warmed
    }

    /// Shows a placeholder immediately and fills it in when the plan arrives.
    ///
    /// On failure the placeholder is kept (never discarded) with the error
    /// text as its explanation.
    pub async fn analyze(&self, request: PlanRequest) -> watch::Receiver<PlanView> {
        let key = request.key();

        if let Some(entry) = self.inner.cached_plan(&key).await {
            let (_, rx) = watch::channel(PlanView { key, entry, loading: false, error: None });
            return rx;
        }

        let placeholder = self
            .get(&key)
            .await
            .unwrap_or_else(|| StrategyCacheEntry::placeholder(&request.symbol));
        let (tx, rx) = watch::channel(PlanView {
            key:     key.clone(),
            entry:   placeholder.clone(),
            loading: true,
            error:   None,
        });

        let cache = self.clone();
        tokio::spawn(async move {
            let view = match cache.get_or_fetch(&request).await {
                Ok(entry) => PlanView { key, entry, loading: false, error: None },
                Err(e) => {
                    let mut entry = placeholder;
                    if entry.explain.is_empty() {
                        entry.explain = vec![format!("Strategy plan unavailable: {e}")];
                    }
                    cache
                        .inner
                        .entries
                        .write()
                        .await
                        .entry(key.clone())
                        .or_insert_with(|| entry.clone());
                    PlanView { key, entry, loading: false, error: Some(e.to_string()) }
                }
            };
            // Err only means the panel was closed.
            let _ = tx.send(view);
        });

        rx
    }
}

async fn await_outcome(mut rx: watch::Receiver<Outcome>) -> SyncResult<StrategyCacheEntry> {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(Err(SyncError::Cancelled)),
        Err(_) => Err(SyncError::Cancelled),
    }
}
