//! # recommendations — RecommendationCache
//!
//! Persists and reconciles the "top picks" result set for the active
//! (universe, mode) selection.
//!
//! ```text
//!  fetch(universe, mode, force)
//!    │
//!    ├─ load durable snapshot ──▶ usable?  (same universe, same mode, not all-fallback)
//!    │                              └─ yes → publish it immediately (optimistic)
//!    ├─ force refresh?  mode switched / snapshot stale   (only while market open)
//!    ├─ pull top picks  refresh = force && market_open
//!    │
//!    └─ reconcile ─┬─ genuine items        → replace snapshot, publish live
//!                  ├─ empty / all-fallback → keep usable cache ("previous session")
//!                  │                         or empty ("no actionable setups")
//!                  └─ (pull failed)        → last snapshot of the same mode, or empty
//! ```
//!
//! `top_picks_update` frames from the stream go through the same
//! [`RecommendationCache::apply_push`] → `reconcile` path, so push and pull
//! can never disagree on what gets persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{DashboardApi, RecommendationQuery};
use crate::clock::MarketClock;
use crate::config::StalenessPolicy;
use crate::error::SyncError;
use crate::events::{DashboardEvent, EventBus};
use crate::models::{all_fallback, parse_iso, Pick, RecommendationSnapshot};
use crate::storage::{load_json, save_json, KeyValueStore, RECOMMENDATION_SNAPSHOT_KEY};

// ─── View ─────────────────────────────────────────────────────────────────────

/// Where the displayed items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Nothing fetched yet.
    Idle,
    /// Durable snapshot shown while a pull is in flight.
    Cached,
    /// Fresh result from the server (pull or push).
    Live,
    /// Server had nothing actionable; the last genuine snapshot is kept.
    PreviousSession,
    /// The pull failed; the last snapshot of the same mode is shown.
    LastSaved,
    /// Nothing to show.
    Empty,
}

/// What the visual layer should render for the recommendation panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationView {
    pub universe:       String,
    pub mode:           String,
    pub items:          Vec<Pick>,
    pub as_of:          Option<String>,
    pub provenance:     Provenance,
    /// Set whenever the items are not a fresh live result.
    pub system_message: Option<String>,
    pub refreshing:     bool,
}

impl RecommendationView {
    fn idle() -> Self {
        Self {
            universe:       String::new(),
            mode:           String::new(),
            items:          Vec::new(),
            as_of:          None,
            provenance:     Provenance::Idle,
            system_message: None,
            refreshing:     false,
        }
    }

    fn from_snapshot(
        snapshot: &RecommendationSnapshot,
        universe: &str,
        mode: &str,
        provenance: Provenance,
        system_message: Option<String>,
    ) -> Self {
        Self {
            universe:       universe.to_string(),
            mode:           mode.to_string(),
            items:          snapshot.items.clone(),
            as_of:          snapshot.as_of.clone(),
            provenance,
            system_message,
            refreshing:     false,
        }
    }

    fn empty(universe: &str, mode: &str, system_message: String) -> Self {
        Self {
            universe:       universe.to_string(),
            mode:           mode.to_string(),
            items:          Vec::new(),
            as_of:          None,
            provenance:     Provenance::Empty,
            system_message: Some(system_message),
            refreshing:     false,
        }
    }
}

pub fn previous_session_notice(mode: &str) -> String {
    format!("Showing picks from the previous session: no fresh {mode} setups yet.")
}

pub fn no_setups_notice(mode: &str) -> String {
    format!("Market is quiet: no actionable {mode} setups right now.")
}

pub fn last_saved_notice(mode: &str) -> String {
    format!("Live refresh failed: showing the last saved {mode} picks.")
}

pub fn unavailable_notice(err: &SyncError) -> String {
    format!("Recommendations are unavailable right now ({err}).")
}

// ─── Policy ───────────────────────────────────────────────────────────────────

/// Short-horizon snapshot made only of fallback picks.
pub fn is_all_fallback_snapshot(items: &[Pick], mode: &str, policy: &StalenessPolicy) -> bool {
    policy.is_short_horizon(mode) && all_fallback(items)
}

/// A snapshot may be displayed for a selection only when it was produced for
/// exactly that selection and is not a fallback placeholder.
pub fn is_usable(
    snapshot: &RecommendationSnapshot,
    universe: &str,
    mode: &str,
    policy: &StalenessPolicy,
) -> bool {
    snapshot.universe == universe
        && snapshot.primary_mode == mode
        && !is_all_fallback_snapshot(&snapshot.items, mode, policy)
}

/// `true` when `as_of` is older than the mode's threshold.  A missing or
/// unparsable timestamp is never stale.
pub fn is_stale(
    as_of: Option<&str>,
    mode: &str,
    now: DateTime<Utc>,
    policy: &StalenessPolicy,
) -> bool {
    let Some(as_of) = as_of.and_then(parse_iso) else {
        return false;
    };
    now.signed_duration_since(as_of) > policy.max_age(mode)
}

/// What a fetch shows up front and whether it bypasses the server cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    /// The durable snapshot may be shown for this selection.
    pub usable:          bool,
    /// Refresh wanted after mode-switch and staleness checks.
    pub force_refresh:   bool,
    /// Value of the `refresh` flag actually sent.
    pub request_refresh: bool,
}

pub fn plan_fetch(
    cached: Option<&RecommendationSnapshot>,
    universe: &str,
    mode: &str,
    force_refresh: bool,
    policy: &StalenessPolicy,
    now: DateTime<Utc>,
    market_open: bool,
) -> FetchPlan {
    let mut force = force_refresh;
    let usable = cached.is_some_and(|s| is_usable(s, universe, mode, policy));

    if let Some(snapshot) = cached {
        if snapshot.primary_mode != mode && market_open {
            force = true;
        }
        if usable && market_open && is_stale(snapshot.as_of.as_deref(), mode, now, policy) {
            force = true;
        }
    }

    FetchPlan {
        usable,
        force_refresh:   force,
        request_refresh: force && market_open,
    }
}

// ─── Cache ────────────────────────────────────────────────────────────────────

struct Inner {
    api:       Arc<dyn DashboardApi>,
    store:     Arc<dyn KeyValueStore>,
    clock:     Arc<dyn MarketClock>,
    policy:    StalenessPolicy,
    /// Active (universe, mode); results for anything else are discarded.
    selection: RwLock<Option<(String, String)>>,
    /// Serialises load → decide → persist so push and pull never interleave.
    reconcile: Mutex<()>,
    view_tx:   watch::Sender<RecommendationView>,
    events:    EventBus,
}

#[derive(Clone)]
pub struct RecommendationCache {
    inner: Arc<Inner>,
}

impl RecommendationCache {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn MarketClock>,
        policy: StalenessPolicy,
        events: EventBus,
    ) -> Self {
        let (view_tx, _) = watch::channel(RecommendationView::idle());
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                clock,
                policy,
                selection: RwLock::new(None),
                reconcile: Mutex::new(()),
                view_tx,
                events,
            }),
        }
    }

    /// Observe the displayed view.
    pub fn watch(&self) -> watch::Receiver<RecommendationView> {
        self.inner.view_tx.subscribe()
    }

    pub fn current(&self) -> RecommendationView {
        self.inner.view_tx.borrow().clone()
    }

    /// Last durable snapshot, if any decodes.
    pub fn load_snapshot(&self) -> Option<RecommendationSnapshot> {
        load_json(self.inner.store.as_ref(), RECOMMENDATION_SNAPSHOT_KEY)
    }

    pub async fn selection(&self) -> Option<(String, String)> {
        self.inner.selection.read().await.clone()
    }

    async fn is_selected(&self, universe: &str, mode: &str) -> bool {
        matches!(
            self.inner.selection.read().await.as_ref(),
            Some((u, m)) if u == universe && m == mode
        )
    }

    fn publish(&self, view: RecommendationView) -> RecommendationView {
        self.inner.events.publish(DashboardEvent::Recommendations {
            universe:       view.universe.clone(),
            mode:           view.mode.clone(),
            count:          view.items.len(),
            system_message: view.system_message.clone(),
        });
        self.inner.view_tx.send_replace(view.clone());
        view
    }

    /// Clears the refreshing flag a discarded fetch left on the cached view.
    /// A view already replaced by another selection is left alone.
    async fn settle_discarded(&self, universe: &str, mode: &str) {
        if !self.is_selected(universe, mode).await {
            return;
        }
        self.inner.view_tx.send_if_modified(|view| {
            let ours = view.refreshing && view.universe == universe && view.mode == mode;
            if ours {
                view.refreshing = false;
            }
            ours
        });
    }

    // ─── Pull ─────────────────────────────────────────────────────────────────

    /// Loads, optionally refreshes, and reconciles the picks for a selection.
    ///
    /// Returns `None` when `cancel` fired (or the selection moved on) before
    /// the response arrived; the late result is discarded, not applied.
    pub async fn fetch(
        &self,
        universe: &str,
        mode: &str,
        session_id: &str,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Option<RecommendationView> {
        *self.inner.selection.write().await = Some((universe.to_string(), mode.to_string()));

        let cached = self.load_snapshot();
        let market_open = self.inner.clock.is_market_open();
        let plan = plan_fetch(
            cached.as_ref(),
            universe,
            mode,
            force_refresh,
            &self.inner.policy,
            self.inner.clock.now(),
            market_open,
        );

        debug!(
            universe,
            mode,
            usable  = plan.usable,
            force   = plan.force_refresh,
            refresh = plan.request_refresh,
            market_open,
            "Recommendation fetch planned"
        );

        if let (true, Some(snapshot)) = (plan.usable, cached.as_ref()) {
            let mut view =
                RecommendationView::from_snapshot(snapshot, universe, mode, Provenance::Cached, None);
            view.refreshing = true;
            self.publish(view);
        }

        let query = RecommendationQuery {
            universe:   universe.to_string(),
            mode:       mode.to_string(),
            session_id: session_id.to_string(),
            refresh:    plan.request_refresh,
        };

        let result = tokio::select! {
            result = self.inner.api.fetch_recommendations(&query) => result,
            _ = cancel.cancelled() => {
                debug!(universe, mode, "Recommendation fetch cancelled");
                self.settle_discarded(universe, mode).await;
                return None;
            }
        };

        if cancel.is_cancelled() || !self.is_selected(universe, mode).await {
            debug!(universe, mode, "Discarding recommendation result for stale selection");
            self.settle_discarded(universe, mode).await;
            return None;
        }

        match result {
            Ok(response) => Some(
                self.reconcile(universe, mode, response.items, response.as_of, response.raw)
                    .await,
            ),
            Err(e) => {
                warn!(universe, mode, error = %e, "Recommendation pull failed");
                Some(self.fail_over(universe, mode, &e).await)
            }
        }
    }

    // ─── Push ─────────────────────────────────────────────────────────────────

    /// Applies a `top_picks_update` frame.  Frames for a selection other than
    /// the active one are ignored.
    pub async fn apply_push(
        &self,
        universe: &str,
        mode: &str,
        items: Vec<Pick>,
        as_of: Option<String>,
    ) -> Option<RecommendationView> {
        if !self.is_selected(universe, mode).await {
            debug!(universe, mode, "Ignoring top picks push for inactive selection");
            return None;
        }
        let raw = json!({
            "universe": universe,
            "mode":     mode,
            "items":    items,
            "as_of":    as_of,
        });
        Some(self.reconcile(universe, mode, items, as_of, raw).await)
    }

    // ─── Merge ────────────────────────────────────────────────────────────────

    /// The single authority deciding what is shown and what is persisted.
    async fn reconcile(
        &self,
        universe: &str,
        mode: &str,
        items: Vec<Pick>,
        as_of: Option<String>,
        raw: Value,
    ) -> RecommendationView {
        let _guard = self.inner.reconcile.lock().await;
        let policy = &self.inner.policy;

        if items.is_empty() || is_all_fallback_snapshot(&items, mode, policy) {
            let cached = self
                .load_snapshot()
                .filter(|s| is_usable(s, universe, mode, policy));

            info!(
                universe,
                mode,
                received    = items.len(),
                kept_cached = cached.is_some(),
                "No actionable picks in result"
            );

            let view = match cached {
                Some(snapshot) => RecommendationView::from_snapshot(
                    &snapshot,
                    universe,
                    mode,
                    Provenance::PreviousSession,
                    Some(previous_session_notice(mode)),
                ),
                None => RecommendationView::empty(universe, mode, no_setups_notice(mode)),
            };
            return self.publish(view);
        }

        let snapshot = RecommendationSnapshot {
            items,
            as_of,
            universe:     universe.to_string(),
            primary_mode: mode.to_string(),
            raw_response: raw,
        };
        save_json(self.inner.store.as_ref(), RECOMMENDATION_SNAPSHOT_KEY, &snapshot);

        info!(universe, mode, count = snapshot.items.len(), "Recommendation snapshot replaced");
        self.publish(RecommendationView::from_snapshot(
            &snapshot,
            universe,
            mode,
            Provenance::Live,
            None,
        ))
    }

    async fn fail_over(&self, universe: &str, mode: &str, err: &SyncError) -> RecommendationView {
        let _guard = self.inner.reconcile.lock().await;
        let view = match self.load_snapshot().filter(|s| s.primary_mode == mode) {
            Some(snapshot) => RecommendationView::from_snapshot(
                &snapshot,
                universe,
                mode,
                Provenance::LastSaved,
                Some(last_saved_notice(mode)),
            ),
            None => RecommendationView::empty(universe, mode, unavailable_notice(err)),
        };
        self.publish(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StrategyQuery;
    use crate::clock::FixedClock;
    use crate::error::SyncResult;
    use crate::models::{ExitAlert, RecommendationResponse, StrategyResponse};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    // ── Fixtures ──────────────────────────────────────────────────────────────

    struct ScriptedApi {
        response: StdMutex<SyncResult<RecommendationResponse>>,
        queries:  StdMutex<Vec<RecommendationQuery>>,
        calls:    AtomicUsize,
    }

    impl ScriptedApi {
        fn new(response: SyncResult<RecommendationResponse>) -> Arc<Self> {
            Arc::new(Self {
                response: StdMutex::new(response),
                queries:  StdMutex::new(Vec::new()),
                calls:    AtomicUsize::new(0),
            })
        }

        fn last_query(&self) -> RecommendationQuery {
            self.queries.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl DashboardApi for ScriptedApi {
        async fn fetch_recommendations(
            &self,
            query: &RecommendationQuery,
        ) -> SyncResult<RecommendationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            self.response.lock().unwrap().clone()
        }

        async fn suggest_strategy(&self, _query: &StrategyQuery) -> SyncResult<StrategyResponse> {
            Err(SyncError::Request("unused".into()))
        }

        async fn fetch_exit_events(&self, _: NaiveDate, _: &str) -> SyncResult<Vec<ExitAlert>> {
            Ok(Vec::new())
        }

        async fn fetch_monitor(&self, _: &str) -> SyncResult<Value> {
            Ok(Value::Null)
        }
    }

    /// Holds responses for `gated_universe` until `gate` is notified.
    struct GatedApi {
        gated_universe: String,
        gate:           Notify,
        queries:        StdMutex<Vec<RecommendationQuery>>,
    }

    impl GatedApi {
        fn new(gated_universe: &str) -> Arc<Self> {
            Arc::new(Self {
                gated_universe: gated_universe.to_string(),
                gate:           Notify::new(),
                queries:        StdMutex::new(Vec::new()),
            })
        }

        async fn wait_for_queries(&self, count: usize) {
            while self.queries.lock().unwrap().len() < count {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl DashboardApi for GatedApi {
        async fn fetch_recommendations(
            &self,
            query: &RecommendationQuery,
        ) -> SyncResult<RecommendationResponse> {
            self.queries.lock().unwrap().push(query.clone());
            if query.universe == self.gated_universe {
                self.gate.notified().await;
            }
            let symbol = if query.universe == "NIFTY50" { "TCS" } else { "INFY" };
            Ok(response(vec![pick(symbol, "Breakout")]))
        }

        async fn suggest_strategy(&self, _query: &StrategyQuery) -> SyncResult<StrategyResponse> {
            Err(SyncError::Request("unused".into()))
        }

        async fn fetch_exit_events(&self, _: NaiveDate, _: &str) -> SyncResult<Vec<ExitAlert>> {
            Ok(Vec::new())
        }

        async fn fetch_monitor(&self, _: &str) -> SyncResult<Value> {
            Ok(Value::Null)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()
    }

    fn pick(symbol: &str, rationale: &str) -> Pick {
        let mut pick = Pick::new(symbol);
        pick.rationale = Some(rationale.to_string());
        pick
    }

    fn snapshot(universe: &str, mode: &str, items: Vec<Pick>, as_of: DateTime<Utc>) -> RecommendationSnapshot {
        RecommendationSnapshot {
            items,
            as_of: Some(as_of.to_rfc3339()),
            universe: universe.to_string(),
            primary_mode: mode.to_string(),
            raw_response: Value::Null,
        }
    }

    fn response(items: Vec<Pick>) -> RecommendationResponse {
        RecommendationResponse {
            items,
            as_of: Some(now().to_rfc3339()),
            raw: json!({"source": "test"}),
        }
    }

    fn cache_with(
        api: Arc<dyn DashboardApi>,
        store: Arc<MemoryStore>,
        market_open: bool,
    ) -> RecommendationCache {
        RecommendationCache::new(
            api,
            store,
            Arc::new(FixedClock::new(now(), market_open)),
            StalenessPolicy::default(),
            EventBus::new(),
        )
    }

    // ── Policy ────────────────────────────────────────────────────────────────

    #[test]
    fn test_usable_requires_matching_selection() {
        let policy = StalenessPolicy::default();
        let snap = snapshot("NIFTY50", "Swing", vec![pick("TCS", "Trend")], now());
        assert!(is_usable(&snap, "NIFTY50", "Swing", &policy));
        assert!(!is_usable(&snap, "NIFTY100", "Swing", &policy));
        assert!(!is_usable(&snap, "NIFTY50", "Intraday", &policy));
    }

    #[test]
    fn test_all_fallback_only_matters_for_short_horizon() {
        let policy = StalenessPolicy::default();
        let items = vec![pick("TCS", "Fallback: no signal")];
        let scalping = snapshot("NIFTY50", "Scalping", items.clone(), now());
        let swing = snapshot("NIFTY50", "Swing", items, now());
        assert!(!is_usable(&scalping, "NIFTY50", "Scalping", &policy));
        assert!(is_usable(&swing, "NIFTY50", "Swing", &policy));
    }

    #[test]
    fn test_staleness_by_mode() {
        let policy = StalenessPolicy::default();
        let as_of = now() - chrono::Duration::minutes(11);
        let genuine = vec![pick("TCS", "Momentum")];

        let scalping = snapshot("NIFTY50", "Scalping", genuine.clone(), as_of);
        let plan = plan_fetch(Some(&scalping), "NIFTY50", "Scalping", false, &policy, now(), true);
        assert!(plan.usable);
        assert!(plan.force_refresh);
        assert!(plan.request_refresh);

        let swing = snapshot("NIFTY50", "Swing", genuine, as_of);
        let plan = plan_fetch(Some(&swing), "NIFTY50", "Swing", false, &policy, now(), true);
        assert!(!plan.force_refresh);
        assert!(!plan.request_refresh);
    }

    #[test]
    fn test_naive_as_of_is_read_as_utc() {
        let policy = StalenessPolicy::default();
        assert!(is_stale(Some("2024-01-05T09:00:00"), "Scalping", now(), &policy));
        assert!(!is_stale(Some("2024-01-05T09:55:00.500000"), "Scalping", now(), &policy));

        let mut snap = snapshot("NIFTY50", "Scalping", vec![pick("TCS", "Momentum")], now());
        snap.as_of = Some("2024-01-05T09:00:00".into());
        let plan = plan_fetch(Some(&snap), "NIFTY50", "Scalping", false, &policy, now(), true);
        assert!(plan.request_refresh);
    }

    #[test]
    fn test_refresh_flag_requires_open_market() {
        let policy = StalenessPolicy::default();
        let stale = snapshot(
            "NIFTY50",
            "Scalping",
            vec![pick("TCS", "Momentum")],
            now() - chrono::Duration::hours(3),
        );
        let plan = plan_fetch(Some(&stale), "NIFTY50", "Scalping", true, &policy, now(), false);
        assert!(plan.force_refresh);
        assert!(!plan.request_refresh);
    }

    #[test]
    fn test_mode_switch_forces_refresh_while_open() {
        let policy = StalenessPolicy::default();
        let swing = snapshot("NIFTY50", "Swing", vec![pick("TCS", "Trend")], now());
        let plan = plan_fetch(Some(&swing), "NIFTY50", "Intraday", false, &policy, now(), true);
        assert!(!plan.usable);
        assert!(plan.request_refresh);
    }

    // ── Fetch ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_empty_result_keeps_previous_session() {
        let store = Arc::new(MemoryStore::new());
        let saved = snapshot("NIFTY50", "Swing", vec![pick("TCS", "Trend")], now());
        save_json(&*store, RECOMMENDATION_SNAPSHOT_KEY, &saved);

        let api = ScriptedApi::new(Ok(response(Vec::new())));
        let cache = cache_with(api.clone(), store.clone(), true);
        let view = cache
            .fetch("NIFTY50", "Swing", "s-1", false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(view.items, saved.items);
        assert_eq!(view.provenance, Provenance::PreviousSession);
        assert!(view.system_message.unwrap().contains("previous session"));
        assert_eq!(cache.load_snapshot(), Some(saved));
    }

    #[tokio::test]
    async fn test_all_fallback_scalping_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let items: Vec<Pick> = ["TCS", "INFY", "WIPRO", "HDFCBANK", "SBIN"]
            .iter()
            .map(|s| pick(s, "Fallback: deterministic placeholder"))
            .collect();
        let api = ScriptedApi::new(Ok(response(items)));
        let cache = cache_with(api, store.clone(), true);

        let view = cache
            .fetch("NIFTY50", "Scalping", "s-1", false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(view.items.is_empty());
        assert!(view.system_message.unwrap().contains("no actionable Scalping setups"));
        assert!(store.get(RECOMMENDATION_SNAPSHOT_KEY).is_none());
    }

    #[tokio::test]
    async fn test_genuine_items_replace_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::new(Ok(response(vec![pick("TCS", "Breakout")])));
        let cache = cache_with(api.clone(), store, false);
        let mut rx = cache.watch();

        let view = cache
            .fetch("NIFTY50", "Swing", "s-1", true, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(view.provenance, Provenance::Live);
        assert_eq!(view.system_message, None);
        // Market closed: the server cache is never bypassed.
        assert!(!api.last_query().refresh);

        let saved = cache.load_snapshot().unwrap();
        assert_eq!(saved.universe, "NIFTY50");
        assert_eq!(saved.primary_mode, "Swing");
        assert_eq!(saved.raw_response, json!({"source": "test"}));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().provenance, Provenance::Live);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_same_mode_only() {
        let store = Arc::new(MemoryStore::new());
        let saved = snapshot("NIFTY100", "Swing", vec![pick("TCS", "Trend")], now());
        save_json(&*store, RECOMMENDATION_SNAPSHOT_KEY, &saved);
        let api = ScriptedApi::new(Err(SyncError::Request("connection refused".into())));
        let cache = cache_with(api, store, true);

        let view = cache
            .fetch("NIFTY50", "Swing", "s-1", false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(view.provenance, Provenance::LastSaved);
        assert_eq!(view.items.len(), 1);

        let view = cache
            .fetch("NIFTY50", "Intraday", "s-1", false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(view.provenance, Provenance::Empty);
        assert!(view.items.is_empty());
        assert!(view.system_message.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::new(Ok(response(vec![pick("TCS", "Breakout")])));
        let cache = cache_with(api, store.clone(), true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let view = cache.fetch("NIFTY50", "Swing", "s-1", false, &cancel).await;
        assert!(view.is_none());
        assert!(store.get(RECOMMENDATION_SNAPSHOT_KEY).is_none());
        assert_eq!(cache.current().provenance, Provenance::Idle);
    }

    #[tokio::test]
    async fn test_late_result_for_previous_selection_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let api = GatedApi::new("NIFTY50");
        let cache = cache_with(api.clone(), store, true);

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .fetch("NIFTY50", "Swing", "s-1", false, &CancellationToken::new())
                    .await
            })
        };
        api.wait_for_queries(1).await;

        let second = cache
            .fetch("NIFTY100", "Swing", "s-1", false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.universe, "NIFTY100");

        api.gate.notify_one();
        assert!(first.await.unwrap().is_none());

        let saved = cache.load_snapshot().unwrap();
        assert_eq!(saved.universe, "NIFTY100");
        assert_eq!(saved.items[0].symbol, "INFY");
        let shown = cache.current();
        assert_eq!(shown.universe, "NIFTY100");
        assert_eq!(shown.items[0].symbol, "INFY");
        assert_eq!(shown.provenance, Provenance::Live);
        assert_eq!(cache.selection().await, Some(("NIFTY100".into(), "Swing".into())));
    }

    #[tokio::test]
    async fn test_cancel_while_pending_restores_cached_view() {
        let store = Arc::new(MemoryStore::new());
        let saved = snapshot("NIFTY50", "Swing", vec![pick("WIPRO", "Trend")], now());
        save_json(&*store, RECOMMENDATION_SNAPSHOT_KEY, &saved);
        let api = GatedApi::new("NIFTY50");
        let cache = cache_with(api.clone(), store, true);
        let cancel = CancellationToken::new();

        let pending = {
            let cache = cache.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.fetch("NIFTY50", "Swing", "s-1", false, &cancel).await })
        };
        api.wait_for_queries(1).await;

        let shown = cache.current();
        assert_eq!(shown.provenance, Provenance::Cached);
        assert!(shown.refreshing);

        cancel.cancel();
        assert!(pending.await.unwrap().is_none());

        let shown = cache.current();
        assert_eq!(shown.provenance, Provenance::Cached);
        assert!(!shown.refreshing);
        assert_eq!(shown.items, saved.items);
        assert_eq!(cache.load_snapshot(), Some(saved));
    }

    #[tokio::test]
    async fn test_push_for_other_selection_ignored() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::new(Ok(response(vec![pick("TCS", "Breakout")])));
        let cache = cache_with(api, store, true);
        cache
            .fetch("NIFTY50", "Swing", "s-1", false, &CancellationToken::new())
            .await;

        let ignored = cache
            .apply_push("NIFTY50", "Scalping", vec![pick("INFY", "Scalp")], None)
            .await;
        assert!(ignored.is_none());

        let applied = cache
            .apply_push("NIFTY50", "Swing", vec![pick("INFY", "Rotation")], None)
            .await
            .unwrap();
        assert_eq!(applied.items[0].symbol, "INFY");
        assert_eq!(cache.load_snapshot().unwrap().items[0].symbol, "INFY");
    }
}
