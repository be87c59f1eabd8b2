//! # monitor — MonitorBoard
//!
//! Pass-through state the dashboard displays but does not interpret: market
//! summaries per region, fund flows, scalping active positions and the
//! portfolio/watchlist monitor per scope.
//!
//! Portfolio state is written by both the stream (`portfolio_monitor_update`)
//! and the `/api/monitor/{scope}` pull; both go through
//! [`MonitorBoard::apply_portfolio`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::DashboardApi;
use crate::error::SyncResult;
use crate::events::{DashboardEvent, EventBus};

/// Region key used when a market summary frame carries none.
pub const DEFAULT_REGION: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorState {
    pub market_summary:   HashMap<String, Value>,
    pub flows:            Option<Value>,
    pub active_positions: Option<Value>,
    pub portfolio:        HashMap<String, Value>,
}

/// Shallow merge: object fields from `update` overwrite those in `current`;
/// anything that is not an object pair is replaced whole.
pub fn merge_fields(current: Option<&Value>, update: Value) -> Value {
    match (current, update) {
        (Some(Value::Object(existing)), Value::Object(fields)) => {
            let mut merged = existing.clone();
            merged.extend(fields);
            Value::Object(merged)
        }
        (_, update) => update,
    }
}

#[derive(Clone)]
pub struct MonitorBoard {
    state:  Arc<RwLock<MonitorState>>,
    api:    Arc<dyn DashboardApi>,
    events: EventBus,
}

impl MonitorBoard {
    pub fn new(api: Arc<dyn DashboardApi>, events: EventBus) -> Self {
        Self {
            state: Arc::new(RwLock::new(MonitorState::default())),
            api,
            events,
        }
    }

    pub async fn snapshot(&self) -> MonitorState {
        self.state.read().await.clone()
    }

    fn notify(&self, topic: &str) {
        self.events.publish(DashboardEvent::Monitor { topic: topic.to_string() });
    }

    pub async fn apply_market_summary(&self, region: Option<String>, payload: Value) {
        let region = region
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        debug!(region = %region, "Market summary updated");
        self.state.write().await.market_summary.insert(region, payload);
        self.notify("market_summary");
    }

    pub async fn apply_flows(&self, payload: Value) {
        self.state.write().await.flows = Some(payload);
        self.notify("flows");
    }

    pub async fn apply_active_positions(&self, positions: Value) {
        self.state.write().await.active_positions = Some(positions);
        self.notify("active_positions");
    }

    pub async fn apply_portfolio(&self, scope: &str, fields: Value) {
        {
            let mut state = self.state.write().await;
            let merged = merge_fields(state.portfolio.get(scope), fields);
            state.portfolio.insert(scope.to_string(), merged);
        }
        debug!(scope, "Portfolio monitor updated");
        self.notify("portfolio");
    }

    /// Pulls one scope and applies it.  On failure the existing state is kept.
    pub async fn refresh_portfolio(&self, scope: &str) -> SyncResult<()> {
        match self.api.fetch_monitor(scope).await {
            Ok(payload) => {
                self.apply_portfolio(scope, payload).await;
                Ok(())
            }
            Err(e) => {
                warn!(scope, error = %e, "Monitor pull failed");
                Err(e)
            }
        }
    }
}
