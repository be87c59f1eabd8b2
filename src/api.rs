//! # api — pull endpoints
//!
//! [`DashboardApi`] is the port every cache pulls through; [`HttpApi`] is the
//! `reqwest` adapter used by the runner.
//!
//! ## Endpoints (relative to `API_BASE_URL`)
//!
//! | Method | Path                    | Returns                     |
//! |--------|-------------------------|-----------------------------|
//! | GET    | `/api/top-picks`        | `{ items[], as_of }`        |
//! | POST   | `/api/strategy/suggest` | `{ plan, explain[], ... }`  |
//! | GET    | `/api/alerts/exits`     | `{ exits[] }`               |
//! | GET    | `/api/monitor/{scope}`  | monitor payload object      |

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::models::{
    ExitAlert, ExitEventsResponse, RecommendationResponse, StrategyResponse,
};

// ─── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationQuery {
    pub universe:   String,
    pub mode:       String,
    pub session_id: String,
    /// Ask the server to bypass its own cache.
    pub refresh:    bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyQuery {
    pub symbol:     String,
    pub session_id: String,
    pub risk:       String,
    pub mode:       String,
    /// The pick row the plan is requested for.
    pub context:    Value,
}

// ─── Port ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch_recommendations(&self, query: &RecommendationQuery)
        -> SyncResult<RecommendationResponse>;

    async fn suggest_strategy(&self, query: &StrategyQuery) -> SyncResult<StrategyResponse>;

    async fn fetch_exit_events(&self, date: NaiveDate, strategy_id: &str)
        -> SyncResult<Vec<ExitAlert>>;

    async fn fetch_monitor(&self, scope: &str) -> SyncResult<Value>;
}

// ─── reqwest Adapter ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpApi {
    client:   reqwest::Client,
    base_url: String,
    timeout:  Duration,
}

impl HttpApi {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends the request and decodes a JSON body, mapping non-2xx to `Http`.
    async fn send_json(&self, request: reqwest::RequestBuilder) -> SyncResult<Value> {
        let response = request.timeout(self.timeout).send().await.map_err(|e| {
            warn!(error = %e, "Pull endpoint unreachable");
            SyncError::from(e)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Pull endpoint returned HTTP error");
            return Err(SyncError::Http { status, body });
        }

        response.json::<Value>().await.map_err(|e| {
            warn!(error = %e, "Pull response parse failed");
            SyncError::Decode(e.to_string())
        })
    }
}

#[async_trait]
impl DashboardApi for HttpApi {
    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> SyncResult<RecommendationResponse> {
        debug!(
            universe = %query.universe,
            mode     = %query.mode,
            refresh  = query.refresh,
            "Pulling top picks"
        );

        let refresh = if query.refresh { "true" } else { "false" };
        let request = self.client.get(self.url("/api/top-picks")).query(&[
            ("universe", query.universe.as_str()),
            ("mode", query.mode.as_str()),
            ("session_id", query.session_id.as_str()),
            ("refresh", refresh),
        ]);

        let raw = self.send_json(request).await?;
        let mut parsed: RecommendationResponse = serde_json::from_value(raw.clone())?;
        parsed.raw = raw;
        Ok(parsed)
    }

    async fn suggest_strategy(&self, query: &StrategyQuery) -> SyncResult<StrategyResponse> {
        debug!(symbol = %query.symbol, mode = %query.mode, "Requesting strategy plan");
        let request = self.client.post(self.url("/api/strategy/suggest")).json(query);
        let raw = self.send_json(request).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn fetch_exit_events(
        &self,
        date: NaiveDate,
        strategy_id: &str,
    ) -> SyncResult<Vec<ExitAlert>> {
        let date = date.format("%Y-%m-%d").to_string();
        let request = self
            .client
            .get(self.url("/api/alerts/exits"))
            .query(&[("date", date.as_str()), ("strategy_id", strategy_id)]);
        let raw = self.send_json(request).await?;
        let parsed: ExitEventsResponse = serde_json::from_value(raw)?;
        Ok(parsed.exits)
    }

    async fn fetch_monitor(&self, scope: &str) -> SyncResult<Value> {
        let request = self.client.get(self.url(&format!("/api/monitor/{scope}")));
        self.send_json(request).await
    }
}
