//! # stream::router
//!
//! Classifies inbound frames by their `type` tag and hands each one to the
//! component that owns the entity.
//!
//! | `type`                     | destination                                  |
//! |----------------------------|----------------------------------------------|
//! | `tick`                     | QuoteStore                                   |
//! | `top_picks_update`         | RecommendationCache (push path)              |
//! | `market_summary_update`    | MonitorBoard                                 |
//! | `flows_update`             | MonitorBoard                                 |
//! | `scalping_monitor_update`  | MonitorBoard (positions) + ExitAlertBook     |
//! | `portfolio_monitor_update` | MonitorBoard                                 |

use serde_json::Value;
use tracing::{debug, warn};

use crate::exits::ExitAlertBook;
use crate::monitor::MonitorBoard;
use crate::protocol::{decode_frame, FrameRejection, StreamMessage};
use crate::quotes::QuoteStore;
use crate::recommendations::RecommendationCache;

#[derive(Clone)]
pub struct StreamRouter {
    pub quotes:          QuoteStore,
    pub recommendations: RecommendationCache,
    pub exits:           ExitAlertBook,
    pub monitor:         MonitorBoard,
}

impl StreamRouter {
    /// Decodes and dispatches one text frame.  Malformed frames are logged
    /// and dropped; they never end the session.
    pub async fn route(&self, text: &str) {
        match decode_frame(text) {
            Ok(message) => self.dispatch(message).await,
            Err(FrameRejection::UnknownType(kind)) => {
                debug!(kind = %kind, "Ignoring frame of unknown type");
            }
            Err(rejection) => {
                warn!(reason = %rejection, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    pub async fn dispatch(&self, message: StreamMessage) {
        match message {
            StreamMessage::Tick { symbol, data } => {
                self.quotes.apply_tick(&symbol, &data).await;
            }
            StreamMessage::TopPicksUpdate { universe, mode, items, as_of } => {
                self.recommendations
                    .apply_push(&universe, &mode, items, as_of)
                    .await;
            }
            StreamMessage::MarketSummaryUpdate { region, payload } => {
                self.monitor.apply_market_summary(region, payload).await;
            }
            StreamMessage::FlowsUpdate { payload } => {
                self.monitor.apply_flows(payload).await;
            }
            StreamMessage::ScalpingMonitorUpdate { active_positions, exits } => {
                if let Some(positions) = active_positions {
                    self.monitor.apply_active_positions(positions).await;
                }
                self.exits.ingest(&exits).await;
            }
            StreamMessage::PortfolioMonitorUpdate { scope, fields } => {
                self.monitor.apply_portfolio(&scope, Value::Object(fields)).await;
            }
        }
    }
}
