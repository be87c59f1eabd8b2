//! # protocol
//!
//! Wire format of the streaming channel.
//!
//! ```text
//!  client ──▶ server   {"action":"subscribe","symbols":["TCS","INFY"]}
//!  server ──▶ client   {"type":"tick","symbol":"TCS","data":{"last_price":3890.5}}
//!                      {"type":"top_picks_update","universe":..,"mode":..,"items":[..]}
//!                      {"type":"scalping_monitor_update","exits":[..]}
//!                      ...
//! ```
//!
//! Inbound frames are decoded in two steps: first into a loose JSON value so a
//! missing or unknown `type` can be told apart from a broken payload, then into
//! the typed [`StreamMessage`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{ExitAlert, Pick, TickPayload};

// ─── Client → Server ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// The only frame the client ever writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommand {
    pub action:  SubscriptionAction,
    pub symbols: Vec<String>,
}

impl ClientCommand {
    pub fn subscribe(symbols: Vec<String>) -> Self {
        Self { action: SubscriptionAction::Subscribe, symbols }
    }

    pub fn unsubscribe(symbols: Vec<String>) -> Self {
        Self { action: SubscriptionAction::Unsubscribe, symbols }
    }

    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"action":"noop","symbols":[]}"#.to_string())
    }
}

// ─── Server → Client ──────────────────────────────────────────────────────────

/// Every frame type the dashboard understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Tick {
        symbol: String,
        data:   TickPayload,
    },

    TopPicksUpdate {
        universe: String,
        mode:     String,
        #[serde(default)]
        items:    Vec<Pick>,
        #[serde(default)]
        as_of:    Option<String>,
    },

    MarketSummaryUpdate {
        #[serde(default)]
        region:  Option<String>,
        #[serde(default)]
        payload: Value,
    },

    FlowsUpdate {
        #[serde(default)]
        payload: Value,
    },

    ScalpingMonitorUpdate {
        #[serde(default)]
        active_positions: Option<Value>,
        #[serde(default)]
        exits:            Vec<ExitAlert>,
    },

    PortfolioMonitorUpdate {
        scope: String,
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
}

const KNOWN_TYPES: &[&str] = &[
    "tick",
    "top_picks_update",
    "market_summary_update",
    "flows_update",
    "scalping_monitor_update",
    "portfolio_monitor_update",
];

/// Why an inbound frame was dropped.
#[derive(Debug, Error, PartialEq)]
pub enum FrameRejection {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame has no string `type` tag")]
    MissingType,

    #[error("unknown frame type `{0}`")]
    UnknownType(String),

    #[error("`{kind}` frame has an invalid payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

/// Decodes one text frame.
pub fn decode_frame(text: &str) -> Result<StreamMessage, FrameRejection> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FrameRejection::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameRejection::MissingType)?
        .to_string();

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(FrameRejection::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| FrameRejection::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}
