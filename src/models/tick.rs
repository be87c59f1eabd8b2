//! # models::tick
//!
//! Defines [`Tick`], the latest known quote for one symbol, and
//! [`TickPayload`], the `data` object carried by a streamed `tick` frame.
//!
//! The stream is loosely typed: `change_percent` / `volume` may be missing or
//! carry a non-numeric placeholder.  Both cases decode to `None` so the
//! QuoteStore can keep the previously known value instead of dropping the
//! whole frame.

use serde::{Deserialize, Deserializer, Serialize};

/// The merged, latest-value view of a symbol's quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Normalised (uppercase) trading symbol, e.g. `"TCS"`.
    pub symbol: String,

    /// Last traded price. Always overwritten by the newest tick.
    pub last_price: f64,

    /// Day change in percent. Retained across ticks that omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,

    /// Cumulative traded volume. Retained across ticks that omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// ISO-8601 timestamp of the tick (server time when provided).
    pub updated_at: String,
}

/// The `data` object of a `{"type":"tick"}` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickPayload {
    pub last_price: f64,

    #[serde(default, deserialize_with = "number_or_none")]
    pub change_percent: Option<f64>,

    #[serde(default, deserialize_with = "number_or_none")]
    pub volume: Option<f64>,

    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Decodes any JSON value, keeping it only when it is a number.
pub(crate) fn number_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}
