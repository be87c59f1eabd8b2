//! # models::exit
//!
//! Defines [`ExitAlert`], a notification that a monitored position was
//! closed.  Alerts arrive both from the stream and from the periodic pull.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::parse_iso;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitAlert {
    pub symbol: String,

    /// e.g. `"TARGET"`, `"STOP"`, `"TIME"`.
    #[serde(default)]
    pub exit_reason: String,

    #[serde(default)]
    pub return_pct: f64,

    #[serde(default)]
    pub exit_price: f64,

    #[serde(default)]
    pub entry_price: f64,

    /// ISO-8601; kept as text so an unparsable value can still be displayed.
    pub exit_time: String,
}

impl ExitAlert {
    /// Parsed `exit_time`, `None` when it is not an ISO-8601 timestamp.
    pub fn exit_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_iso(&self.exit_time)
    }
}

/// Response body of the exit events pull endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExitEventsResponse {
    #[serde(default, alias = "events", alias = "items")]
    pub exits: Vec<ExitAlert>,
}
