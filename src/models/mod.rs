//! Domain models shared across the synchronization core.

pub mod exit;
pub mod recommendation;
pub mod strategy;
pub mod tick;

pub use exit::{ExitAlert, ExitEventsResponse};
pub use recommendation::{
    all_fallback, Pick, RecommendationResponse, RecommendationSnapshot, FALLBACK_MARKER,
};
pub use strategy::{build_key, StrategyCacheEntry, StrategyResponse};
pub use tick::{Tick, TickPayload};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses an ISO-8601 timestamp.  RFC 3339 (with offset) first; a timestamp
/// without an offset, optionally with fractional seconds, is read as UTC.
pub fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
