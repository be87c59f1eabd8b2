//! # models::strategy
//!
//! Defines [`StrategyCacheEntry`], the per-symbol strategy plan the server
//! suggests for a (mode, risk, as-of-day) combination, and the key builder
//! that makes those entries memoizable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::parse_iso;
use crate::models::tick::number_or_none;

// ─── StrategyCacheEntry ───────────────────────────────────────────────────────

/// One memoized plan.  Entries are replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCacheEntry {
    pub symbol: String,

    /// Opaque plan object; `None` while loading or after a failed fetch.
    #[serde(default)]
    pub plan: Option<Value>,

    /// Human-readable explanation lines.
    #[serde(default)]
    pub explain: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Value>,

    #[serde(
        default,
        alias = "blendScore",
        deserialize_with = "number_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub blend_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Value>,
}

impl StrategyCacheEntry {
    /// A placeholder with no plan, handed out while a fetch is pending.
    pub fn placeholder(symbol: &str) -> Self {
        Self {
            symbol:         symbol.to_string(),
            plan:           None,
            explain:        Vec::new(),
            scores:         None,
            blend_score:    None,
            recommendation: None,
            agents:         None,
        }
    }

    #[inline]
    pub fn has_plan(&self) -> bool {
        self.plan.as_ref().is_some_and(|plan| !plan.is_null())
    }
}

/// Response body of the strategy suggest endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyResponse {
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub explain: Vec<String>,
    #[serde(default)]
    pub scores: Option<Value>,
    #[serde(default, alias = "blendScore", deserialize_with = "number_or_none")]
    pub blend_score: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<Value>,
    #[serde(default)]
    pub agents: Option<Value>,
}

impl StrategyResponse {
    pub fn into_entry(self, symbol: &str) -> StrategyCacheEntry {
        StrategyCacheEntry {
            symbol:         symbol.to_string(),
            plan:           self.plan,
            explain:        self.explain,
            scores:         self.scores,
            blend_score:    self.blend_score,
            recommendation: self.recommendation,
            agents:         self.agents,
        }
    }
}

// ─── Cache Key ────────────────────────────────────────────────────────────────

/// UTC calendar day (`YYYY-MM-DD`) of an ISO timestamp, or `"unknown"`.
pub fn as_of_day(as_of: Option<&str>) -> String {
    as_of
        .and_then(parse_iso)
        .map(|ts| ts.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `SYMBOL|mode|risk|day`, one entry per key.
pub fn build_key(symbol: &str, mode: &str, risk: &str, as_of: Option<&str>) -> String {
    format!(
        "{}|{}|{}|{}",
        symbol.trim().to_uppercase(),
        mode,
        risk,
        as_of_day(as_of)
    )
}
