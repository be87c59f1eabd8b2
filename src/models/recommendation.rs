//! # models::recommendation
//!
//! Defines [`Pick`] (one "top pick" row) and [`RecommendationSnapshot`], the
//! immutable result set persisted by the RecommendationCache.
//!
//! Scores and most row fields are opaque to the synchronization core.  The
//! only fields read here are `symbol` and the texts that carry the fallback
//! marker; everything else round-trips through `extra` untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::tick::number_or_none;

/// Reserved prefix the server puts in front of deterministic placeholder picks.
pub const FALLBACK_MARKER: &str = "Fallback:";

// ─── Pick ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub symbol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Either a single string or a list of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_findings: Option<Value>,

    #[serde(default, deserialize_with = "number_or_none", skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pick {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol:       symbol.into(),
            rationale:    None,
            key_findings: None,
            score:        None,
            extra:        Map::new(),
        }
    }

    /// `true` when the rationale or key findings start with [`FALLBACK_MARKER`].
    pub fn is_fallback(&self) -> bool {
        let rationale = self.rationale.as_deref().is_some_and(starts_with_marker);
        let findings = match &self.key_findings {
            Some(Value::String(text)) => starts_with_marker(text),
            Some(Value::Array(lines)) => lines
                .first()
                .and_then(Value::as_str)
                .is_some_and(starts_with_marker),
            _ => false,
        };
        rationale || findings
    }

    /// The row as a JSON object, used as context for strategy suggestions.
    pub fn to_context(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn starts_with_marker(text: &str) -> bool {
    text.trim_start().starts_with(FALLBACK_MARKER)
}

/// `true` when the list is non-empty and every pick is a fallback.
pub fn all_fallback(items: &[Pick]) -> bool {
    !items.is_empty() && items.iter().all(Pick::is_fallback)
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// A fully-formed recommendation result tagged with the selection that
/// produced it.  Never mutated in place; a newer snapshot replaces it whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSnapshot {
    pub items:        Vec<Pick>,
    #[serde(default)]
    pub as_of:        Option<String>,
    pub universe:     String,
    pub primary_mode: String,
    #[serde(default)]
    pub raw_response: Value,
}

/// Response body of the top-picks pull endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default)]
    pub items: Vec<Pick>,
    #[serde(default)]
    pub as_of: Option<String>,
    /// Whole body as received, persisted alongside the parsed items.
    #[serde(skip)]
    pub raw: Value,
}
