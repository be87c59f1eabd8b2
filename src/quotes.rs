//! # quotes — QuoteStore
//!
//! Latest known tick per symbol.  Pure last-write-wins in arrival order: the
//! last tick *received* wins, not the last tick *generated*.  No history is
//! kept.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::sync::RwLock;
use tracing::trace;

use crate::events::{DashboardEvent, EventBus};
use crate::models::{Tick, TickPayload};

#[derive(Debug, Clone)]
pub struct QuoteStore {
    ticks:  Arc<RwLock<HashMap<String, Tick>>>,
    events: EventBus,
}

impl QuoteStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            ticks: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Merges one tick and returns the resulting value.
    ///
    /// `last_price` is always replaced; `change_percent` / `volume` only when
    /// the payload carries a number; `updated_at` falls back to now.
    pub async fn apply_tick(&self, symbol: &str, data: &TickPayload) -> Tick {
        let symbol = symbol.trim().to_uppercase();
        let updated_at = data
            .timestamp
            .clone()
            .filter(|ts| !ts.trim().is_empty())
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        let merged = {
            let mut ticks = self.ticks.write().await;
            let previous = ticks.get(&symbol);
            let tick = Tick {
                symbol:         symbol.clone(),
                last_price:     data.last_price,
                change_percent: data.change_percent.or(previous.and_then(|p| p.change_percent)),
                volume:         data.volume.or(previous.and_then(|p| p.volume)),
                updated_at,
            };
            ticks.insert(symbol, tick.clone());
            tick
        };

        trace!(symbol = %merged.symbol, price = merged.last_price, "Tick applied");
        self.events.publish(DashboardEvent::Quote { tick: merged.clone() });
        merged
    }

    pub async fn get(&self, symbol: &str) -> Option<Tick> {
        let ticks = self.ticks.read().await;
        ticks.get(&symbol.trim().to_uppercase()).cloned()
    }

    /// All latest ticks (clone, so the lock is released immediately).
    pub async fn snapshot(&self) -> Vec<Tick> {
        let ticks = self.ticks.read().await;
        ticks.values().cloned().collect()
    }
}
