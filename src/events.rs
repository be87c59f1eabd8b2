//! # events
//!
//! Defines [`DashboardEvent`], every change notification the core publishes
//! for the visual layer (and for the headless runner's log).
//!
//! Uses `tokio::sync::broadcast` so any number of observers can attach; a
//! publish with no observer attached is not an error.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{ExitAlert, Tick};

/// Event capacity per observer before lagging observers start skipping.
const EVENT_CAPACITY: usize = 512;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DashboardEvent {
    /// Streaming channel opened or closed.
    Connection { connected: bool },

    /// A tick was merged into the QuoteStore.
    Quote { tick: Tick },

    /// The displayed recommendation set changed.
    Recommendations {
        universe:       String,
        mode:           String,
        count:          usize,
        system_message: Option<String>,
    },

    /// A strategy plan was stored for a cache key.
    StrategyPlan { key: String, ready: bool },

    /// The deduplicated exit-alert set changed.
    ExitAlerts { alerts: Vec<ExitAlert> },

    /// Pass-through monitor state changed (`market_summary`, `flows`, ...).
    Monitor { topic: String },
}

impl DashboardEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

/// Cloneable publish handle shared by every component.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: DashboardEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self { Self::new() }
}
