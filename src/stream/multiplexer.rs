//! # stream::multiplexer — SubscriptionMultiplexer
//!
//! Ref-counts interest in per-symbol tick streams so independent callers
//! (two screens watching `TCS`, say) share one channel subscription.
//!
//! ```text
//!  refcount 0 ──subscribe──▶ 1      → {"action":"subscribe",  ...}
//!  refcount 1 ──subscribe──▶ 2      → (no frame)
//!  refcount 2 ──unsubscribe▶ 1      → (no frame)
//!  refcount 1 ──unsubscribe▶ 0      → {"action":"unsubscribe",...}
//! ```
//!
//! The ref-count map is the single source of truth.  While the channel is
//! closed nothing is sent; [`SubscriptionMultiplexer::attach`] re-announces
//! every active symbol when the connection (re)opens.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::ClientCommand;

#[derive(Debug, Default)]
struct MuxInner {
    ref_counts: HashMap<String, usize>,
    /// `Some` while the streaming channel is open.
    outbound:   Option<mpsc::UnboundedSender<ClientCommand>>,
}

impl MuxInner {
    /// Sends on the open channel; a dead receiver means the channel closed.
    fn flush(&mut self, command: ClientCommand) -> Option<ClientCommand> {
        let tx = self.outbound.as_ref()?;
        if tx.send(command.clone()).is_err() {
            self.outbound = None;
            return None;
        }
        Some(command)
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionMultiplexer {
    inner: Mutex<MuxInner>,
}

impl SubscriptionMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MuxInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds one unit of interest per listed symbol.
    ///
    /// Returns the subscribe frame actually written, `None` when every symbol
    /// was already active or the channel is closed.
    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Option<ClientCommand> {
        let mut inner = self.lock();
        let mut activated: Vec<String> = Vec::new();

        for symbol in normalize(symbols) {
            let count = inner.ref_counts.entry(symbol.clone()).or_insert(0);
            *count += 1;
            if *count == 1 && !activated.contains(&symbol) {
                activated.push(symbol);
            }
        }

        if activated.is_empty() {
            return None;
        }

        debug!(symbols = ?activated, open = inner.outbound.is_some(), "Symbols activated");
        inner.flush(ClientCommand::subscribe(activated))
    }

    /// Removes one unit of interest per listed symbol.
    ///
    /// Symbols with no recorded interest are ignored.  Returns the
    /// unsubscribe frame actually written, if any.
    pub fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Option<ClientCommand> {
        let mut inner = self.lock();
        let mut released: Vec<String> = Vec::new();

        for symbol in normalize(symbols) {
            let Some(count) = inner.ref_counts.get_mut(&symbol) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                inner.ref_counts.remove(&symbol);
                released.push(symbol);
            }
        }

        if released.is_empty() {
            return None;
        }

        debug!(symbols = ?released, open = inner.outbound.is_some(), "Symbols released");
        inner.flush(ClientCommand::unsubscribe(released))
    }

    /// Like [`subscribe`](Self::subscribe), releasing the interest when the
    /// returned guard is dropped.
    pub fn subscribe_guard<S: AsRef<str>>(self: &Arc<Self>, symbols: &[S]) -> SubscriptionGuard {
        self.subscribe(symbols);
        SubscriptionGuard {
            mux:     Arc::clone(self),
            symbols: normalize(symbols),
        }
    }

    /// Called by the connection once the channel is open.  Announces every
    /// symbol with a positive ref count in one frame.
    pub fn attach(&self, outbound: mpsc::UnboundedSender<ClientCommand>) -> Option<ClientCommand> {
        let mut inner = self.lock();
        inner.outbound = Some(outbound);

        let active: Vec<String> = inner
            .ref_counts
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if active.is_empty() {
            return None;
        }

        info!(count = active.len(), "Re-announcing active subscriptions");
        inner.flush(ClientCommand::subscribe(active))
    }

    /// Called by the connection when the channel closes.
    pub fn detach(&self) {
        self.lock().outbound = None;
    }

    pub fn is_open(&self) -> bool {
        self.lock().outbound.is_some()
    }

    pub fn ref_count(&self, symbol: &str) -> usize {
        let symbol = symbol.trim().to_uppercase();
        self.lock().ref_counts.get(&symbol).copied().unwrap_or(0)
    }

    /// Symbols currently announced (ref count > 0), sorted.
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.lock().ref_counts.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Uppercase, trimmed, blanks dropped.  Duplicates are kept: each occurrence
/// is one unit of interest.
fn normalize<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    symbols
        .iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ─── Guard ────────────────────────────────────────────────────────────────────

/// Holds interest in a set of symbols until dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    mux:     Arc<SubscriptionMultiplexer>,
    symbols: Vec<String>,
}

impl SubscriptionGuard {
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.mux.unsubscribe(&self.symbols);
    }
}
