//! # stream::connection — StreamConnection
//!
//! Keeps one logical streaming session alive for the lifetime of the
//! dashboard.
//!
//! ```text
//!  ┌─────────┐  open   ┌──────────┐  close / error  ┌────────────┐
//!  │ connect │ ──────▶ │ session  │ ──────────────▶ │ sleep 5 s  │ ─┐
//!  └─────────┘         └──────────┘                 └────────────┘  │
//!       ▲   connect failure ───────────────────────────────▲        │
//!       └───────────────────────────────────────────────────────────┘
//! ```
//!
//! On open the multiplexer is attached and re-announces every active symbol;
//! on close it is detached so subscription changes are only recorded.  The
//! delay is fixed: no backoff, no attempt cap.  Only the cancellation token
//! ends the loop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::events::{DashboardEvent, EventBus};
use crate::protocol::ClientCommand;
use crate::stream::multiplexer::SubscriptionMultiplexer;
use crate::stream::router::StreamRouter;

pub struct StreamConnection {
    url:             String,
    reconnect_delay: Duration,
    mux:             Arc<SubscriptionMultiplexer>,
    router:          StreamRouter,
    events:          EventBus,
}

impl StreamConnection {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        mux: Arc<SubscriptionMultiplexer>,
        router: StreamRouter,
        events: EventBus,
    ) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            mux,
            router,
            events,
        }
    }

    /// Connect → session → fixed delay, until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(url = %self.url, "Stream connection started");
        let mut attempt: u64 = 0;

        while !cancel.is_cancelled() {
            attempt += 1;
            match self.session(&cancel).await {
                Ok(()) => debug!(attempt, "Stream session ended"),
                Err(e) => warn!(attempt, error = %e, "Stream session failed"),
            }

            if cancel.is_cancelled() {
                break;
            }

            debug!(delay_secs = self.reconnect_delay.as_secs_f64(), "Reconnecting after delay");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.mux.detach();
        info!("Stream connection stopped");
    }

    /// One connection lifetime.  `Ok` for a clean close or cancellation.
    async fn session(&self, cancel: &CancellationToken) -> SyncResult<()> {
        let (ws, _) = tokio::select! {
            connected = connect_async(self.url.as_str()) => connected?,
            _ = cancel.cancelled() => return Ok(()),
        };
        let (mut sink, mut stream) = ws.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientCommand>();
        self.mux.attach(outbound_tx);
        self.events.publish(DashboardEvent::Connection { connected: true });
        info!(url = %self.url, active = self.mux.active_symbols().len(), "Stream connected");

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }

                Some(command) = outbound_rx.recv() => {
                    debug!(action = ?command.action, symbols = ?command.symbols, "Sending subscription frame");
                    if let Err(e) = sink.send(Message::Text(command.to_json())).await {
                        break Err(SyncError::from(e));
                    }
                }

                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.router.route(&text).await,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.router.route(&text).await,
                        Err(_) => warn!("Dropping non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            break Err(SyncError::from(e));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(frame = ?frame, "Server closed the stream");
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(SyncError::from(e)),
                    None => break Ok(()),
                },
            }
        };

        self.mux.detach();
        self.events.publish(DashboardEvent::Connection { connected: false });
        outcome
    }
}
