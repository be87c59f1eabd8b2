//! End-to-end stream session against an in-process WebSocket server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use signaldesk::api::{DashboardApi, RecommendationQuery, StrategyQuery};
use signaldesk::clock::FixedClock;
use signaldesk::config::{StalenessPolicy, SyncConfig};
use signaldesk::models::{ExitAlert, RecommendationResponse, StrategyResponse};
use signaldesk::protocol::{ClientCommand, SubscriptionAction};
use signaldesk::storage::MemoryStore;
use signaldesk::{Dashboard, SyncResult};

// ─── Mock server ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct MockServer {
    /// (connection number, client frame)
    received:    mpsc::UnboundedSender<(usize, String)>,
    connections: Arc<AtomicUsize>,
    /// Frames pushed after the first client frame of every connection.
    script:      Arc<Vec<String>>,
    /// Close the first connection right after the script.
    drop_first:  bool,
}

async fn upgrade(ws: WebSocketUpgrade, State(server): State<MockServer>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, server))
}

async fn serve_socket(mut socket: WebSocket, server: MockServer) {
    let number = server.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut scripted = false;

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else { continue };
        let _ = server.received.send((number, text));

        if !scripted {
            scripted = true;
            for frame in server.script.iter() {
                if socket.send(Message::Text(frame.clone())).await.is_err() {
                    return;
                }
            }
            if server.drop_first && number == 1 {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

async fn start_server(script: Vec<String>, drop_first: bool) -> (SocketAddr, mpsc::UnboundedReceiver<(usize, String)>, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));
    let server = MockServer {
        received: tx,
        connections: connections.clone(),
        script: Arc::new(script),
        drop_first,
    };
    let app = Router::new().route("/ws/stream", get(upgrade)).with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx, connections)
}

// ─── Client fixtures ──────────────────────────────────────────────────────────

struct NoopApi;

#[async_trait]
impl DashboardApi for NoopApi {
    async fn fetch_recommendations(&self, _: &RecommendationQuery) -> SyncResult<RecommendationResponse> {
        Ok(RecommendationResponse::default())
    }

    async fn suggest_strategy(&self, _: &StrategyQuery) -> SyncResult<StrategyResponse> {
        Ok(StrategyResponse::default())
    }

    async fn fetch_exit_events(&self, _: NaiveDate, _: &str) -> SyncResult<Vec<ExitAlert>> {
        Ok(Vec::new())
    }

    async fn fetch_monitor(&self, _: &str) -> SyncResult<Value> {
        Ok(Value::Null)
    }
}

fn dashboard(addr: SocketAddr) -> Dashboard {
    let config = SyncConfig {
        stream_url:       format!("ws://{addr}/ws/stream"),
        api_base_url:     format!("http://{addr}"),
        session_id:       "it-session".into(),
        universe:         "NIFTY50".into(),
        primary_mode:     "Swing".into(),
        risk_profile:     "Moderate".into(),
        watchlist:        Vec::new(),
        exit_strategy_id: "scalping".into(),
        reconnect_delay:  Duration::from_millis(100),
        exit_poll_every:  Duration::from_secs(60),
        refresh_every:    Duration::from_secs(300),
        prefetch_limit:   3,
        staleness:        StalenessPolicy::default(),
        store_dir:        ".signaldesk-it".into(),
        http_timeout:     Duration::from_secs(1),
    };
    Dashboard::new(
        config,
        Arc::new(NoopApi),
        Arc::new(MemoryStore::new()),
        Arc::new(FixedClock::new(Utc::now(), true)),
    )
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<(usize, String)>) -> (usize, ClientCommand) {
    let (number, text) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for client frame")
        .expect("mock server gone");
    (number, serde_json::from_str(&text).expect("client frame is a command"))
}

fn tick_frame(symbol: &str, price: f64) -> String {
    json!({ "type": "tick", "symbol": symbol, "data": { "last_price": price } }).to_string()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_announces_routes_and_reannounces_after_drop() {
    let (addr, mut frames, _) = start_server(vec![tick_frame("TCS", 3890.5)], true).await;
    let desk = dashboard(addr);
    let _guard = desk.watch_symbols(&["tcs"]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(desk.stream_connection().run(cancel.child_token()));

    // Active set announced on open.
    let (number, command) = next_frame(&mut frames).await;
    assert_eq!(number, 1);
    assert_eq!(command, ClientCommand::subscribe(vec!["TCS".into()]));

    // Server dropped the first session; the reconnect announces again.
    let (number, command) = next_frame(&mut frames).await;
    assert_eq!(number, 2);
    assert_eq!(command.action, SubscriptionAction::Subscribe);
    assert_eq!(command.symbols, vec!["TCS".to_string()]);

    let tick = desk.quotes.get("TCS").await.expect("pushed tick stored");
    assert_eq!(tick.last_price, 3890.5);

    // New interest on an open channel goes out immediately.
    desk.mux.subscribe(&["INFY"]);
    let (number, command) = next_frame(&mut frames).await;
    assert_eq!(number, 2);
    assert_eq!(command, ClientCommand::subscribe(vec!["INFY".into()]));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("connection loop stops on cancel")
        .unwrap();
    assert!(!desk.mux.is_open());
}

#[tokio::test]
async fn test_malformed_frames_keep_session_alive() {
    let script = vec![
        "{not json".to_string(),
        json!({ "type": "heartbeat" }).to_string(),
        json!({ "symbol": "TCS" }).to_string(),
        tick_frame("INFY", 1502.25),
    ];
    let (addr, mut frames, connections) = start_server(script, false).await;
    let desk = dashboard(addr);
    let _guard = desk.watch_symbols(&["INFY"]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(desk.stream_connection().run(cancel.child_token()));
    next_frame(&mut frames).await;

    let mut stored = None;
    for _ in 0..200 {
        stored = desk.quotes.get("INFY").await;
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored.map(|t| t.last_price), Some(1502.25));
    assert_eq!(connections.load(Ordering::SeqCst), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}
