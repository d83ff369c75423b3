//! HTTP API and WebSocket dashboard server

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dashboard::page::{render_page, PostData, Tab};
use crate::modules::holder_fetcher::{Holder, HolderFetcherStats, HolderSource};
use crate::modules::market_poller::MarketPollerStats;
use crate::modules::whale_simulator::{WhaleSimulatorStats, WhaleTx};
use crate::modules::{HolderFetcher, MarketPoller, WhaleSimulator};
use crate::state::{SessionSnapshot, SessionState};
use crate::utils::format::{format_change, format_compact_number, format_currency};
use crate::utils::MetricsService;

/// Query params for the page
#[derive(Debug, Deserialize)]
pub struct PageParams {
    tab: Option<Tab>,
}

/// Query params for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<usize>,
}

/// Preformatted navbar ticker
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerResponse {
    loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_cap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    supply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    change24h: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HoldersResponse {
    loading: bool,
    source: Option<HolderSource>,
    holders: Vec<Holder>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    uptime: f64,
    subscribers: usize,
    modules: ModuleStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    market_poller: bool,
    whale_simulator: bool,
}

/// Stats response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    market_poller: MarketPollerStats,
    holder_fetcher: HolderFetcherStats,
    whale_simulator: WhaleSimulatorStats,
}

/// Messages the server originates on the socket. State changes are
/// forwarded as-is, already tagged by `StateEvent`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "init")]
    Init {
        snapshot: SessionSnapshot,
        stats: StatsResponse,
    },
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub state: Arc<SessionState>,
    pub market_poller: MarketPoller,
    pub holder_fetcher: HolderFetcher,
    pub whale_simulator: WhaleSimulator,
    pub metrics: Arc<MetricsService>,
    pub post: Arc<PostData>,
    pub start_time: std::time::Instant,
}

impl AppState {
    fn stats(&self) -> StatsResponse {
        StatsResponse {
            market_poller: self.market_poller.get_stats(),
            holder_fetcher: self.holder_fetcher.get_stats(),
            whale_simulator: self.whale_simulator.get_stats(),
        }
    }
}

/// Dashboard server
pub struct DashboardServer {
    config: Config,
    state: AppState,
}

impl DashboardServer {
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.clone(),
            state,
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(serve_index))
            // API Routes
            .route("/api/snapshot", get(get_snapshot))
            .route("/api/ticker", get(get_ticker))
            .route("/api/holders", get(get_holders))
            .route("/api/whales", get(get_whales))
            .route("/api/post", get(get_post))
            .route("/api/stats", get(get_stats))
            // Prometheus metrics
            .route("/metrics", get(get_metrics))
            // Health checks
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            // WebSocket
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve until the surrounding task is dropped
    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.dashboard_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(target: "DASHBOARD", "✅ Board running at http://localhost:{}", self.config.dashboard_port);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

// ============================================
// HANDLERS
// ============================================

async fn serve_index(State(state): State<AppState>, Query(params): Query<PageParams>) -> Html<String> {
    let snapshot = state.state.snapshot();
    Html(render_page(
        &state.config,
        &snapshot,
        &state.post,
        params.tab.unwrap_or_default(),
    ))
}

async fn get_snapshot(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.state.snapshot())
}

async fn get_ticker(State(state): State<AppState>) -> Json<TickerResponse> {
    let ticker = match state.state.metrics() {
        Some(m) => TickerResponse {
            loading: false,
            market_cap: Some(format_compact_number(m.market_cap)),
            price: Some(format_currency(m.price)),
            supply: Some(format_compact_number(m.supply)),
            change24h: Some(format_change(m.change_24h)),
        },
        None => TickerResponse {
            loading: true,
            market_cap: None,
            price: None,
            supply: None,
            change24h: None,
        },
    };
    Json(ticker)
}

async fn get_holders(State(state): State<AppState>) -> Json<HoldersResponse> {
    Json(HoldersResponse {
        loading: state.state.is_holders_loading(),
        source: state.state.holder_source(),
        holders: state.state.holders().as_ref().clone(),
    })
}

async fn get_whales(State(state): State<AppState>, Query(params): Query<ListParams>) -> Json<Vec<WhaleTx>> {
    let limit = params.limit.unwrap_or(state.config.whale_feed_capacity);
    Json(state.state.whales().iter().take(limit).cloned().collect())
}

async fn get_post(State(state): State<AppState>) -> Json<PostData> {
    Json(state.post.as_ref().clone())
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.stats())
}

// Metrics handler
async fn get_metrics(State(state): State<AppState>) -> Response {
    state.metrics.set_module_status("marketPoller", state.market_poller.is_running());
    state.metrics.set_module_status("whaleSimulator", state.whale_simulator.is_running());
    state.metrics.whale_feed_len.set(state.state.whales().len() as f64);

    let metrics = state.metrics.get_metrics();
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        metrics,
    )
        .into_response()
}

// Health check handlers
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime: state.start_time.elapsed().as_secs_f64(),
        subscribers: state.state.subscriber_count(),
        modules: ModuleStatus {
            market_poller: state.market_poller.is_running(),
            whale_simulator: state.whale_simulator.is_running(),
        },
    })
}

async fn readiness_check(State(state): State<AppState>) -> Response {
    if state.state.metrics().is_some() {
        Json(serde_json::json!({"ready": true})).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"ready": false}))).into_response()
    }
}

// WebSocket handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

fn init_message(state: &AppState) -> Option<String> {
    let msg = WsMessage::Init {
        snapshot: state.state.snapshot(),
        stats: state.stats(),
    };
    serde_json::to_string(&msg).ok()
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!(target: "DASHBOARD", "WebSocket client connected");

    // Subscribe before the snapshot so no change falls in between
    let mut events = state.state.subscribe();

    if let Some(json) = init_message(&state) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    let send_state = state.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let json = match events.recv().await {
                Ok(event) => serde_json::to_string(&event).ok(),
                Err(RecvError::Lagged(n)) => {
                    warn!(target: "DASHBOARD", "WebSocket client lagged {} events, resending snapshot", n);
                    init_message(&send_state)
                }
                Err(RecvError::Closed) => break,
            };
            if let Some(json) = json {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Drain incoming frames; the client never sends commands
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half ends first takes the other down with it
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!(target: "DASHBOARD", "WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::page::opening_post;
    use crate::modules::market_poller::TokenMetrics;
    use crate::modules::whale_simulator::TxType;
    use crate::utils::SolanaService;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use futures_util::StreamExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        let config = Config {
            rpc_url: "http://127.0.0.1:9".to_string(),
            price_api_url: "http://127.0.0.1:9".to_string(),
            ..Config::from_env()
        };
        let metrics = Arc::new(MetricsService::new());
        let state = Arc::new(SessionState::new());
        let solana = Arc::new(SolanaService::new(&config, Arc::clone(&metrics)));

        AppState {
            market_poller: MarketPoller::new(config.clone(), Arc::clone(&state), Arc::clone(&metrics)),
            holder_fetcher: HolderFetcher::new(
                config.clone(),
                solana,
                Arc::clone(&state),
                Arc::clone(&metrics),
            ),
            whale_simulator: WhaleSimulator::new(config.clone(), Arc::clone(&state), Arc::clone(&metrics)),
            config,
            state,
            metrics,
            post: Arc::new(opening_post(&Utc::now())),
            start_time: std::time::Instant::now(),
        }
    }

    fn metrics() -> TokenMetrics {
        TokenMetrics {
            price: 0.005,
            market_cap: 5_000_000.0,
            supply: 1_000_000_000.0,
            change_24h: -1.5,
        }
    }

    fn whale(id: u64) -> WhaleTx {
        WhaleTx {
            id,
            hash: format!("hash{}", id),
            tx_type: TxType::Sell,
            amount: 100_000.0,
            value: 500.0,
            time: "Just now".to_string(),
            maker: "Whale3".to_string(),
            timestamp: 0,
        }
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, String) {
        let router = DashboardServer::new(state.clone()).router();
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get(state, uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ticker_loading_then_formatted() {
        let state = app_state();
        let (_, body) = get_json(&state, "/api/ticker").await;
        assert_eq!(body, serde_json::json!({"loading": true}));

        state.state.replace_metrics(1, metrics());
        let (_, body) = get_json(&state, "/api/ticker").await;
        assert_eq!(body["loading"], false);
        assert_eq!(body["marketCap"], "5M");
        assert_eq!(body["price"], "$0.005000");
        assert_eq!(body["change24h"], "-1.50%");
    }

    #[tokio::test]
    async fn test_readiness_follows_first_metrics() {
        let state = app_state();
        let (status, _) = get(&state, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.state.replace_metrics(1, metrics());
        let (status, _) = get(&state, "/ready").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_json(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_whales_limit_keeps_newest_first() {
        let state = app_state();
        for id in 1..=5 {
            state.state.push_whale(whale(id), 20);
        }

        let (_, body) = get_json(&state, "/api/whales?limit=2").await;
        let ids: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|tx| tx["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![5, 4]);
        assert_eq!(body[0]["type"], "sell");
    }

    #[tokio::test]
    async fn test_holders_and_snapshot_payloads() {
        let state = app_state();
        let (_, body) = get_json(&state, "/api/holders").await;
        assert_eq!(body["loading"], false);
        assert!(body["source"].is_null());

        state.state.replace_metrics(1, metrics());
        let (_, body) = get_json(&state, "/api/snapshot").await;
        assert_eq!(body["metrics"]["change24h"], -1.5);
        assert_eq!(body["holdersLoading"], false);
        assert!(body["whales"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_and_page() {
        let state = app_state();
        let (_, body) = get_json(&state, "/api/post").await;
        assert_eq!(body["no"], 88_888_888);
        assert_eq!(body["isOp"], true);

        state.state.replace_metrics(1, metrics());
        let (status, html) = get(&state, "/?tab=whales").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Simulated feed"));
        assert!(html.contains("V4: $4CHAN ON SOLANA"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = app_state();
        let (status, text) = get(&state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("chanboard_uptime_seconds"));
    }

    #[tokio::test]
    async fn test_websocket_init_then_events() {
        let state = app_state();
        state.state.replace_metrics(1, metrics());

        let router = DashboardServer::new(state.clone()).router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        let init: Value = serde_json::from_str(
            socket.next().await.unwrap().unwrap().to_text().unwrap(),
        )
        .unwrap();
        assert_eq!(init["type"], "init");
        assert_eq!(init["data"]["snapshot"]["metrics"]["price"], 0.005);

        state.state.push_whale(whale(9), 20);
        let event: Value = serde_json::from_str(
            socket.next().await.unwrap().unwrap().to_text().unwrap(),
        )
        .unwrap();
        assert_eq!(event["type"], "whale");
        assert_eq!(event["data"]["id"], 9);
    }

    #[tokio::test]
    async fn test_websocket_close_releases_subscription() {
        let state = app_state();

        let router = DashboardServer::new(state.clone()).router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        socket.next().await.unwrap().unwrap();
        assert_eq!(state.state.subscriber_count(), 1);

        socket.close(None).await.unwrap();

        // No event is ever published, so only the abort can drop the receiver
        let mut attempts = 0;
        while state.state.subscriber_count() > 0 && attempts < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            attempts += 1;
        }
        assert_eq!(state.state.subscriber_count(), 0);

        let (_, body) = get_json(&state, "/health").await;
        assert_eq!(body["subscribers"], 0);
    }
}
