//! Market Data Poller - Tracks live price, market cap and 24h change

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::state::SessionState;
use crate::utils::format::{format_change, format_compact_number, format_currency, truncate_address};
use crate::utils::{FeedError, FeedResult, FirstTick, MetricsService, Scheduler};

/// Supply assumed when it cannot be derived from market cap and price
pub const DEFAULT_SUPPLY: f64 = 1_000_000_000.0;

/// Snapshot of market state, replaced wholesale on every successful poll
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetrics {
    pub price: f64,
    pub market_cap: f64,
    pub supply: f64,
    #[serde(rename = "change24h")]
    pub change_24h: f64,
}

impl TokenMetrics {
    /// Rough 24h volume shown on the analytics panel (not reported upstream)
    pub fn estimated_volume_24h(&self) -> f64 {
        self.market_cap * 0.15
    }
}

/// `latest/dex/tokens/{address}` response
#[derive(Debug, Deserialize)]
pub struct TokenPairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<PairRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRecord {
    #[serde(default)]
    pub price_usd: Option<Value>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub fdv: Option<f64>,
    #[serde(default)]
    pub price_change: Option<PriceChange>,
}

#[derive(Debug, Deserialize)]
pub struct PriceChange {
    #[serde(default)]
    pub h24: Option<f64>,
}

/// Normalize a price-feed payload.
///
/// The first pair wins; there is no tie-break on liquidity.
pub fn parse_market_data(payload: &TokenPairsResponse, token_address: &str) -> FeedResult<TokenMetrics> {
    let pair = payload
        .pairs
        .as_deref()
        .and_then(|pairs| pairs.first())
        .ok_or_else(|| FeedError::NoPairs(truncate_address(token_address)))?;

    let price = pair
        .price_usd
        .as_ref()
        .and_then(parse_number)
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| FeedError::Payload("pair has no usable priceUsd".to_string()))?;

    let market_cap = non_zero(pair.market_cap)
        .or_else(|| non_zero(pair.fdv))
        .unwrap_or(0.0);

    let change_24h = pair
        .price_change
        .as_ref()
        .and_then(|c| c.h24)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);

    Ok(TokenMetrics {
        price,
        market_cap,
        supply: estimate_supply(market_cap, price),
        change_24h,
    })
}

/// `market_cap / price` when both are positive, otherwise [`DEFAULT_SUPPLY`]
pub fn estimate_supply(market_cap: f64, price: f64) -> f64 {
    if price > 0.0 && market_cap > 0.0 {
        market_cap / price
    } else {
        DEFAULT_SUPPLY
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && !v.is_nan())
}

/// Market poller statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPollerStats {
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub last_success_at: Option<String>,
    pub has_metrics: bool,
    pub is_running: bool,
}

/// Market Data Poller module
#[derive(Clone)]
pub struct MarketPoller {
    config: Config,
    http: reqwest::Client,
    state: Arc<SessionState>,
    metrics: Arc<MetricsService>,

    is_running: Arc<AtomicBool>,
    next_seq: Arc<AtomicU64>,
    polls_succeeded: Arc<AtomicU64>,
    polls_failed: Arc<AtomicU64>,
    last_success_at: Arc<RwLock<Option<String>>>,

    metrics_sender: broadcast::Sender<TokenMetrics>,
}

impl MarketPoller {
    /// Create a new market poller
    pub fn new(config: Config, state: Arc<SessionState>, metrics: Arc<MetricsService>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chanboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let (metrics_sender, _) = broadcast::channel(64);

        Self {
            config,
            http,
            state,
            metrics,
            is_running: Arc::new(AtomicBool::new(false)),
            next_seq: Arc::new(AtomicU64::new(0)),
            polls_succeeded: Arc::new(AtomicU64::new(0)),
            polls_failed: Arc::new(AtomicU64::new(0)),
            last_success_at: Arc::new(RwLock::new(None)),
            metrics_sender,
        }
    }

    /// Subscribe to applied metrics updates
    pub fn subscribe_metrics(&self) -> broadcast::Receiver<TokenMetrics> {
        self.metrics_sender.subscribe()
    }

    /// Fetch and normalize the current market data
    pub async fn fetch_market_data(&self) -> FeedResult<TokenMetrics> {
        let url = format!(
            "{}/{}",
            self.config.price_api_url.trim_end_matches('/'),
            self.config.token_address
        );

        let started = Instant::now();
        let response = self.http.get(&url).send().await;
        self.metrics.observe_latency("price_api", started);

        let response = response?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }

        let body = response.text().await?;
        let payload: TokenPairsResponse = serde_json::from_str(&body)?;
        parse_market_data(&payload, &self.config.token_address)
    }

    /// Run one poll and apply the result. Failures keep the previous metrics.
    pub async fn poll_once(&self) -> Option<TokenMetrics> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

        match self.fetch_market_data().await {
            Ok(metrics) => {
                self.metrics.record_poll(true);
                self.polls_succeeded.fetch_add(1, Ordering::SeqCst);

                if !self.state.replace_metrics(seq, metrics) {
                    return None;
                }

                self.metrics
                    .record_market(metrics.price, metrics.market_cap, metrics.change_24h);
                *self.last_success_at.write() = Some(Utc::now().to_rfc3339());
                let _ = self.metrics_sender.send(metrics);

                debug!(
                    target: "MARKET",
                    "Px {} | MC {} | Sup {} | {}",
                    format_currency(metrics.price),
                    format_compact_number(metrics.market_cap),
                    format_compact_number(metrics.supply),
                    format_change(metrics.change_24h)
                );
                Some(metrics)
            }
            Err(e) => {
                self.metrics.record_poll(false);
                self.polls_failed.fetch_add(1, Ordering::SeqCst);
                warn!(target: "MARKET", "Market data poll failed, keeping last metrics: {}", e);
                None
            }
        }
    }

    /// Start polling on the scheduler
    pub fn start(&self, scheduler: &Scheduler) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "MARKET", "Already running");
            return;
        }

        let poller = self.clone();
        scheduler.every(
            "market-poll",
            self.config.market_poll_interval(),
            FirstTick::Immediate,
            move || {
                let poller = poller.clone();
                async move {
                    poller.poll_once().await;
                }
            },
        );

        self.metrics.set_module_status("marketPoller", true);
        crate::log_market!(
            "Market poller active - {} every {}s",
            truncate_address(&self.config.token_address),
            self.config.market_poll_interval().as_secs()
        );
    }

    /// Stop the poller (tasks are cancelled by the scheduler)
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.metrics.set_module_status("marketPoller", false);
        info!(target: "MARKET", "Market poller stopping...");
    }

    /// Get poller statistics
    pub fn get_stats(&self) -> MarketPollerStats {
        MarketPollerStats {
            polls_succeeded: self.polls_succeeded.load(Ordering::SeqCst),
            polls_failed: self.polls_failed.load(Ordering::SeqCst),
            last_success_at: self.last_success_at.read().clone(),
            has_metrics: self.state.metrics().is_some(),
            is_running: self.is_running.load(Ordering::SeqCst),
        }
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TOKEN_ADDRESS;
    use crate::utils::test_support::{spawn_stub, status_stub};
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    fn payload(value: Value) -> TokenPairsResponse {
        serde_json::from_value(value).unwrap()
    }

    fn poller(price_api_url: String, state: Arc<SessionState>) -> MarketPoller {
        let config = Config {
            price_api_url,
            token_address: DEFAULT_TOKEN_ADDRESS.to_string(),
            ..Config::from_env()
        };
        MarketPoller::new(config, state, Arc::new(MetricsService::new()))
    }

    fn price_stub(body: Value) -> Router {
        Router::new().route(
            "/tokens/:address",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        )
    }

    #[test]
    fn test_end_to_end_pair_normalization() {
        let metrics = parse_market_data(
            &payload(json!({"pairs": [
                {"priceUsd": "0.005", "marketCap": 5000000, "priceChange": {"h24": 3.2}},
                {"priceUsd": "9.0", "marketCap": 1}
            ]})),
            DEFAULT_TOKEN_ADDRESS,
        )
        .unwrap();

        assert_eq!(
            metrics,
            TokenMetrics {
                price: 0.005,
                market_cap: 5_000_000.0,
                supply: 1_000_000_000.0,
                change_24h: 3.2,
            }
        );
    }

    #[test]
    fn test_market_cap_falls_back_to_fdv() {
        let metrics = parse_market_data(
            &payload(json!({"pairs": [{"priceUsd": "0.01", "fdv": 2000000}]})),
            DEFAULT_TOKEN_ADDRESS,
        )
        .unwrap();
        assert_eq!(metrics.market_cap, 2_000_000.0);
        assert_eq!(metrics.supply, 200_000_000.0);

        let zero_cap = parse_market_data(
            &payload(json!({"pairs": [{"priceUsd": "0.01", "marketCap": 0, "fdv": 3000000}]})),
            DEFAULT_TOKEN_ADDRESS,
        )
        .unwrap();
        assert_eq!(zero_cap.market_cap, 3_000_000.0);
    }

    #[test]
    fn test_market_cap_defaults_to_zero() {
        let metrics = parse_market_data(
            &payload(json!({"pairs": [{"priceUsd": "0.01"}]})),
            DEFAULT_TOKEN_ADDRESS,
        )
        .unwrap();
        assert_eq!(metrics.market_cap, 0.0);
        assert_eq!(metrics.supply, DEFAULT_SUPPLY);
        assert_eq!(metrics.change_24h, 0.0);
    }

    #[test]
    fn test_supply_requires_positive_inputs() {
        assert_eq!(estimate_supply(5_000_000.0, 0.005), 1_000_000_000.0);
        assert_eq!(estimate_supply(5_000_000.0, 0.0), DEFAULT_SUPPLY);
        assert_eq!(estimate_supply(0.0, 0.005), DEFAULT_SUPPLY);
    }

    #[test]
    fn test_numeric_price_is_accepted() {
        let metrics = parse_market_data(
            &payload(json!({"pairs": [{"priceUsd": 0.25, "marketCap": 25}]})),
            DEFAULT_TOKEN_ADDRESS,
        )
        .unwrap();
        assert_eq!(metrics.price, 0.25);
        assert_eq!(metrics.supply, 100.0);
    }

    #[test]
    fn test_unusable_payloads_are_errors() {
        let empty = parse_market_data(&payload(json!({"pairs": []})), DEFAULT_TOKEN_ADDRESS);
        assert!(matches!(empty, Err(FeedError::NoPairs(_))));

        let null = parse_market_data(&payload(json!({"pairs": null})), DEFAULT_TOKEN_ADDRESS);
        assert!(matches!(null, Err(FeedError::NoPairs(_))));

        let missing = parse_market_data(&payload(json!({})), DEFAULT_TOKEN_ADDRESS);
        assert!(matches!(missing, Err(FeedError::NoPairs(_))));

        let no_price = parse_market_data(
            &payload(json!({"pairs": [{"priceUsd": "n/a", "marketCap": 10}]})),
            DEFAULT_TOKEN_ADDRESS,
        );
        assert!(matches!(no_price, Err(FeedError::Payload(_))));

        let negative = parse_market_data(
            &payload(json!({"pairs": [{"priceUsd": "-0.005", "marketCap": 10}]})),
            DEFAULT_TOKEN_ADDRESS,
        );
        assert!(matches!(negative, Err(FeedError::Payload(_))));
    }

    #[test]
    fn test_metrics_serialize_camel_case() {
        let json = serde_json::to_value(TokenMetrics {
            price: 1.0,
            market_cap: 2.0,
            supply: 2.0,
            change_24h: -4.5,
        })
        .unwrap();
        assert_eq!(json, json!({"price": 1.0, "marketCap": 2.0, "supply": 2.0, "change24h": -4.5}));
    }

    #[tokio::test]
    async fn test_poll_applies_metrics_and_broadcasts() {
        let base = spawn_stub(price_stub(json!({"pairs": [
            {"priceUsd": "0.005", "marketCap": 5000000, "priceChange": {"h24": 3.2}}
        ]})))
        .await;
        let state = Arc::new(SessionState::new());
        let poller = poller(format!("{}/tokens", base), Arc::clone(&state));
        let mut updates = poller.subscribe_metrics();

        let applied = poller.poll_once().await.unwrap();

        assert_eq!(applied.supply, 1_000_000_000.0);
        assert_eq!(state.metrics(), Some(applied));
        assert_eq!(updates.recv().await.unwrap(), applied);
        assert_eq!(poller.get_stats().polls_succeeded, 1);
        assert!(poller.get_stats().last_success_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_previous_metrics() {
        let good = spawn_stub(price_stub(json!({"pairs": [{"priceUsd": "0.005", "marketCap": 5000000}]}))).await;
        let broken = spawn_stub(status_stub(StatusCode::BAD_GATEWAY)).await;
        let garbage = spawn_stub(Router::new().route("/tokens/:address", get(|| async { "<html>" }))).await;
        let empty = spawn_stub(price_stub(json!({"pairs": []}))).await;

        let state = Arc::new(SessionState::new());
        poller(format!("{}/tokens", good), Arc::clone(&state))
            .poll_once()
            .await
            .unwrap();
        let before = state.metrics();

        for base in [broken, garbage, empty] {
            let failing = poller(format!("{}/tokens", base), Arc::clone(&state));
            assert!(failing.poll_once().await.is_none());
            assert_eq!(failing.get_stats().polls_failed, 1);
        }

        assert_eq!(state.metrics(), before);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_not_fatal() {
        let state = Arc::new(SessionState::new());
        let poller = poller("http://127.0.0.1:9/tokens".to_string(), Arc::clone(&state));
        assert!(matches!(poller.fetch_market_data().await, Err(FeedError::Http(_))));
        assert!(poller.poll_once().await.is_none());
        assert!(state.metrics().is_none());
    }
}
