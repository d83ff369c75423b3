//! chanboard - $4CHAN tribute board backend
//!
//! Serves a single imageboard-style page with:
//! - A live price ticker polled from DexScreener
//! - A top-holder snapshot from Solana RPC (synthetic fallback)
//! - A simulated whale-trade feed
//!
//! This is a **read-only** service - no wallet or trading functionality.

mod config;
mod dashboard;
mod modules;
mod state;
mod utils;

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use config::Config;
use dashboard::{opening_post, AppState, DashboardServer};
use modules::market_poller::TokenMetrics;
use modules::{HolderFetcher, MarketPoller, WhaleSimulator};
use state::SessionState;
use utils::format::format_currency;
use utils::{init_logger, MetricsService, Scheduler, SolanaService};

const BANNER: &str = r#"
    +-----------------------------------------------------------+
    |                                                           |
    |    ____ _                 _                         _     |
    |   / ___| |__   __ _ _ __ | |__   ___   __ _ _ __ __| |    |
    |  | |   | '_ \ / _` | '_ \| '_ \ / _ \ / _` | '__/ _` |    |
    |  | |___| | | | (_| | | | | |_) | (_) | (_| | | | (_| |    |
    |   \____|_| |_|\__,_|_| |_|_.__/ \___/ \__,_|_|  \__,_|    |
    |                                                           |
    |   $4CHAN on Solana (read-only)                            |
    |   Ticker | Top Holders | Whale Watch (simulated)          |
    |                                                           |
    +-----------------------------------------------------------+
"#;

/// Whether a metrics update should refresh holders and reseed the whale feed
fn should_refresh(last_price: Option<f64>, metrics: &TokenMetrics) -> bool {
    last_price != Some(metrics.price)
}

/// chanboard application
pub struct ChanBoard {
    config: Config,
    state: Arc<SessionState>,
    metrics: Arc<MetricsService>,
    scheduler: Arc<Scheduler>,
    market_poller: MarketPoller,
    holder_fetcher: HolderFetcher,
    whale_simulator: WhaleSimulator,
}

impl ChanBoard {
    /// Create a new chanboard instance
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(Config::from_env()))
    }

    fn with_config(config: Config) -> Self {
        // Initialize services
        let metrics = Arc::new(MetricsService::new());
        let solana = Arc::new(SolanaService::new(&config, Arc::clone(&metrics)));
        let state = Arc::new(SessionState::new());
        let scheduler = Arc::new(Scheduler::new());

        // Initialize modules
        let market_poller = MarketPoller::new(config.clone(), Arc::clone(&state), Arc::clone(&metrics));

        let holder_fetcher = HolderFetcher::new(
            config.clone(),
            solana,
            Arc::clone(&state),
            Arc::clone(&metrics),
        );

        let whale_simulator = WhaleSimulator::new(config.clone(), Arc::clone(&state), Arc::clone(&metrics));

        Self {
            config,
            state,
            metrics,
            scheduler,
            market_poller,
            holder_fetcher,
            whale_simulator,
        }
    }

    /// Start chanboard
    pub async fn start(&self) -> Result<()> {
        println!("{}", BANNER);

        info!(target: "CHANBOARD", "Initializing chanboard...");

        // Link modules FIRST so the first poll result is not missed
        self.link_modules();

        info!(target: "CHANBOARD", "Starting data modules...");
        self.market_poller.start(&self.scheduler);
        self.whale_simulator.start(&self.scheduler);

        info!(target: "CHANBOARD", "✅ All modules started successfully!");

        let dashboard = DashboardServer::new(AppState {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            market_poller: self.market_poller.clone(),
            holder_fetcher: self.holder_fetcher.clone(),
            whale_simulator: self.whale_simulator.clone(),
            metrics: Arc::clone(&self.metrics),
            post: Arc::new(opening_post(&Local::now())),
            start_time: std::time::Instant::now(),
        });

        dashboard.start().await?;

        Ok(())
    }

    /// Link modules together
    fn link_modules(&self) {
        // On the first metrics and on every price change: reseed the whale
        // feed and refresh the holder snapshot
        let mut metrics_rx = self.market_poller.subscribe_metrics();
        let scheduler = Arc::clone(&self.scheduler);
        let holder_fetcher = self.holder_fetcher.clone();
        let whale_simulator = self.whale_simulator.clone();

        self.scheduler.spawn("metrics-link", async move {
            info!(target: "CHANBOARD", "Market->Holders/Whales link active, waiting for prices...");
            let mut last_price: Option<f64> = None;

            loop {
                match metrics_rx.recv().await {
                    Ok(metrics) => {
                        if !should_refresh(last_price, &metrics) {
                            continue;
                        }
                        info!(
                            target: "CHANBOARD",
                            "Price moved to {}, refreshing holders and whale feed",
                            format_currency(metrics.price)
                        );
                        last_price = Some(metrics.price);

                        whale_simulator.seed(metrics.price);

                        let fetcher = holder_fetcher.clone();
                        scheduler.spawn("holder-refresh", async move {
                            fetcher.refresh(metrics).await;
                        });
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(target: "CHANBOARD", "Metrics link lagged {} updates", n);
                    }
                    Err(RecvError::Closed) => {
                        info!(target: "CHANBOARD", "Metrics broadcast channel closed");
                        break;
                    }
                }
            }
        });

        info!(target: "CHANBOARD", "Modules linked - price changes drive holders and whales");
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) {
        info!(target: "CHANBOARD", "Shutting down...");

        self.scheduler.stop();
        self.market_poller.stop();
        self.whale_simulator.stop();
        self.state.dispose();

        info!(target: "CHANBOARD", "✅ Shutdown complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    let chanboard = match ChanBoard::new() {
        Ok(app) => app,
        Err(e) => {
            error!(target: "CHANBOARD", "Failed to initialize: {}", e);
            return Err(e);
        }
    };

    // Setup shutdown signal handler
    let shutdown_signal = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    // Run the application
    tokio::select! {
        result = chanboard.start() => {
            if let Err(e) = result {
                error!(target: "CHANBOARD", "Fatal error: {}", e);
            }
            chanboard.shutdown().await;
        }
        _ = shutdown_signal => {
            chanboard.shutdown().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_support::{rpc_stub, spawn_stub};
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::time::Duration;

    fn metrics(price: f64) -> TokenMetrics {
        TokenMetrics {
            price,
            market_cap: price * 1_000_000_000.0,
            supply: 1_000_000_000.0,
            change_24h: 0.0,
        }
    }

    #[test]
    fn test_refresh_on_first_and_changed_price_only() {
        assert!(should_refresh(None, &metrics(0.005)));
        assert!(!should_refresh(Some(0.005), &metrics(0.005)));
        assert!(should_refresh(Some(0.005), &metrics(0.0051)));
    }

    #[tokio::test]
    async fn test_first_poll_drives_holders_and_whales() {
        let price_url = spawn_stub(Router::new().route(
            "/tokens/:address",
            get(|| async {
                Json(json!({"pairs": [{"priceUsd": "0.005", "marketCap": 5000000.0, "priceChange": {"h24": 1.0}}]}))
            }),
        ))
        .await;
        let rpc_url = spawn_stub(rpc_stub(json!([]))).await;

        let app = ChanBoard::with_config(Config {
            price_api_url: format!("{}/tokens", price_url),
            rpc_url,
            simulation_seed: Some(1),
            ..Config::from_env()
        });

        app.link_modules();
        app.market_poller.poll_once().await;

        let mut attempts = 0;
        while app.state.holders().is_empty() && attempts < 100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            attempts += 1;
        }

        assert_eq!(app.state.current_price(), 0.005);
        assert_eq!(app.state.whales().len(), 15);
        assert_eq!(app.state.holders().len(), 50);

        app.shutdown().await;
        assert!(app.state.is_disposed());
        assert!(app.scheduler.is_stopped());
    }
}
