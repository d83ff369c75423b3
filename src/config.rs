//! Configuration module for chanboard

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Contract address of the tracked token
pub const DEFAULT_TOKEN_ADDRESS: &str = "5q8RRQv4k4jd5tgWT9BmkZY1NMD3gv9GZ4cPUoPk3SV2";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Tracked token
    pub token_address: String,

    // Upstream APIs (read-only)
    pub price_api_url: String,
    pub rpc_url: String,

    // Market poller
    pub market_poll_interval_secs: u64,

    // Whale simulator
    pub whale_tick_interval_secs: u64,
    pub whale_feed_capacity: usize,
    pub whale_seed_count: usize,
    pub simulation_seed: Option<u64>,

    // Outbound links
    pub community_url: String,
    pub telegram_url: String,

    // Dashboard
    pub dashboard_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            token_address: env::var("TOKEN_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_TOKEN_ADDRESS.to_string()),

            price_api_url: env::var("PRICE_API_URL")
                .unwrap_or_else(|_| "https://api.dexscreener.com/latest/dex/tokens".to_string()),
            rpc_url: env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),

            market_poll_interval_secs: parse_var("MARKET_POLL_INTERVAL_SECS").unwrap_or(30),

            whale_tick_interval_secs: parse_var("WHALE_TICK_INTERVAL_SECS").unwrap_or(4),
            whale_feed_capacity: parse_var("WHALE_FEED_CAPACITY").unwrap_or(20),
            whale_seed_count: parse_var("WHALE_SEED_COUNT").unwrap_or(15),
            simulation_seed: parse_var("SIMULATION_SEED"),

            community_url: env::var("COMMUNITY_URL")
                .unwrap_or_else(|_| "https://x.com/i/communities/2004876692997677167".to_string()),
            telegram_url: env::var("TELEGRAM_URL")
                .unwrap_or_else(|_| "https://telegram.org".to_string()),

            dashboard_port: parse_var("DASHBOARD_PORT").unwrap_or(3000),
        }
    }

    pub fn market_poll_interval(&self) -> Duration {
        Duration::from_secs(self.market_poll_interval_secs.max(1))
    }

    pub fn whale_tick_interval(&self) -> Duration {
        Duration::from_secs(self.whale_tick_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
