//! Outbound display links (rendered only, never fetched)

use crate::config::Config;

pub fn chart_url(token_address: &str) -> String {
    format!("https://dexscreener.com/solana/{}", token_address)
}

pub fn explorer_tx_url(hash: &str) -> String {
    format!("https://solscan.io/tx/{}", hash)
}

/// Labelled community links shown under the contract address box
pub fn community_links(config: &Config) -> Vec<(&'static str, String)> {
    vec![
        ("DexScreener", chart_url(&config.token_address)),
        ("X Community", config.community_url.clone()),
        ("Telegram", config.telegram_url.clone()),
    ]
}
