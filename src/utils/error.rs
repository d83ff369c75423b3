//! Upstream feed errors

use thiserror::Error;

/// Failure while talking to one of the upstream data sources.
///
/// None of these are fatal: the poller keeps the last metrics, the holder
/// fetcher substitutes synthetic data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("no trading pairs for {0}")]
    NoPairs(String),
    #[error("invalid token address {0}")]
    InvalidAddress(String),
    #[error("RPC error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
