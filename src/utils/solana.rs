//! Solana RPC service for chanboard (read-only, no wallet)

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::utils::error::{FeedError, FeedResult};
use crate::utils::format::truncate_address;
use crate::utils::MetricsService;

/// One entry of a `getTokenLargestAccounts` response
#[derive(Debug, Clone, PartialEq)]
pub struct LargestAccount {
    /// Token account address (not the owner wallet)
    pub address: String,
    pub ui_amount: f64,
}

/// Solana service for RPC interactions
pub struct SolanaService {
    client: Arc<RpcClient>,
    metrics: Arc<MetricsService>,
}

impl SolanaService {
    /// Create a new Solana service
    pub fn new(config: &Config, metrics: Arc<MetricsService>) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(
            config.rpc_url.clone(),
            CommitmentConfig::confirmed(),
        ));

        info!(target: "SOLANA", "Using Solana RPC at {} (read-only)", config.rpc_url);

        Self { client, metrics }
    }

    /// Fetch the largest token accounts for a mint, in the order the node returns them
    pub async fn get_largest_accounts(&self, mint: &str) -> FeedResult<Vec<LargestAccount>> {
        let pubkey =
            Pubkey::from_str(mint).map_err(|_| FeedError::InvalidAddress(mint.to_string()))?;

        let started = Instant::now();
        let result = self.client.get_token_largest_accounts(&pubkey).await;
        self.metrics.observe_latency("solana_rpc", started);

        let accounts = result?;
        debug!(
            target: "SOLANA",
            "getTokenLargestAccounts({}) returned {} accounts",
            truncate_address(mint),
            accounts.len()
        );

        Ok(accounts
            .into_iter()
            .map(|acc| LargestAccount {
                address: acc.address,
                ui_amount: acc.amount.ui_amount.unwrap_or(0.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TOKEN_ADDRESS;
    use crate::utils::test_support::{rpc_stub, spawn_stub};

    fn service(rpc_url: String) -> SolanaService {
        let config = Config {
            rpc_url,
            ..Config::from_env()
        };
        SolanaService::new(&config, Arc::new(MetricsService::new()))
    }

    #[tokio::test]
    async fn test_largest_accounts_preserve_order() {
        let url = spawn_stub(rpc_stub(serde_json::json!([
            {"address": "AccountA", "amount": "150000000", "decimals": 6, "uiAmount": 150.0, "uiAmountString": "150"},
            {"address": "AccountB", "amount": "50000000", "decimals": 6, "uiAmount": null, "uiAmountString": "50"}
        ])))
        .await;

        let accounts = service(url)
            .get_largest_accounts(DEFAULT_TOKEN_ADDRESS)
            .await
            .unwrap();

        assert_eq!(
            accounts,
            vec![
                LargestAccount { address: "AccountA".to_string(), ui_amount: 150.0 },
                LargestAccount { address: "AccountB".to_string(), ui_amount: 0.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_mint_is_rejected_before_request() {
        let err = service("http://127.0.0.1:9".to_string())
            .get_largest_accounts("not-a-pubkey")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::InvalidAddress(_)));
    }
}
