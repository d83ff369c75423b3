//! Holder Snapshot Fetcher - Ranks the largest token accounts
//!
//! Real data comes from `getTokenLargestAccounts`. When the node fails or has
//! nothing for the mint, a synthetic top-50 distribution is shown instead, and
//! the snapshot is marked [`HolderSource::Synthetic`].

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::modules::market_poller::{TokenMetrics, DEFAULT_SUPPLY};
use crate::state::SessionState;
use crate::utils::format::{round_to, truncate_address};
use crate::utils::rng::{base36, simulation_rng};
use crate::utils::solana::LargestAccount;
use crate::utils::{MetricsService, SolanaService};

/// Heuristic label for a rank-1 account above 10% (often the AMM pool; may be wrong)
pub const LP_TAG: &str = "Raydium/LP?";
/// Heuristic label for a rank-2 account above 4% (may be wrong)
pub const DEV_TAG: &str = "Dev/Team?";

pub const SYNTHETIC_HOLDER_COUNT: u32 = 50;
const FALLBACK_PRICE: f64 = 0.0042;
const RNG_STREAM: u64 = 1;

/// Where a holder snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolderSource {
    Rpc,
    Synthetic,
}

impl HolderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolderSource::Rpc => "rpc",
            HolderSource::Synthetic => "synthetic",
        }
    }
}

/// One ranked account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holder {
    pub rank: u32,
    pub address: String,
    pub amount: f64,
    pub percentage: f64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Map RPC accounts to ranked holders, in response order
pub fn map_accounts(accounts: &[LargestAccount], metrics: &TokenMetrics) -> Vec<Holder> {
    let supply = if metrics.supply > 0.0 { metrics.supply } else { DEFAULT_SUPPLY };
    let price = metrics.price;

    accounts
        .iter()
        .enumerate()
        .map(|(index, account)| {
            let amount = account.ui_amount;
            let pct = amount / supply * 100.0;

            let tag = match index {
                0 if pct > 10.0 => Some(LP_TAG.to_string()),
                1 if pct > 4.0 => Some(DEV_TAG.to_string()),
                _ => None,
            };

            Holder {
                rank: index as u32 + 1,
                address: account.address.clone(),
                amount,
                percentage: round_to(pct, 2),
                value: amount * price,
                tag,
            }
        })
        .collect()
}

/// Share of supply for synthetic ranks 4 and below
pub fn decay_percentage(rank: u32) -> f64 {
    4.0 / (rank as f64 + 2.0).ln()
}

/// Placeholder top-50 used when the RPC has no answer.
///
/// Three fixed large holders, then a logarithmic decay. Addresses are random
/// placeholders, not real accounts.
pub fn synthetic_holders<R: Rng + ?Sized>(metrics: Option<&TokenMetrics>, rng: &mut R) -> Vec<Holder> {
    let price = metrics
        .map(|m| m.price)
        .filter(|p| *p != 0.0)
        .unwrap_or(FALLBACK_PRICE);
    let supply = metrics
        .map(|m| m.supply)
        .filter(|s| *s != 0.0)
        .unwrap_or(DEFAULT_SUPPLY);

    let fixed = [
        ("5Q544fKr...Raydium", 12.0, "Raydium Pool"),
        ("H79...Team", 5.0, "Team Vesting"),
        ("8y3...CEX", 4.5, "MEXC Wallet"),
    ];

    let mut holders: Vec<Holder> = fixed
        .iter()
        .enumerate()
        .map(|(i, (address, pct, tag))| {
            let amount = supply * (pct / 100.0);
            Holder {
                rank: i as u32 + 1,
                address: address.to_string(),
                amount,
                percentage: *pct,
                value: amount * price,
                tag: Some(tag.to_string()),
            }
        })
        .collect();

    for rank in (fixed.len() as u32 + 1)..=SYNTHETIC_HOLDER_COUNT {
        let pct = decay_percentage(rank);
        let amount = supply * (pct / 100.0);
        holders.push(Holder {
            rank,
            address: format!("So1{}...{}", base36(rng, 4), base36(rng, 3)),
            amount,
            percentage: round_to(pct, 2),
            value: amount * price,
            tag: None,
        });
    }

    holders
}

/// Holder fetcher statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderFetcherStats {
    pub rpc_snapshots: u64,
    pub synthetic_snapshots: u64,
    pub holders: usize,
    pub source: Option<HolderSource>,
    pub is_loading: bool,
}

/// Holder Snapshot Fetcher module
#[derive(Clone)]
pub struct HolderFetcher {
    config: Config,
    solana: Arc<SolanaService>,
    state: Arc<SessionState>,
    metrics: Arc<MetricsService>,

    rng: Arc<Mutex<StdRng>>,
    next_seq: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    rpc_snapshots: Arc<AtomicU64>,
    synthetic_snapshots: Arc<AtomicU64>,
}

impl HolderFetcher {
    /// Create a new holder fetcher
    pub fn new(
        config: Config,
        solana: Arc<SolanaService>,
        state: Arc<SessionState>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        let rng = simulation_rng(config.simulation_seed, RNG_STREAM);
        Self {
            config,
            solana,
            state,
            metrics,
            rng: Arc::new(Mutex::new(rng)),
            next_seq: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            rpc_snapshots: Arc::new(AtomicU64::new(0)),
            synthetic_snapshots: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fetch the current holder list. Never fails: falls back to synthetic data.
    pub async fn fetch_holders(&self, metrics: &TokenMetrics) -> (Vec<Holder>, HolderSource) {
        match self.solana.get_largest_accounts(&self.config.token_address).await {
            Ok(accounts) if !accounts.is_empty() => {
                (map_accounts(&accounts, metrics), HolderSource::Rpc)
            }
            Ok(_) => {
                warn!(
                    target: "HOLDERS",
                    "RPC returned no accounts for {}, using synthetic holders",
                    truncate_address(&self.config.token_address)
                );
                (self.synthesize(metrics), HolderSource::Synthetic)
            }
            Err(e) => {
                warn!(target: "HOLDERS", "Holder fetch failed, using synthetic holders: {}", e);
                (self.synthesize(metrics), HolderSource::Synthetic)
            }
        }
    }

    /// Fetch and publish a new snapshot, holding the loading flag meanwhile
    pub async fn refresh(&self, metrics: TokenMetrics) -> HolderSource {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.begin_loading();

        let (holders, source) = self.fetch_holders(&metrics).await;
        let count = holders.len();

        match source {
            HolderSource::Rpc => self.rpc_snapshots.fetch_add(1, Ordering::SeqCst),
            HolderSource::Synthetic => self.synthetic_snapshots.fetch_add(1, Ordering::SeqCst),
        };
        self.metrics.record_holder_snapshot(source.as_str());

        if self.state.replace_holders(seq, holders, source) {
            crate::log_holders!("Holder snapshot #{}: {} accounts ({})", seq, count, source.as_str());
        }

        self.end_loading();
        source
    }

    /// Get fetcher statistics
    pub fn get_stats(&self) -> HolderFetcherStats {
        HolderFetcherStats {
            rpc_snapshots: self.rpc_snapshots.load(Ordering::SeqCst),
            synthetic_snapshots: self.synthetic_snapshots.load(Ordering::SeqCst),
            holders: self.state.holders().len(),
            source: self.state.holder_source(),
            is_loading: self.state.is_holders_loading(),
        }
    }

    fn synthesize(&self, metrics: &TokenMetrics) -> Vec<Holder> {
        let mut rng = self.rng.lock();
        synthetic_holders(Some(metrics), &mut *rng)
    }

    fn begin_loading(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.set_holders_loading(true);
        self.metrics.holders_loading.set(1.0);
    }

    fn end_loading(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.set_holders_loading(false);
            self.metrics.holders_loading.set(0.0);
        }
    }
}
