//! Whale Activity Simulator - Synthetic large-trade feed
//!
//! Nothing here reads the chain. Transactions are generated from the current
//! price with a seedable random source, purely as page decoration, and the
//! page labels the feed as simulated. Hashes look like signatures but do not
//! resolve to real transactions.

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::state::SessionState;
use crate::utils::format::{format_age, format_compact_number, format_currency};
use crate::utils::rng::simulation_rng;
use crate::utils::{FirstTick, MetricsService, Scheduler};

const BUY_PROBABILITY: f64 = 0.55;
const MIN_AMOUNT: u32 = 50_000;
const MAX_AMOUNT: u32 = 550_000;
const MAKER_COUNT: u32 = 99;
const SEED_SPACING_SECS: u64 = 15;
const RNG_STREAM: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Buy,
    Sell,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Buy => "buy",
            TxType::Sell => "sell",
        }
    }
}

/// One simulated trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleTx {
    pub id: u64,
    pub hash: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub amount: f64,
    pub value: f64,
    pub time: String,
    pub maker: String,
    /// Generation time, Unix milliseconds
    pub timestamp: i64,
}

/// Display class by USD value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WhaleTier {
    Whale,
    Dolphin,
    Fish,
}

impl WhaleTier {
    pub fn from_value(value: f64) -> Self {
        if value > 5_000.0 {
            WhaleTier::Whale
        } else if value > 1_000.0 {
            WhaleTier::Dolphin
        } else {
            WhaleTier::Fish
        }
    }

    /// Row marker; small trades get none
    pub fn icon(&self) -> Option<&'static str> {
        match self {
            WhaleTier::Whale => Some("🐋"),
            WhaleTier::Dolphin => Some("🐬"),
            WhaleTier::Fish => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WhaleTier::Whale => "Whale",
            WhaleTier::Dolphin => "Dolphin",
            WhaleTier::Fish => "Fish",
        }
    }
}

impl WhaleTx {
    pub fn tier(&self) -> WhaleTier {
        WhaleTier::from_value(self.value)
    }
}

/// Generate one transaction at `price`, or `None` when there is no usable price
pub fn next_whale_tx<R: Rng + ?Sized>(id: u64, price: f64, age_secs: u64, rng: &mut R) -> Option<WhaleTx> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }

    let tx_type = if rng.gen_bool(BUY_PROBABILITY) {
        TxType::Buy
    } else {
        TxType::Sell
    };
    let amount = rng.gen_range(MIN_AMOUNT..MAX_AMOUNT) as f64;
    let maker = format!("Whale{}", rng.gen_range(0..MAKER_COUNT));

    let mut signature = [0u8; 64];
    rng.fill_bytes(&mut signature);

    Some(WhaleTx {
        id,
        hash: bs58::encode(signature).into_string(),
        tx_type,
        amount,
        value: amount * price,
        time: format_age(age_secs),
        maker,
        timestamp: Utc::now().timestamp_millis() - (age_secs as i64) * 1000,
    })
}

/// Initial feed: `count` transactions, newest first, spaced 15s apart
pub fn seed_feed<R: Rng + ?Sized>(first_id: u64, price: f64, count: usize, rng: &mut R) -> VecDeque<WhaleTx> {
    (0..count)
        .filter_map(|i| next_whale_tx(first_id + i as u64, price, i as u64 * SEED_SPACING_SECS, rng))
        .collect()
}

/// Prepend `tx` and drop the oldest entries beyond `capacity`
pub fn advance_feed(feed: &VecDeque<WhaleTx>, tx: WhaleTx, capacity: usize) -> VecDeque<WhaleTx> {
    let mut next = VecDeque::with_capacity(capacity.min(feed.len() + 1));
    next.push_back(tx);
    next.extend(feed.iter().take(capacity.saturating_sub(1)).cloned());
    next.truncate(capacity);
    next
}

/// Simulator statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleSimulatorStats {
    pub generated: u64,
    pub skipped_ticks: u64,
    pub feed_len: usize,
    pub is_running: bool,
}

/// Whale Activity Simulator module
#[derive(Clone)]
pub struct WhaleSimulator {
    config: Config,
    state: Arc<SessionState>,
    metrics: Arc<MetricsService>,

    rng: Arc<Mutex<StdRng>>,
    next_id: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    generated: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl WhaleSimulator {
    pub fn new(config: Config, state: Arc<SessionState>, metrics: Arc<MetricsService>) -> Self {
        let rng = simulation_rng(config.simulation_seed, RNG_STREAM);
        Self {
            config,
            state,
            metrics,
            rng: Arc::new(Mutex::new(rng)),
            next_id: Arc::new(AtomicU64::new(1)),
            is_running: Arc::new(AtomicBool::new(false)),
            generated: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the feed with a fresh seed at `price`. Returns the seeded count.
    ///
    /// The seed never exceeds the feed capacity.
    pub fn seed(&self, price: f64) -> usize {
        let count = self
            .config
            .whale_seed_count
            .min(self.config.whale_feed_capacity);
        let first_id = self.next_id.fetch_add(count as u64, Ordering::SeqCst);
        let feed = {
            let mut rng = self.rng.lock();
            seed_feed(first_id, price, count, &mut *rng)
        };

        if feed.is_empty() {
            debug!(target: "WHALES", "No usable price, feed not seeded");
            return 0;
        }

        let seeded = feed.len();
        if self.state.replace_whales(feed) {
            self.metrics.whale_feed_len.set(seeded as f64);
            crate::log_whale!("Seeded {} simulated trades at {}", seeded, format_currency(price));
        }
        seeded
    }

    /// Generate one transaction at the current price. Skipped when there is none.
    pub fn tick(&self) -> Option<WhaleTx> {
        let price = self.state.current_price();
        // Reserve the id up front; a concurrent seed must not hand it out again
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tx = {
            let mut rng = self.rng.lock();
            next_whale_tx(id, price, 0, &mut *rng)
        };

        let Some(tx) = tx else {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            self.metrics.whale_ticks_skipped.inc();
            debug!(target: "WHALES", "Tick skipped, no price yet");
            return None;
        };

        if !self.state.push_whale(tx.clone(), self.config.whale_feed_capacity) {
            return None;
        }

        self.generated.fetch_add(1, Ordering::SeqCst);
        self.metrics.record_whale_transaction(tx.tx_type.as_str(), tx.value);
        self.metrics.whale_feed_len.set(self.state.whales().len() as f64);
        crate::log_whale!(
            "{} {} {} ({}) by {}",
            tx.tier().label(),
            tx.tx_type.as_str().to_uppercase(),
            format_compact_number(tx.amount),
            format_currency(tx.value),
            tx.maker
        );
        Some(tx)
    }

    /// Start ticking on the scheduler; the first tick waits one period
    pub fn start(&self, scheduler: &Scheduler) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "WHALES", "Already running");
            return;
        }

        let simulator = self.clone();
        scheduler.every(
            "whale-tick",
            self.config.whale_tick_interval(),
            FirstTick::Delayed,
            move || {
                let simulator = simulator.clone();
                async move {
                    simulator.tick();
                }
            },
        );

        self.metrics.set_module_status("whaleSimulator", true);
        crate::log_whale!(
            "Whale simulator active - tick every {}s, keeping {}",
            self.config.whale_tick_interval().as_secs(),
            self.config.whale_feed_capacity
        );
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.metrics.set_module_status("whaleSimulator", false);
        info!(target: "WHALES", "Whale simulator stopping...");
    }

    pub fn get_stats(&self) -> WhaleSimulatorStats {
        WhaleSimulatorStats {
            generated: self.generated.load(Ordering::SeqCst),
            skipped_ticks: self.skipped.load(Ordering::SeqCst),
            feed_len: self.state.whales().len(),
            is_running: self.is_running.load(Ordering::SeqCst),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}
