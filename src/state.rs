//! In-memory session state shared by the pollers and the dashboard
//!
//! Each field has exactly one writer: the market poller owns `metrics`, the
//! holder fetcher owns `holders` and the loading flag, the whale simulator owns
//! the feed. Values are replaced whole under a short lock; readers only ever
//! get clones. Every applied change is broadcast as a [`StateEvent`].

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::modules::holder_fetcher::{Holder, HolderSource};
use crate::modules::market_poller::TokenMetrics;
use crate::modules::whale_simulator::{advance_feed, WhaleTx};

/// Change notification pushed to dashboard subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum StateEvent {
    Metrics(TokenMetrics),
    Holders {
        source: HolderSource,
        holders: Vec<Holder>,
    },
    HoldersLoading(bool),
    Whale(WhaleTx),
    WhaleFeed(Vec<WhaleTx>),
}

/// Immutable view of the whole session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub metrics: Option<TokenMetrics>,
    pub holders: Vec<Holder>,
    pub holder_source: Option<HolderSource>,
    pub holders_loading: bool,
    pub whales: Vec<WhaleTx>,
}

struct MetricsSlot {
    seq: u64,
    value: Option<TokenMetrics>,
}

struct HoldersSlot {
    seq: u64,
    source: Option<HolderSource>,
    holders: Arc<Vec<Holder>>,
}

pub struct SessionState {
    metrics: RwLock<MetricsSlot>,
    holders: RwLock<HoldersSlot>,
    whales: RwLock<Arc<VecDeque<WhaleTx>>>,
    holders_loading: AtomicBool,
    disposed: AtomicBool,
    events: broadcast::Sender<StateEvent>,
}

impl SessionState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            metrics: RwLock::new(MetricsSlot { seq: 0, value: None }),
            holders: RwLock::new(HoldersSlot {
                seq: 0,
                source: None,
                holders: Arc::new(Vec::new()),
            }),
            whales: RwLock::new(Arc::new(VecDeque::new())),
            holders_loading: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            events,
        }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Number of live event subscribers
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    // ---- readers ----

    pub fn metrics(&self) -> Option<TokenMetrics> {
        self.metrics.read().value
    }

    /// Current price, `0.0` until the first poll lands
    pub fn current_price(&self) -> f64 {
        self.metrics().map(|m| m.price).unwrap_or(0.0)
    }

    pub fn holders(&self) -> Arc<Vec<Holder>> {
        Arc::clone(&self.holders.read().holders)
    }

    pub fn holder_source(&self) -> Option<HolderSource> {
        self.holders.read().source
    }

    pub fn is_holders_loading(&self) -> bool {
        self.holders_loading.load(Ordering::SeqCst)
    }

    pub fn whales(&self) -> Arc<VecDeque<WhaleTx>> {
        let feed = self.whales.read();
        Arc::clone(&*feed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (holders, holder_source) = {
            let slot = self.holders.read();
            (slot.holders.as_ref().clone(), slot.source)
        };
        SessionSnapshot {
            metrics: self.metrics(),
            holders,
            holder_source,
            holders_loading: self.is_holders_loading(),
            whales: self.whales().iter().cloned().collect(),
        }
    }

    // ---- writers ----

    /// Replace the metrics if `seq` is newer than the last applied poll
    pub fn replace_metrics(&self, seq: u64, metrics: TokenMetrics) -> bool {
        if self.is_disposed() {
            return false;
        }
        {
            let mut slot = self.metrics.write();
            if seq <= slot.seq {
                debug!(target: "STATE", "Dropping stale metrics #{} (have #{})", seq, slot.seq);
                return false;
            }
            *slot = MetricsSlot {
                seq,
                value: Some(metrics),
            };
        }
        self.emit(StateEvent::Metrics(metrics));
        true
    }

    /// Replace the holder list if `seq` is newer than the last applied fetch
    pub fn replace_holders(&self, seq: u64, holders: Vec<Holder>, source: HolderSource) -> bool {
        if self.is_disposed() {
            return false;
        }
        let event = StateEvent::Holders {
            source,
            holders: holders.clone(),
        };
        {
            let mut slot = self.holders.write();
            if seq <= slot.seq {
                debug!(target: "STATE", "Dropping stale holders #{} (have #{})", seq, slot.seq);
                return false;
            }
            *slot = HoldersSlot {
                seq,
                source: Some(source),
                holders: Arc::new(holders),
            };
        }
        self.emit(event);
        true
    }

    pub fn set_holders_loading(&self, loading: bool) -> bool {
        if self.is_disposed() {
            return false;
        }
        let previous = self.holders_loading.swap(loading, Ordering::SeqCst);
        if previous != loading {
            self.emit(StateEvent::HoldersLoading(loading));
        }
        true
    }

    /// Replace the whole whale feed (seeding)
    pub fn replace_whales(&self, feed: VecDeque<WhaleTx>) -> bool {
        if self.is_disposed() {
            return false;
        }
        let event = StateEvent::WhaleFeed(feed.iter().cloned().collect());
        *self.whales.write() = Arc::new(feed);
        self.emit(event);
        true
    }

    /// Derive the next feed from the current one under the write lock
    pub fn update_whales<F>(&self, f: F) -> bool
    where
        F: FnOnce(&VecDeque<WhaleTx>) -> VecDeque<WhaleTx>,
    {
        if self.is_disposed() {
            return false;
        }
        let mut feed = self.whales.write();
        *feed = Arc::new(f(&feed));
        true
    }

    /// Prepend one transaction, keeping at most `capacity` entries
    pub fn push_whale(&self, tx: WhaleTx, capacity: usize) -> bool {
        let event = StateEvent::Whale(tx.clone());
        if !self.update_whales(|feed| advance_feed(feed, tx, capacity)) {
            return false;
        }
        self.emit(event);
        true
    }

    // ---- lifecycle ----

    /// Tear the session down; every later write is a no-op
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        debug!(target: "STATE", "Session state disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: StateEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
