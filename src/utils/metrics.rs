//! Prometheus metrics service for chanboard

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;
use tracing::info;

/// Metrics service for Prometheus
#[derive(Clone)]
pub struct MetricsService {
    registry: Registry,
    start_time: Instant,

    // Market poller metrics
    pub market_polls: CounterVec,
    pub price_usd: Gauge,
    pub market_cap_usd: Gauge,
    pub change_24h: Gauge,

    // Holder fetcher metrics
    pub holder_snapshots: CounterVec,
    pub holders_loading: Gauge,

    // Whale simulator metrics
    pub whale_transactions: CounterVec,
    pub whale_volume: CounterVec,
    pub whale_ticks_skipped: Counter,
    pub whale_feed_len: Gauge,

    // System metrics
    pub upstream_latency: HistogramVec,
    pub module_status: GaugeVec,
    pub uptime: Gauge,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new() -> Self {
        let registry = Registry::new();

        // Market poller metrics
        let market_polls = CounterVec::new(
            Opts::new("chanboard_market_polls_total", "Market data polls"),
            &["status"],
        )
        .unwrap();
        let price_usd = Gauge::new("chanboard_price_usd", "Last polled token price (USD)").unwrap();
        let market_cap_usd =
            Gauge::new("chanboard_market_cap_usd", "Last polled market cap (USD)").unwrap();
        let change_24h =
            Gauge::new("chanboard_change_24h_percent", "Last polled 24h change").unwrap();

        // Holder fetcher metrics
        let holder_snapshots = CounterVec::new(
            Opts::new("chanboard_holder_snapshots_total", "Holder snapshots produced"),
            &["source"],
        )
        .unwrap();
        let holders_loading =
            Gauge::new("chanboard_holders_loading", "Holder fetch in flight").unwrap();

        // Whale simulator metrics
        let whale_transactions = CounterVec::new(
            Opts::new("chanboard_whale_transactions_total", "Simulated whale transactions"),
            &["type"],
        )
        .unwrap();
        let whale_volume = CounterVec::new(
            Opts::new("chanboard_whale_volume_usd_total", "Simulated whale volume in USD"),
            &["type"],
        )
        .unwrap();
        let whale_ticks_skipped = Counter::new(
            "chanboard_whale_ticks_skipped_total",
            "Whale ticks skipped for lack of a price",
        )
        .unwrap();
        let whale_feed_len = Gauge::new("chanboard_whale_feed_len", "Whale feed length").unwrap();

        // System metrics
        let upstream_latency = HistogramVec::new(
            HistogramOpts::new("chanboard_upstream_latency_seconds", "Upstream request latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["upstream"],
        )
        .unwrap();
        let module_status = GaugeVec::new(
            Opts::new("chanboard_module_running", "Module status"),
            &["module"],
        )
        .unwrap();
        let uptime = Gauge::new("chanboard_uptime_seconds", "Application uptime").unwrap();

        // Register all metrics
        registry.register(Box::new(market_polls.clone())).unwrap();
        registry.register(Box::new(price_usd.clone())).unwrap();
        registry.register(Box::new(market_cap_usd.clone())).unwrap();
        registry.register(Box::new(change_24h.clone())).unwrap();
        registry.register(Box::new(holder_snapshots.clone())).unwrap();
        registry.register(Box::new(holders_loading.clone())).unwrap();
        registry.register(Box::new(whale_transactions.clone())).unwrap();
        registry.register(Box::new(whale_volume.clone())).unwrap();
        registry.register(Box::new(whale_ticks_skipped.clone())).unwrap();
        registry.register(Box::new(whale_feed_len.clone())).unwrap();
        registry.register(Box::new(upstream_latency.clone())).unwrap();
        registry.register(Box::new(module_status.clone())).unwrap();
        registry.register(Box::new(uptime.clone())).unwrap();

        info!(target: "METRICS", "Prometheus metrics initialized");

        Self {
            registry,
            start_time: Instant::now(),
            market_polls,
            price_usd,
            market_cap_usd,
            change_24h,
            holder_snapshots,
            holders_loading,
            whale_transactions,
            whale_volume,
            whale_ticks_skipped,
            whale_feed_len,
            upstream_latency,
            module_status,
            uptime,
        }
    }

    /// Record a market poll outcome
    pub fn record_poll(&self, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        self.market_polls.with_label_values(&[status]).inc();
    }

    /// Publish the latest market figures
    pub fn record_market(&self, price: f64, market_cap: f64, change_24h: f64) {
        self.price_usd.set(price);
        self.market_cap_usd.set(market_cap);
        self.change_24h.set(change_24h);
    }

    /// Record a holder snapshot by source (`rpc` / `synthetic`)
    pub fn record_holder_snapshot(&self, source: &str) {
        self.holder_snapshots.with_label_values(&[source]).inc();
    }

    /// Record a simulated whale transaction
    pub fn record_whale_transaction(&self, tx_type: &str, value_usd: f64) {
        self.whale_transactions.with_label_values(&[tx_type]).inc();
        self.whale_volume.with_label_values(&[tx_type]).inc_by(value_usd);
    }

    /// Record the latency of an upstream call
    pub fn observe_latency(&self, upstream: &str, started: Instant) {
        self.upstream_latency
            .with_label_values(&[upstream])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Set module status
    pub fn set_module_status(&self, module: &str, running: bool) {
        self.module_status
            .with_label_values(&[module])
            .set(if running { 1.0 } else { 0.0 });
    }

    /// Get metrics as Prometheus text format
    pub fn get_metrics(&self) -> String {
        self.uptime.set(self.start_time.elapsed().as_secs_f64());

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(target: "METRICS", "Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}
