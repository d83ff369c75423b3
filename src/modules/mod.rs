//! chanboard data modules

pub mod holder_fetcher;
pub mod market_poller;
pub mod whale_simulator;

pub use holder_fetcher::HolderFetcher;
pub use market_poller::MarketPoller;
pub use whale_simulator::WhaleSimulator;
