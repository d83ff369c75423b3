//! Utility modules

pub mod error;
pub mod format;
pub mod links;
pub mod logger;
pub mod metrics;
pub mod rng;
pub mod scheduler;
pub mod solana;

#[cfg(test)]
pub mod test_support;

pub use error::{FeedError, FeedResult};
pub use logger::init_logger;
pub use metrics::MetricsService;
pub use scheduler::{FirstTick, Scheduler};
pub use solana::SolanaService;
