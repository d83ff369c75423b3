//! Colored logging module for chanboard

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing logger with colored output
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chanboard=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Log macros with module prefixes and emojis
#[macro_export]
macro_rules! log_market {
    ($($arg:tt)*) => {
        tracing::info!(target: "MARKET", "📈 {}", format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_holders {
    ($($arg:tt)*) => {
        tracing::info!(target: "HOLDERS", "🏆 {}", format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_whale {
    ($($arg:tt)*) => {
        tracing::debug!(target: "WHALES", "🐋 {}", format!($($arg)*))
    };
}
