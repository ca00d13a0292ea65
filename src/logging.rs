//! # Tracing Setup
//!
//! Environment-aware console logging using the tracing ecosystem.
//! Designed for containerized shard processes where logs go to stdout/stderr.
//!
//! Log level comes from `HERALD_LOG` (falling back to `RUST_LOG`, then the
//! environment default). `LOG_FORMAT=json` switches to line-delimited JSON
//! for log shippers; otherwise output is human-readable with ANSI colors
//! when attached to a TTY.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber. Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let default_level = match detect_environment().as_str() {
            "production" => "info",
            "test" => "warn",
            _ => "debug",
        };

        let filter = std::env::var("HERALD_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| default_level.to_string());
        let env_filter = EnvFilter::try_new(&filter)
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let json_output = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if json_output {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(false))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_ansi(std::io::stdout().is_terminal()))
                .init();
        }
    });
}

/// Detect the runtime environment from `HERALD_ENV`, then `APP_ENV`,
/// defaulting to `development`.
pub fn detect_environment() -> String {
    std::env::var("HERALD_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_detect_environment_defaults_to_development() {
        if std::env::var("HERALD_ENV").is_err() && std::env::var("APP_ENV").is_err() {
            assert_eq!(detect_environment(), "development");
        }
    }
}
