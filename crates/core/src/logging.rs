//! # Logging
//!
//! Process-wide `tracing` setup. Call [`init_logging`] once at startup;
//! later calls are ignored so embedding crates and tests can call it freely.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Logging configuration. Output goes to stderr; stdout is left for
/// command results.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset ("info", "debug", "hive_core=trace")
    pub level: String,
    /// Emit one JSON object per line instead of compact text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber. Returns `true` only for the call that
/// actually installed it.
pub fn init_logging(config: &LogConfig) -> bool {
    let mut installed = false;
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

        let result = if config.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
                .try_init()
        };

        // Another subscriber (e.g. a test harness) may already own the slot.
        installed = result.is_ok();
        if installed {
            tracing::debug!(level = %config.level, json = config.json, "logging initialized");
        }
    });
    installed
}
