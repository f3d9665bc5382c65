//! Telemetry
//!
//! Sets up `tracing-subscriber` for structured logging. The log level comes
//! from config, `RUST_LOG` overrides it, and the output format switches
//! between pretty (debug builds) and JSON (release builds).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter string applied when `RUST_LOG` is not set.
fn default_filter(log_level: &str) -> String {
    format!(
        "{level},crewline_engine={level},crewline={level},hyper=warn,reqwest=warn",
        level = log_level
    )
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// Safe to call more than once; later calls are ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}
