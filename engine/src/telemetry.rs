//! Structured logging for evaluation runs
//!
//! The subscriber is installed once at startup, before the config file is
//! read. Its filter sits behind a reload layer so the level from `--log` or
//! `core.log_level` can be applied afterwards through [`TelemetryHandle`].
//!
//! Level precedence: `RUST_LOG` > configured level > `info`.
//! Debug builds print pretty terminal output, release builds print JSON
//! lines with the current span attached.

use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use sdk::errors::EngineError;

const DEFAULT_LEVEL: &str = "info";

/// Filter for `log_level` unless `env_directives` overrides it.
///
/// Blank or unparsable `RUST_LOG` values are ignored, and an unparsable
/// level falls back to `info`.
fn resolve_filter(env_directives: Option<&str>, log_level: &str) -> EnvFilter {
    env_directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level_directives(log_level)).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}

fn level_directives(log_level: &str) -> String {
    format!("{0},arena_engine={0},sdk={0}", log_level)
}

fn env_directives() -> Option<String> {
    std::env::var(EnvFilter::DEFAULT_ENV).ok()
}

/// Swaps the level of an installed subscriber
#[derive(Clone)]
pub struct TelemetryHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl TelemetryHandle {
    /// Apply the configured level. `RUST_LOG` still wins when it is set.
    pub fn set_level(&self, log_level: &str) -> Result<(), EngineError> {
        self.apply(env_directives().as_deref(), log_level)
    }

    fn apply(&self, env_directives: Option<&str>, log_level: &str) -> Result<(), EngineError> {
        self.filter
            .reload(resolve_filter(env_directives, log_level))
            .map_err(|e| EngineError::Config(format!("Failed to apply log level '{}': {}", log_level, e)))
    }
}

fn build_subscriber(
    env_directives: Option<&str>,
    log_level: &str,
) -> (impl Subscriber + Send + Sync + 'static, TelemetryHandle) {
    let (filter, handle) = reload::Layer::new(resolve_filter(env_directives, log_level));

    #[cfg(debug_assertions)]
    let output = fmt::layer().pretty().with_target(false);

    #[cfg(not(debug_assertions))]
    let output = fmt::layer().json().with_current_span(true);

    let subscriber = tracing_subscriber::registry().with(filter).with(output);
    (subscriber, TelemetryHandle { filter: handle })
}

/// Install the global subscriber at `info` and return its level handle.
///
/// Call once; later calls leave the first subscriber in place.
pub fn init_telemetry() -> TelemetryHandle {
    let (subscriber, handle) = build_subscriber(env_directives().as_deref(), DEFAULT_LEVEL);
    if subscriber.try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_configured_level_applies_after_startup() {
        let (subscriber, handle) = build_subscriber(None, DEFAULT_LEVEL);
        let _guard = tracing::subscriber::set_default(subscriber);

        assert!(tracing::enabled!(Level::INFO));
        assert!(!tracing::enabled!(Level::DEBUG));

        handle.apply(None, "debug").unwrap();
        assert!(tracing::enabled!(Level::DEBUG));

        handle.apply(None, "warn").unwrap();
        assert!(!tracing::enabled!(Level::INFO));
        assert!(tracing::enabled!(Level::WARN));
    }

    #[test]
    fn test_env_directives_override_configured_level() {
        let (subscriber, handle) = build_subscriber(None, DEFAULT_LEVEL);
        let _guard = tracing::subscriber::set_default(subscriber);

        handle.apply(Some("error"), "debug").unwrap();
        assert!(!tracing::enabled!(Level::WARN));
        assert!(tracing::enabled!(Level::ERROR));

        // A blank RUST_LOG does not count as an override
        handle.apply(Some("  "), "debug").unwrap();
        assert!(tracing::enabled!(Level::DEBUG));
    }
}
