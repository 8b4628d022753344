//! Tracing subscriber setup.
//!
//! Libraries in this workspace only emit `tracing` events; the embedding
//! application (or a test harness) installs the subscriber configured here.
//! `RUST_LOG` overrides the configured filter when set.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directives, e.g. `info,vault_lifecycle=debug`
    pub filter: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TracingConfig {
    /// Replace the filter directives.
    #[must_use]
    pub fn with_log_level(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Emit JSON instead of pretty lines.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

/// Install the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) {
    assert!(
        try_init_tracing(config),
        "a global tracing subscriber is already installed"
    );
}

/// Install the subscriber unless one is already present.
///
/// Returns `true` when this call installed it. Test harnesses call this from
/// every test, so only the first call wins.
pub fn try_init_tracing(config: &TracingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = TracingConfig::default()
            .with_log_level("vault_lifecycle=debug")
            .with_json_output();

        assert_eq!(config.filter, "vault_lifecycle=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(TracingConfig::default().format, LogFormat::Pretty);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = TracingConfig::default().with_log_level("warn");
        try_init_tracing(&config);
        assert!(!try_init_tracing(&config));
    }
}
