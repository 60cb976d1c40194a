//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events. Binaries call [`init`] once to
//! install a subscriber that honors `RUST_LOG` and falls back to the
//! configured level.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Build the filter: `RUST_LOG` when set, otherwise `config.level`.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| ConfigError::InvalidEnv {
            name: "logging.level".to_string(),
            value: format!("{} ({e})", config.level),
        }),
    }
}

/// Install the global subscriber. Log lines go to stderr.
///
/// # Errors
///
/// Fails if the level is not a valid filter or a global subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = filter(config)?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig::new().level("wrappac=loudest");
        assert!(matches!(filter(&config), Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn second_init_fails() {
        let config = LoggingConfig::new().level("warn");
        let _ = init(&config);
        assert!(matches!(init(&config), Err(ConfigError::Logging(_))));
    }
}
