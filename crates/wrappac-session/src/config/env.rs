//! Environment-based configuration overrides.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use super::LaunchConfig;
use crate::error::ConfigError;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "WRAPPAC";

/// Names of the recognized variables, without prefix.
pub mod vars {
    /// TERM default for children.
    pub const TERM: &str = "TERM";
    /// Whether to ask children for uncolored output.
    pub const PLAIN_OUTPUT: &str = "PLAIN_OUTPUT";
    /// Default window width.
    pub const COLS: &str = "COLS";
    /// Default window height.
    pub const ROWS: &str = "ROWS";
    /// Output drain timeout in milliseconds.
    pub const DRAIN_TIMEOUT_MS: &str = "DRAIN_TIMEOUT_MS";
    /// Terminate grace period in milliseconds.
    pub const TERMINATE_GRACE_MS: &str = "TERMINATE_GRACE_MS";
    /// Password prompt marker.
    pub const PASSWORD_MARKER: &str = "PASSWORD_MARKER";
    /// Root method (`auto`, `sudo`, `doas`).
    pub const ROOT_METHOD: &str = "ROOT_METHOD";
    /// Default log filter.
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    /// Log format (`text`, `json`).
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Environment variable reader.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Fixed values used instead of the process environment.
    source: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a reader over the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: None,
        }
    }

    /// Create a reader over fixed values instead of the process environment.
    #[must_use]
    pub fn from_map(prefix: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: Some(values),
        }
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        match &self.source {
            Some(values) => values.get(&var_name).cloned(),
            None => std::env::var(&var_name).ok(),
        }
    }

    /// Get a parsed value, reporting unparsable input.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.get(name)
            .map(|value| {
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: self.var_name(name),
                    value,
                })
            })
            .transpose()
    }

    /// Get a boolean value.
    pub fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.get(name)
            .map(|value| match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" | "enabled" => Ok(true),
                "0" | "false" | "no" | "off" | "disabled" => Ok(false),
                _ => Err(ConfigError::InvalidEnv {
                    name: self.var_name(name),
                    value,
                }),
            })
            .transpose()
    }

    /// Get a duration in milliseconds.
    pub fn duration_millis(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}

impl LaunchConfig {
    /// Apply `WRAPPAC_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(&EnvConfig::default())
    }

    /// Apply overrides from `env`.
    pub fn apply_env_from(mut self, env: &EnvConfig) -> Result<Self, ConfigError> {
        if let Some(term) = env.get(vars::TERM) {
            self.term = term;
        }
        if let Some(plain) = env.bool(vars::PLAIN_OUTPUT)? {
            self.plain_output = plain;
        }
        if let Some(cols) = env.parse(vars::COLS)? {
            self.cols = cols;
        }
        if let Some(rows) = env.parse(vars::ROWS)? {
            self.rows = rows;
        }
        if let Some(timeout) = env.duration_millis(vars::DRAIN_TIMEOUT_MS)? {
            self.drain_timeout = timeout;
        }
        if let Some(grace) = env.duration_millis(vars::TERMINATE_GRACE_MS)? {
            self.terminate_grace = grace;
        }
        if let Some(marker) = env.get(vars::PASSWORD_MARKER) {
            self.password_marker = marker;
        }
        if let Some(method) = env.parse(vars::ROOT_METHOD)? {
            self.root_method = method;
        }
        if let Some(level) = env.get(vars::LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = env.parse(vars::LOG_FORMAT)? {
            self.logging.format = format;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::escalation::RootMethod;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        EnvConfig::from_map(
            DEFAULT_PREFIX,
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn env_config_prefix() {
        let config = EnvConfig::new("TEST");
        assert_eq!(config.var_name("foo"), "TEST_FOO");
        assert_eq!(config.var_name("bar_baz"), "TEST_BAR_BAZ");
    }

    #[test]
    fn overrides_apply() {
        let config = LaunchConfig::default()
            .apply_env_from(&env(&[
                ("WRAPPAC_PLAIN_OUTPUT", "off"),
                ("WRAPPAC_COLS", "120"),
                ("WRAPPAC_TERMINATE_GRACE_MS", "500"),
                ("WRAPPAC_ROOT_METHOD", "doas"),
                ("WRAPPAC_LOG_FORMAT", "json"),
            ]))
            .expect("apply");

        assert!(!config.plain_output);
        assert_eq!(config.cols, 120);
        assert_eq!(config.terminate_grace, Duration::from_millis(500));
        assert_eq!(config.root_method, RootMethod::Doas);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.rows, 24);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = LaunchConfig::default()
            .apply_env_from(&env(&[("WRAPPAC_ROWS", "tall")]))
            .expect_err("invalid");
        match err {
            ConfigError::InvalidEnv { name, value } => {
                assert_eq!(name, "WRAPPAC_ROWS");
                assert_eq!(value, "tall");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bool_parsing() {
        let reader = env(&[("WRAPPAC_A", "yes"), ("WRAPPAC_B", "0"), ("WRAPPAC_C", "maybe")]);
        assert_eq!(reader.bool("a").expect("a"), Some(true));
        assert_eq!(reader.bool("b").expect("b"), Some(false));
        assert!(reader.bool("c").is_err());
        assert_eq!(reader.bool("d").expect("d"), None);
    }
}
