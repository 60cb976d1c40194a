//! Configuration for launching sessions.
//!
//! A [`LaunchConfig`] is built by the caller and passed to the
//! [`Launcher`](crate::Launcher) explicitly; nothing here is process-global.
//! It can be loaded from a TOML or JSON file (see [`file`]) and overridden
//! from `WRAPPAC_*` environment variables (see [`env`]).

pub mod env;
pub mod file;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::escalation::{DEFAULT_PASSWORD_MARKER, RootMethod};

/// Default terminal width.
pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Default terminal height.
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 24;

/// Default TERM environment variable value.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// How long the relay may keep reading after the child has been reaped.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Time between SIGTERM and SIGKILL when terminating a session.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Settings shared by every session a launcher starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfig {
    /// TERM for children that do not set one.
    pub term: String,

    /// Ask children for uncolored output (`NO_COLOR`, `CLICOLOR`,
    /// `PACMAN_COLOR`) unless they already set those variables.
    pub plain_output: bool,

    /// Default window width.
    pub cols: u16,

    /// Default window height.
    pub rows: u16,

    /// How long output may keep draining after the child exits.
    #[serde(rename = "drain_timeout_ms", with = "millis")]
    pub drain_timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL.
    #[serde(rename = "terminate_grace_ms", with = "millis")]
    pub terminate_grace: Duration,

    /// Prompt marker given to `sudo`/`doas`.
    pub password_marker: String,

    /// How [`Invocation::as_root`](crate::InvocationBuilder::as_root) obtains root.
    pub root_method: RootMethod,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            plain_output: true,
            cols: DEFAULT_TERMINAL_WIDTH,
            rows: DEFAULT_TERMINAL_HEIGHT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            password_marker: DEFAULT_PASSWORD_MARKER.to_string(),
            root_method: RootMethod::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LaunchConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TERM default.
    #[must_use]
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Enable or disable the no-color environment defaults.
    #[must_use]
    pub const fn plain_output(mut self, plain: bool) -> Self {
        self.plain_output = plain;
        self
    }

    /// Set the default window size.
    #[must_use]
    pub const fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    /// Set the output drain timeout.
    #[must_use]
    pub const fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the SIGTERM to SIGKILL grace period.
    #[must_use]
    pub const fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Set the password prompt marker.
    #[must_use]
    pub fn password_marker(mut self, marker: impl Into<String>) -> Self {
        self.password_marker = marker.into();
        self
    }

    /// Set how root is obtained.
    #[must_use]
    pub const fn root_method(mut self, method: RootMethod) -> Self {
        self.root_method = method;
        self
    }

    /// Environment defaults for children, applied only where a variable is
    /// not already present.
    #[must_use]
    pub fn terminal_defaults(&self) -> Vec<(&'static str, String)> {
        let mut defaults = vec![("TERM", self.term.clone())];
        if self.plain_output {
            defaults.push(("NO_COLOR", "1".to_string()));
            defaults.push(("CLICOLOR", "0".to_string()));
            defaults.push(("PACMAN_COLOR", "never".to_string()));
        }
        defaults
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `wrappac_session=debug`.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default filter directive.
    #[must_use]
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the log format.
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
