//! File-based configuration loading.

use std::path::{Path, PathBuf};

use super::LaunchConfig;
use crate::error::ConfigError;

/// File name looked up in the user's configuration directory.
pub const CONFIG_FILE_NAME: &str = "session.toml";

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Detect format from path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// `$XDG_CONFIG_HOME/wrappac/session.toml`, if a config directory exists.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wrappac").join(CONFIG_FILE_NAME))
}

impl LaunchConfig {
    /// Parse TOML configuration. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse JSON configuration. Missing keys keep their defaults.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        match format {
            ConfigFormat::Toml => Self::from_toml_str(&content),
            ConfigFormat::Json => Self::from_json_str(&content),
        }
    }

    /// Load the user's configuration file, or defaults if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) => Self::load_or_default(path),
            None => Ok(Self::default()),
        }
    }

    /// Load `path`, or defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::escalation::RootMethod;
    use std::time::Duration;

    #[test]
    fn format_detection() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/session.toml")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("settings.JSON")), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_path(Path::new("session.yaml")), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = LaunchConfig::from_toml_str(
            r#"
            plain_output = false
            drain_timeout_ms = 250
            root_method = "doas"

            [logging]
            format = "json"
            "#,
        )
        .expect("parse");

        assert!(!config.plain_output);
        assert_eq!(config.drain_timeout, Duration::from_millis(250));
        assert_eq!(config.root_method, RootMethod::Doas);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.term, "xterm-256color");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = LaunchConfig::from_toml_str("colour = true").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn json_is_accepted() {
        let config = LaunchConfig::from_json_str(r#"{"root_method": "sudo", "cols": 100}"#).expect("parse");
        assert_eq!(config.root_method, RootMethod::Sudo);
        assert_eq!(config.cols, 100);
    }

    #[test]
    fn toml_output_parses_back() {
        let config = LaunchConfig::default().term("vt100");
        let text = config.to_toml_string().expect("serialize");
        assert_eq!(LaunchConfig::from_toml_str(&text).expect("parse"), config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = LaunchConfig::load_or_default("/nonexistent/wrappac/session.toml").expect("defaults");
        assert_eq!(config, LaunchConfig::default());
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let err = LaunchConfig::load("/etc/hosts").expect_err("no extension");
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }
}
