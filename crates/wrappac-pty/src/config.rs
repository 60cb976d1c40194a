//! How a child is placed on its terminal.
//!
//! [`PtyConfig`] describes the child's environment, directory and initial
//! line discipline. Every child gets its own session with the slave as
//! its controlling terminal, so signals can address the whole group.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Settings for one spawn.
///
/// # Example
///
/// ```
/// use wrappac_pty::{PtyConfig, WindowSize};
///
/// let config = PtyConfig::builder()
///     .environment([("TERM", "xterm-256color"), ("LANG", "C.UTF-8")])
///     .window_size(120, 40)
///     .echo(false)
///     .build();
/// assert_eq!(config.window_size, WindowSize::new(120, 40));
/// assert_eq!(config.child_env().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Directory the child starts in. `None` keeps the caller's.
    pub working_directory: Option<PathBuf>,

    /// The child's exact environment. `None` passes the caller's through.
    pub env: Option<HashMap<OsString, OsString>>,

    /// Size set on the terminal before the child starts.
    pub window_size: WindowSize,

    /// ECHO on the slave.
    pub echo: bool,

    /// ONLCR on the slave: `\n` written by the child reads as `\r\n`.
    pub translate_newlines: bool,

    /// Give the child a stderr pipe instead of the terminal.
    pub separate_stderr: bool,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            env: None,
            window_size: WindowSize::default(),
            echo: true,
            translate_newlines: true,
            separate_stderr: false,
        }
    }
}

impl PtyConfig {
    /// Start a builder from the defaults.
    #[must_use]
    pub fn builder() -> PtyConfigBuilder {
        PtyConfigBuilder::default()
    }

    /// The environment the child will see.
    #[must_use]
    pub fn child_env(&self) -> HashMap<OsString, OsString> {
        match &self.env {
            Some(env) => env.clone(),
            None => std::env::vars_os().collect(),
        }
    }
}

/// Builder for [`PtyConfig`].
#[derive(Debug, Clone, Default)]
pub struct PtyConfigBuilder {
    config: PtyConfig,
}

impl PtyConfigBuilder {
    /// Directory the child starts in.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Replace the environment with exactly these variables.
    #[must_use]
    pub fn environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.config.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Set one variable, on top of the caller's environment if no
    /// explicit one was given.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config
            .env
            .get_or_insert_with(|| std::env::vars_os().collect())
            .insert(key.into(), value.into());
        self
    }

    /// Initial terminal size.
    #[must_use]
    pub const fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.config.window_size = WindowSize::new(cols, rows);
        self
    }

    /// Whether the slave echoes input.
    #[must_use]
    pub const fn echo(mut self, value: bool) -> Self {
        self.config.echo = value;
        self
    }

    /// Whether output newlines become `\r\n`.
    #[must_use]
    pub const fn translate_newlines(mut self, value: bool) -> Self {
        self.config.translate_newlines = value;
        self
    }

    /// Whether stderr gets its own pipe.
    #[must_use]
    pub const fn separate_stderr(mut self, value: bool) -> Self {
        self.config.separate_stderr = value;
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> PtyConfig {
        self.config
    }
}

/// Signals a session sends to its child's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PtySignal {
    /// SIGINT, as from Ctrl+C.
    Interrupt,
    /// SIGQUIT, as from Ctrl+\.
    Quit,
    /// SIGTERM.
    Terminate,
    /// SIGKILL.
    Kill,
    /// SIGHUP, as when the terminal goes away.
    Hangup,
}

impl PtySignal {
    /// The signal number.
    #[cfg(unix)]
    #[must_use]
    pub const fn as_unix_signal(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Quit => libc::SIGQUIT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Hangup => libc::SIGHUP,
        }
    }
}

/// Terminal dimensions in character cells, plus optional pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Columns.
    pub cols: u16,
    /// Rows.
    pub rows: u16,
    /// Width in pixels, usually 0.
    pub xpixel: u16,
    /// Height in pixels, usually 0.
    pub ypixel: u16,
}

impl WindowSize {
    /// A size with no pixel dimensions.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            xpixel: 0,
            ypixel: 0,
        }
    }

    /// Zero rows or columns is rejected by the session layer.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl From<(u16, u16)> for WindowSize {
    fn from((cols, rows): (u16, u16)) -> Self {
        Self::new(cols, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_every_field() {
        let config = PtyConfig::builder()
            .working_directory("/var/cache/pacman")
            .environment([("TERM", "dumb")])
            .window_size(132, 50)
            .echo(false)
            .translate_newlines(false)
            .separate_stderr(true)
            .build();

        assert_eq!(config.working_directory, Some(PathBuf::from("/var/cache/pacman")));
        assert_eq!(config.window_size, WindowSize::new(132, 50));
        assert!(!config.echo);
        assert!(!config.translate_newlines);
        assert!(config.separate_stderr);
        assert_eq!(
            config.child_env().get(&OsString::from("TERM")),
            Some(&OsString::from("dumb"))
        );
    }

    #[test]
    fn explicit_environment_is_exact() {
        let config = PtyConfig::builder()
            .environment(Vec::<(String, String)>::new())
            .env("ONLY", "1")
            .build();
        assert_eq!(config.child_env().len(), 1);
    }

    #[test]
    fn zero_dimensions_are_invalid() {
        assert!(WindowSize::default().is_valid());
        assert!(!WindowSize::new(0, 24).is_valid());
        assert!(!WindowSize::from((80, 0)).is_valid());
    }

    #[test]
    fn signal_numbers() {
        assert_eq!(PtySignal::Interrupt.as_unix_signal(), libc::SIGINT);
        assert_eq!(PtySignal::Terminate.as_unix_signal(), libc::SIGTERM);
        assert_eq!(PtySignal::Kill.as_unix_signal(), libc::SIGKILL);
    }
}
