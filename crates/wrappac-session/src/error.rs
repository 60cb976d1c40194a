//! Error types for wrappac-session.
//!
//! Each stage of a session has its own error type so callers can tell a
//! command that never started ([`SpawnError`]) from one whose output could
//! not be read ([`RelayError`]) or whose exit could not be collected
//! ([`WaitError`]). A non-zero exit code is not an error; it is reported in
//! [`SessionResult`](crate::SessionResult).

use std::path::PathBuf;

use thiserror::Error;
use wrappac_pty::PtyError;

/// A command could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The invocation has no program.
    #[error("empty command line")]
    EmptyCommand,

    /// An argument or environment entry cannot be passed to a process.
    #[error("invalid {what}: {reason}")]
    InvalidArgument {
        /// Which part of the invocation was rejected.
        what: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The working directory does not exist or is not a directory.
    #[error("working directory not found: {}", path.display())]
    WorkingDirectory {
        /// The requested directory.
        path: PathBuf,
    },

    /// The executable could not be found.
    #[error("command not found: {program}")]
    NotFound {
        /// The program that was looked up.
        program: String,
    },

    /// The executable exists but may not be executed.
    #[error("permission denied: {program}")]
    PermissionDenied {
        /// The program that was rejected.
        program: String,
    },

    /// The pseudo-terminal could not be allocated or configured.
    #[error("failed to allocate pseudo-terminal: {0}")]
    Pty(#[source] PtyError),

    /// Any other OS failure while starting the process.
    #[error("failed to spawn {program}: {source}")]
    Io {
        /// The program being started.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Classify a PTY-layer failure for `program`.
    pub(crate) fn from_pty(program: &str, err: PtyError) -> Self {
        match err {
            PtyError::Spawn(source) => match source.kind() {
                std::io::ErrorKind::NotFound => Self::NotFound {
                    program: program.to_string(),
                },
                std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                    program: program.to_string(),
                },
                _ => Self::Io {
                    program: program.to_string(),
                    source,
                },
            },
            other => Self::Pty(other),
        }
    }
}

/// Reading the session's output failed.
#[derive(Debug, Error)]
#[error("failed to read session output after {bytes_read} bytes: {source}")]
pub struct RelayError {
    /// Bytes successfully read before the failure.
    pub bytes_read: u64,
    /// The underlying error.
    #[source]
    pub source: std::io::Error,
}

/// Waiting for the child to exit failed at the OS level.
#[derive(Debug, Error)]
#[error("failed to wait for process {pid}: {source}")]
pub struct WaitError {
    /// The child's process id.
    pub pid: u32,
    /// The underlying error.
    #[source]
    pub source: PtyError,
}

/// Errors surfaced by a running or finished session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The command could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The output relay failed; the process was killed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The exit status could not be collected.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// A terminal control operation (resize, echo) failed.
    #[error("terminal control failed: {0}")]
    Pty(#[from] PtyError),

    /// The session has finished, or the requested handle was already taken.
    #[error("session is closed")]
    Closed,
}

/// Errors from the single-command [`Runner`](crate::Runner).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A command is already running.
    #[error("a command is already running")]
    Busy,

    /// No command is running.
    #[error("no command is running")]
    Idle,

    /// The command could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Signalling the running command failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors loading a [`LaunchConfig`](crate::LaunchConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The file that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML content could not be parsed.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON content could not be parsed.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is not a supported format.
    #[error("unsupported configuration format: {}", path.display())]
    UnsupportedFormat {
        /// The offending file.
        path: PathBuf,
    },

    /// An environment override has an unusable value.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// The variable name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// The logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
