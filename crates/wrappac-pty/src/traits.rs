//! The seams between the session layer and the platform PTY code.
//!
//! A session needs three things from the platform: a master it can read,
//! write and resize ([`PtyMaster`]), a child it can wait on and signal
//! ([`PtyChild`]), and a way to start the pair ([`PtySystem`]).

use std::ffi::OsStr;
use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{PtyConfig, PtySignal, WindowSize};
use crate::error::Result;

/// Controller end of a terminal pair.
///
/// Reading yields everything the child writes to its terminal; writing
/// is what the child reads as keyboard input.
pub trait PtyMaster: AsyncRead + AsyncWrite + Send + Sync + Unpin {
    /// Change the terminal size. The foreground group gets SIGWINCH.
    fn resize(&self, size: WindowSize) -> Result<()>;

    /// Size currently set on the terminal.
    fn window_size(&self) -> Result<WindowSize>;

    /// Turn the line discipline's echo on or off.
    fn set_echo(&self, enabled: bool) -> Result<()>;

    /// Whether the line discipline echoes input.
    fn echo_enabled(&self) -> Result<bool>;

    /// Stop using the master. Later control calls fail with `Closed`.
    fn close(&mut self) -> Result<()>;
}

/// A process running on the slave side of a pair.
///
/// Separate from [`PtyMaster`] so one task can reap the child while
/// another relays its output.
pub trait PtyChild: Send + Sync {
    /// Process ID.
    fn pid(&self) -> u32;

    /// Resolve once the child has been reaped.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitStatus>> + Send + '_>>;

    /// The exit status if the child has already exited.
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;

    /// Signal every process in the child's session.
    fn signal_group(&self, signal: PtySignal) -> Result<()>;

    /// SIGKILL the child's group.
    fn kill(&mut self) -> Result<()> {
        self.signal_group(PtySignal::Kill)
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Called `exit` with this code.
    Exited(i32),
    /// Killed by this signal number.
    Signaled(i32),
}

impl ExitStatus {
    /// Exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The exit code, unless a signal ended the process.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match *self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    /// The terminating signal, if any.
    #[must_use]
    pub const fn signal(&self) -> Option<i32> {
        match *self {
            Self::Exited(_) => None,
            Self::Signaled(signal) => Some(signal),
        }
    }

    /// One integer for both cases: the exit code, or the negated signal.
    #[must_use]
    pub const fn as_code(&self) -> i32 {
        match *self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => -signal,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// Starts a child on a fresh terminal pair.
pub trait PtySystem: Send + Sync {
    /// Master type produced by [`PtySystem::spawn`].
    type Master: PtyMaster;
    /// Child type produced by [`PtySystem::spawn`].
    type Child: PtyChild;

    /// Run `program` with `args` (not including `argv[0]`) on a new pair
    /// configured by `config`.
    fn spawn<S, I>(
        program: S,
        args: I,
        config: &PtyConfig,
    ) -> impl Future<Output = Result<(Self::Master, Self::Child)>> + Send
    where
        S: AsRef<OsStr> + Send,
        I: IntoIterator + Send,
        I::Item: AsRef<OsStr>;
}
