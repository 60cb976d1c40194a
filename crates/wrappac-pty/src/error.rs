//! Errors from allocating terminals and managing their children.

use std::io;

/// Everything that can go wrong below the session layer.
///
/// Variants that wrap an [`io::Error`] name the step that failed, so a
/// caller can tell a missing program (`Spawn` with `NotFound`) from a
/// broken terminal.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// Allocating or opening the terminal pair failed.
    #[error("could not allocate a pseudo-terminal: {0}")]
    Create(#[source] io::Error),

    /// The child could not be started.
    #[error("could not start the child process: {0}")]
    Spawn(#[source] io::Error),

    /// Reading or changing the line discipline failed.
    #[error("terminal attributes: {0}")]
    Termios(#[source] io::Error),

    /// The kernel refused a window size change.
    #[error("could not resize the terminal: {0}")]
    Resize(#[source] io::Error),

    /// Rows or columns were zero.
    #[error("invalid window size {cols}x{rows}")]
    InvalidWindowSize {
        /// Columns asked for.
        cols: u16,
        /// Rows asked for.
        rows: u16,
    },

    /// The master was closed by its owner.
    #[error("terminal is closed")]
    Closed,

    /// The child has been reaped and its group is gone.
    #[error("child process has already exited")]
    NotRunning,

    /// `kill` failed for a reason other than a missing process.
    #[error("could not signal the child: {0}")]
    Signal(#[source] io::Error),

    /// Waiting on the child failed.
    #[error("could not wait for the child: {0}")]
    Wait(#[source] io::Error),
}

#[cfg(unix)]
impl PtyError {
    /// Wrap a rustix errno in the variant for the step that failed.
    pub(crate) fn from_errno(step: fn(io::Error) -> Self, errno: rustix::io::Errno) -> Self {
        step(io::Error::from_raw_os_error(errno.raw_os_error()))
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, PtyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(PtyError::Closed.to_string(), "terminal is closed");
        assert_eq!(
            PtyError::InvalidWindowSize { cols: 0, rows: 24 }.to_string(),
            "invalid window size 0x24"
        );
    }

    #[test]
    fn errno_is_preserved() {
        let PtyError::Resize(io) = PtyError::from_errno(PtyError::Resize, rustix::io::Errno::INVAL)
        else {
            panic!("wrong variant");
        };
        assert_eq!(io.raw_os_error(), Some(libc::EINVAL));
    }
}
