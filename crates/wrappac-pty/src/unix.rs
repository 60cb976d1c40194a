//! Unix terminal pairs.
//!
//! [`UnixPtySystem::spawn`] allocates a pair with `openpt`, sets the size
//! and line discipline on the slave, then starts the child in a new
//! session with the slave as its controlling terminal. The parent's slave
//! descriptor is closed before `spawn` returns.

mod child;
mod pty;
mod signals;

use std::ffi::OsStr;

pub use child::{ChildSignaller, UnixPtyChild, spawn_child};
pub use pty::{UnixPtyMaster, configure_line_discipline, open_slave};
pub use signals::{SignalHandle, on_window_change};

use crate::config::PtyConfig;
use crate::error::{PtyError, Result};
use crate::traits::PtySystem;

/// Unix PTY system implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPtySystem;

impl PtySystem for UnixPtySystem {
    type Master = UnixPtyMaster;
    type Child = UnixPtyChild;

    async fn spawn<S, I>(
        program: S,
        args: I,
        config: &PtyConfig,
    ) -> Result<(Self::Master, Self::Child)>
    where
        S: AsRef<OsStr> + Send,
        I: IntoIterator + Send,
        I::Item: AsRef<OsStr>,
    {
        let window_size = config.window_size;
        if !window_size.is_valid() {
            return Err(PtyError::InvalidWindowSize {
                cols: window_size.cols,
                rows: window_size.rows,
            });
        }

        let (master, slave_path) = UnixPtyMaster::open()?;
        master.set_window_size(window_size)?;

        // Line discipline settings must be in place before the child can write.
        let slave_fd = open_slave(&slave_path)?;
        configure_line_discipline(&slave_fd, config.echo, config.translate_newlines)?;

        let child = spawn_child(slave_fd, program, args, config)?;
        tracing::debug!(
            pid = child.pid(),
            slave = %slave_path.display(),
            echo = config.echo,
            "spawned child on pty"
        );

        Ok((master, child))
    }
}

/// Convenience type alias for the default PTY system on Unix.
pub type NativePtySystem = UnixPtySystem;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_to_eof(master: &mut UnixPtyMaster) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match master.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) => panic!("read failed: {e}"),
            }
        }
        out
    }

    #[tokio::test]
    async fn spawn_echo_reads_until_eof() {
        let config = PtyConfig::builder().translate_newlines(false).build();
        let (mut master, mut child) = UnixPtySystem::spawn("echo", ["hello"], &config)
            .await
            .expect("spawn echo");

        let output = read_to_eof(&mut master).await;
        let status = child.wait().await.expect("wait");

        assert!(status.success());
        assert_eq!(output, b"hello\n");
    }

    #[tokio::test]
    async fn translated_newlines_use_crlf() {
        let config = PtyConfig::default();
        let (mut master, mut child) = UnixPtySystem::spawn("echo", ["hi"], &config)
            .await
            .expect("spawn echo");

        let output = read_to_eof(&mut master).await;
        child.wait().await.expect("wait");
        assert_eq!(output, b"hi\r\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let config = PtyConfig::default();
        let err = UnixPtySystem::spawn("/nonexistent/wrappac-test-binary", ["x"], &config)
            .await
            .expect_err("spawn should fail");

        match err {
            PtyError::Spawn(io) => assert_eq!(io.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_window_size_is_rejected() {
        let config = PtyConfig::builder().window_size(0, 24).build();
        let err = UnixPtySystem::spawn("true", std::iter::empty::<&str>(), &config)
            .await
            .expect_err("invalid size");
        assert!(matches!(err, PtyError::InvalidWindowSize { cols: 0, rows: 24 }));
    }

    #[tokio::test]
    async fn echo_disabled_at_spawn() {
        let config = PtyConfig::builder().echo(false).build();
        let (master, mut child) = UnixPtySystem::spawn("sleep", ["0.2"], &config)
            .await
            .expect("spawn sleep");

        assert!(!master.echo_enabled().expect("termios"));
        child.wait().await.expect("wait");
    }
}
