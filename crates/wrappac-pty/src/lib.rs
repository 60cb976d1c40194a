//! Pseudo-terminal plumbing for wrappac command sessions.
//!
//! A child started here sees a real terminal on stdin, stdout and
//! (optionally) stderr, runs in its own session, and can be signalled as a
//! group. The master side is a tokio `AsyncRead`/`AsyncWrite` handle.
//! Only Unix is supported; the code targets Linux and uses `rustix`.
//!
//! ```ignore
//! use tokio::io::AsyncReadExt;
//! use wrappac_pty::{NativePtySystem, PtyConfig, PtySystem};
//!
//! let config = PtyConfig::builder().echo(false).build();
//! let (mut master, mut child) = NativePtySystem::spawn("pacman", ["-Qu"], &config).await?;
//!
//! let mut updates = Vec::new();
//! master.read_to_end(&mut updates).await?;
//! println!("{}", child.wait().await?);
//! ```

pub mod config;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod unix;

pub use config::{PtyConfig, PtyConfigBuilder, PtySignal, WindowSize};
pub use error::{PtyError, Result};
pub use traits::{ExitStatus, PtyChild, PtyMaster, PtySystem};

#[cfg(unix)]
pub use unix::{ChildSignaller, NativePtySystem, UnixPtyChild, UnixPtyMaster, UnixPtySystem};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PtyConfig::default();
        assert_eq!(config.window_size, WindowSize::new(80, 24));
        assert!(config.env.is_none());
        assert!(config.echo);
        assert!(config.translate_newlines);
        assert!(!config.separate_stderr);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_true_exits_cleanly() {
        let config = PtyConfig::default();
        let (mut master, mut child) = UnixPtySystem::spawn("true", std::iter::empty::<&str>(), &config)
            .await
            .expect("spawn true");

        let status = child.wait().await.expect("wait");
        assert!(status.success());
        master.close().ok();
    }
}
