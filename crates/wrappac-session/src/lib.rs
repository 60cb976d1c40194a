//! wrappac-session: interactive command sessions on a pseudo-terminal
//!
//! This crate runs one external command at a time on a pseudo-terminal on
//! behalf of a package-manager front-end. Programs such as `pacman`, `yay`
//! or `paru` see a real terminal, so they prompt, draw progress bars and
//! ask for passwords exactly as they would in a shell, while the front-end
//! receives:
//!
//! - a live, ordered stream of raw output chunks,
//! - password prompt events for commands run through `sudo` or `doas`,
//! - a cloneable input handle for keystrokes, lines and masked secrets,
//! - a single structured result once the command has finished.
//!
//! All child I/O happens on tokio tasks; the caller never blocks on it.
//! Callers without a runtime use [`BlockingLauncher`].
//!
//! # Example
//!
//! ```ignore
//! use wrappac_session::{Invocation, LaunchConfig, Launcher, RootMethod};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launcher = Launcher::new(LaunchConfig::load_default()?.apply_env()?);
//!     let invocation = Invocation::builder("pacman")
//!         .args(["-Syu", "--noconfirm"])
//!         .as_root(RootMethod::Auto)
//!         .build();
//!
//!     let mut session = launcher.launch(invocation).await?;
//!     let mut output = session.take_output().expect("output");
//!     let mut prompts = session.take_prompts().expect("prompts");
//!     let input = session.input();
//!
//!     loop {
//!         tokio::select! {
//!             Some(chunk) = output.recv() => print!("{}", chunk.text()),
//!             Some(_) = prompts.recv() => input.send_password("hunter2")?,
//!             else => break,
//!         }
//!     }
//!
//!     let result = session.wait().await?;
//!     println!("exit code {}", result.exit_code);
//!     Ok(())
//! }
//! ```

pub mod ansi;
pub mod blocking;
pub mod config;
pub mod error;
pub mod escalation;
pub mod invocation;
pub mod logging;
pub mod prelude;
pub mod runner;
pub mod session;
pub mod types;

mod scrub;

pub use ansi::{AnsiStripper, strip_ansi};
pub use blocking::{BlockingLauncher, BlockingSession};
pub use config::env::EnvConfig;
pub use config::file::ConfigFormat;
pub use config::{LaunchConfig, LogFormat, LoggingConfig};
pub use error::{ConfigError, RelayError, Result, RunnerError, SessionError, SpawnError, WaitError};
pub use escalation::{
    DEFAULT_PASSWORD_MARKER, EscalationTool, Prepared, RootMethod, prepare_argv,
};
pub use invocation::{EnvOverlay, Invocation, InvocationBuilder, StderrMode};
pub use runner::{RunEvent, RunEvents, Runner};
pub use session::{
    EventReceiver, InputForwarder, Launcher, OutputReceiver, PromptReceiver, ResultFuture,
    Session, SessionControl, TryRecvError, compose_environment,
};
pub use types::{
    ControlChar, Key, OutputChunk, PasswordPrompt, SessionId, SessionResult, SessionStatus,
    TerminationCause,
};
