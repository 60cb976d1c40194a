//! Convenient re-exports for common wrappac-session usage.
//!
//! # Example
//!
//! ```ignore
//! use wrappac_session::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let launcher = Launcher::new(LaunchConfig::default());
//!     let mut session = launcher.launch(Invocation::from_argv(["pacman", "-Qu"])).await?;
//!     let mut output = session.take_output().expect("output");
//!     while let Some(chunk) = output.recv().await {
//!         print!("{}", chunk.text());
//!     }
//!     let result = session.wait().await?;
//!     println!("exit code {}", result.exit_code);
//!     Ok(())
//! }
//! ```

// Configuration
pub use crate::config::{LaunchConfig, LogFormat, LoggingConfig};

// Error handling
pub use crate::error::{Result, RunnerError, SessionError, SpawnError};

// Invocations
pub use crate::escalation::{EscalationTool, RootMethod};
pub use crate::invocation::{Invocation, InvocationBuilder};

// Sessions
pub use crate::session::{InputForwarder, Launcher, Session, SessionControl};

// Common types
pub use crate::types::{
    ControlChar, Key, OutputChunk, PasswordPrompt, SessionId, SessionResult, SessionStatus,
    TerminationCause,
};

// Front-end helpers
pub use crate::ansi::AnsiStripper;
pub use crate::runner::{RunEvent, Runner};
