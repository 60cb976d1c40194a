//! Blocking facade for callers without an async runtime.
//!
//! [`BlockingLauncher`] owns a multi-threaded tokio runtime; the session
//! tasks run there while the caller polls from its own thread, typically a
//! GUI event loop timer.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::config::LaunchConfig;
use crate::error::{Result, SpawnError};
use crate::invocation::Invocation;
use crate::session::{
    InputForwarder, Launcher, OutputReceiver, PromptReceiver, ResultFuture, Session, SessionControl,
    TryRecvError,
};
use crate::types::{OutputChunk, PasswordPrompt, SessionId, SessionResult, SessionStatus};

/// Launches sessions on a private runtime.
#[derive(Debug)]
pub struct BlockingLauncher {
    runtime: Arc<Runtime>,
    launcher: Launcher,
}

impl BlockingLauncher {
    /// Create a launcher with its own runtime.
    ///
    /// # Errors
    ///
    /// Fails if the runtime's threads cannot be started.
    pub fn new(config: LaunchConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("wrappac-session")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            launcher: Launcher::new(config),
        })
    }

    /// Start `invocation`. Returns once the child has been spawned.
    ///
    /// Must not be called from inside an async runtime.
    pub fn launch(&self, invocation: Invocation) -> std::result::Result<BlockingSession, SpawnError> {
        let mut session = self.runtime.block_on(self.launcher.launch(invocation))?;
        Ok(BlockingSession {
            runtime: Arc::clone(&self.runtime),
            output: session.take_output(),
            prompts: session.take_prompts(),
            result: session.result(),
            session,
        })
    }
}

/// A session polled from a synchronous caller.
#[derive(Debug)]
pub struct BlockingSession {
    runtime: Arc<Runtime>,
    session: Session,
    output: Option<OutputReceiver>,
    prompts: Option<PromptReceiver>,
    result: ResultFuture,
}

impl BlockingSession {
    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Next output chunk, if one is queued.
    ///
    /// [`TryRecvError::Disconnected`] means all output has been delivered.
    pub fn try_recv(&mut self) -> std::result::Result<OutputChunk, TryRecvError> {
        match self.output.as_mut() {
            Some(output) => output.try_recv(),
            None => Err(TryRecvError::Disconnected),
        }
    }

    /// Every output chunk queued right now.
    pub fn drain_output(&mut self) -> Vec<OutputChunk> {
        self.output.as_mut().map(OutputReceiver::drain).unwrap_or_default()
    }

    /// Next password prompt, if one is queued.
    pub fn try_prompt(&mut self) -> Option<PasswordPrompt> {
        self.prompts.as_mut().and_then(|prompts| prompts.try_recv().ok())
    }

    /// Input handle. Its methods never block.
    #[must_use]
    pub fn input(&self) -> InputForwarder {
        self.session.input()
    }

    /// Control handle.
    ///
    /// [`SessionControl::terminate`] must be called through
    /// [`BlockingSession::terminate`] from threads outside the runtime.
    #[must_use]
    pub fn control(&self) -> SessionControl {
        self.session.control()
    }

    /// Send SIGINT to the process group.
    pub fn interrupt(&self) -> Result<()> {
        self.session.interrupt()
    }

    /// Kill the process group.
    pub fn kill(&self) -> bool {
        self.session.kill()
    }

    /// SIGTERM, then SIGKILL after the grace period.
    pub fn terminate(&self) -> bool {
        let _guard = self.runtime.enter();
        self.session.terminate()
    }

    /// Resize the terminal.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.session.resize(cols, rows)
    }

    /// The result, if the session has finished. Does not block.
    pub fn try_result(&mut self) -> Option<Result<SessionResult>> {
        self.result.try_result()
    }

    /// Block until the session finishes.
    ///
    /// Output still queued stays available through [`try_recv`](Self::try_recv).
    pub fn wait(&mut self) -> Result<SessionResult> {
        let result = &mut self.result;
        self.runtime.block_on(result)
    }

    /// Block until the session finishes or `timeout` elapses.
    ///
    /// Returns `None` on timeout; the session keeps running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<SessionResult>> {
        let result = &mut self.result;
        // The timer has to be created inside the runtime.
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, result).await })
            .ok()
    }
}
