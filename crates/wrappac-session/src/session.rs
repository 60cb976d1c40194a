//! Sessions: one command running on a pseudo-terminal.
//!
//! A [`Session`] is created by a [`Launcher`] and is already running when
//! the caller receives it. Four tasks serve it on the tokio runtime:
//!
//! - the output relay reads the terminal and delivers [`OutputChunk`]s,
//! - the input writer forwards bytes from [`InputForwarder`] handles,
//! - the stderr collector drains a separated stderr pipe,
//! - the reporter waits for the child and publishes the [`SessionResult`].
//!
//! The caller's task never blocks on child I/O.
//!
//! [`OutputChunk`]: crate::OutputChunk
//! [`SessionResult`]: crate::SessionResult

mod forwarder;
mod launcher;
mod relay;
mod reporter;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use wrappac_pty::{ChildSignaller, PtyError, PtySignal, UnixPtyMaster, WindowSize};

pub use forwarder::InputForwarder;
pub use launcher::{Launcher, compose_environment};
pub use relay::{EventReceiver, OutputReceiver, PromptReceiver, TryRecvError};
pub use reporter::ResultFuture;

use crate::error::{Result, SessionError};
use crate::escalation::EscalationTool;
use crate::invocation::Invocation;
use crate::scrub::SecretSet;
use crate::types::{SessionId, SessionResult, SessionStatus, StatusCell};

/// State shared by a session's handle and its tasks.
pub(crate) struct Shared {
    pub(crate) id: SessionId,
    pub(crate) status: StatusCell,
    pub(crate) signaller: ChildSignaller,
    pub(crate) master: Arc<UnixPtyMaster>,
    pub(crate) secrets: SecretSet,
    pub(crate) awaiting_password: Arc<AtomicBool>,
    pub(crate) masked: bool,
    pub(crate) terminate_grace: Duration,
    pub(crate) finished: watch::Sender<bool>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("id", &self.id)
            .field("status", &self.status.get())
            .field("pid", &self.signaller.pid())
            .field("masked", &self.masked)
            .finish()
    }
}

impl Shared {
    /// Kill the process group and mark the session killed.
    ///
    /// Returns `false` if the session had already ended.
    pub(crate) fn kill(&self) -> bool {
        if !self.mark_killed() {
            return false;
        }
        self.signal_group(PtySignal::Kill);
        true
    }

    /// Move `Running` to `Killed`. Also true if it was already killed.
    fn mark_killed(&self) -> bool {
        match self
            .status
            .transition(SessionStatus::Running, SessionStatus::Killed)
        {
            SessionStatus::Running | SessionStatus::Killed => true,
            SessionStatus::Created | SessionStatus::Exited => false,
        }
    }

    fn signal_group(&self, signal: PtySignal) {
        match self.signaller.signal_group(signal) {
            Ok(()) | Err(PtyError::NotRunning) => {}
            Err(e) => tracing::warn!(session = %self.id, ?signal, error = %e, "failed to signal process group"),
        }
    }

    pub(crate) fn finish(&self) {
        self.finished.send_replace(true);
    }
}

/// Cloneable control handle for a running session.
///
/// Lets a UI interrupt, terminate or resize the session from anywhere
/// without owning the [`Session`].
#[derive(Debug, Clone)]
pub struct SessionControl {
    shared: Arc<Shared>,
}

impl SessionControl {
    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.status.get()
    }

    /// Whether the child is still running and not being killed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == SessionStatus::Running
    }

    /// Send SIGINT to the process group, as Ctrl+C would.
    ///
    /// The session keeps running if the command handles the signal.
    pub fn interrupt(&self) -> Result<()> {
        if self.status().is_terminal() {
            return Err(SessionError::Closed);
        }
        match self.shared.signaller.signal_group(PtySignal::Interrupt) {
            Ok(()) => Ok(()),
            Err(PtyError::NotRunning) => Err(SessionError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    /// Kill the process group immediately (SIGKILL).
    ///
    /// The session's result reports [`TerminationCause::Killed`]. Returns
    /// `false` if the session had already exited.
    ///
    /// [`TerminationCause::Killed`]: crate::TerminationCause::Killed
    pub fn kill(&self) -> bool {
        let killed = self.shared.kill();
        if killed {
            tracing::info!(session = %self.shared.id, "session killed");
        }
        killed
    }

    /// Ask the process group to stop: SIGTERM, then SIGKILL after the
    /// configured grace period if the child is still alive.
    ///
    /// The session's result reports [`TerminationCause::Killed`]. Returns
    /// `false` if the session had already exited.
    ///
    /// [`TerminationCause::Killed`]: crate::TerminationCause::Killed
    pub fn terminate(&self) -> bool {
        if !self.shared.mark_killed() {
            return false;
        }
        tracing::info!(
            session = %self.shared.id,
            grace_ms = self.shared.terminate_grace.as_millis() as u64,
            "terminating session"
        );
        self.shared.signal_group(PtySignal::Terminate);

        let shared = Arc::clone(&self.shared);
        let mut finished = shared.finished.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(shared.terminate_grace) => {
                    if shared.signaller.is_running() {
                        tracing::warn!(session = %shared.id, "grace period expired, sending SIGKILL");
                        shared.signal_group(PtySignal::Kill);
                    }
                }
                _ = finished.wait_for(|done| *done) => {}
            }
        });
        true
    }

    /// Resize the terminal. The kernel notifies the child with SIGWINCH.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.shared.master.set_window_size(WindowSize::new(cols, rows))?;
        Ok(())
    }

    /// Whether the privilege tool is waiting for a password that has not
    /// been sent yet.
    #[must_use]
    pub fn awaiting_password(&self) -> bool {
        self.shared.awaiting_password.load(Ordering::SeqCst)
    }
}

/// A command running on a pseudo-terminal.
///
/// Dropping a session that is still running kills its process group.
pub struct Session {
    control: SessionControl,
    invocation: Invocation,
    pid: u32,
    tool: Option<EscalationTool>,
    input: InputForwarder,
    output: Option<OutputReceiver>,
    prompts: Option<PromptReceiver>,
    result: Option<ResultFuture>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.control.id())
            .field("pid", &self.pid)
            .field("status", &self.control.status())
            .field("command", &self.invocation.display_command())
            .finish()
    }
}

impl Session {
    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.control.id()
    }

    /// Process ID of the child.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// The invocation this session was launched with.
    #[must_use]
    pub const fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// The privilege tool wrapping the command, if any.
    #[must_use]
    pub const fn escalation_tool(&self) -> Option<EscalationTool> {
        self.tool
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.control.status()
    }

    /// Whether the child is still running and not being killed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// A cloneable control handle.
    #[must_use]
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// A cloneable input handle.
    #[must_use]
    pub fn input(&self) -> InputForwarder {
        self.input.clone()
    }

    /// Take the output stream. Returns `None` after the first call.
    pub fn take_output(&mut self) -> Option<OutputReceiver> {
        self.output.take()
    }

    /// Take the password prompt stream. Returns `None` after the first call.
    ///
    /// Prompts are only raised for commands run through `sudo` or `doas`.
    pub fn take_prompts(&mut self) -> Option<PromptReceiver> {
        self.prompts.take()
    }

    /// Take the result future.
    ///
    /// A second call returns a future that resolves to
    /// [`SessionError::Closed`].
    pub fn result(&mut self) -> ResultFuture {
        self.result.take().unwrap_or_else(ResultFuture::taken)
    }

    /// Wait for the session to finish.
    pub async fn wait(&mut self) -> Result<SessionResult> {
        self.result().await
    }

    /// See [`SessionControl::interrupt`].
    pub fn interrupt(&self) -> Result<()> {
        self.control.interrupt()
    }

    /// See [`SessionControl::kill`].
    pub fn kill(&self) -> bool {
        self.control.kill()
    }

    /// See [`SessionControl::terminate`].
    pub fn terminate(&self) -> bool {
        self.control.terminate()
    }

    /// See [`SessionControl::resize`].
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.control.resize(cols, rows)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.control.is_running() && self.control.shared.kill() {
            tracing::debug!(session = %self.control.id(), "running session dropped, killed");
        }
    }
}
