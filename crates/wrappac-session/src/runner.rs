//! One command at a time, for a UI that shows a single console.
//!
//! A [`Runner`] wraps a [`Launcher`] and turns a session's output, prompts
//! and result into one ordered [`RunEvent`] stream that a UI can render as
//! a log.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::Instrument;

use crate::error::RunnerError;
use crate::invocation::Invocation;
use crate::session::{
    EventReceiver, InputForwarder, Launcher, OutputReceiver, PromptReceiver, Session, SessionControl,
};
use crate::types::{OutputChunk, PasswordPrompt, SessionId, SessionResult};

/// Event stream of a [`Runner`].
pub type RunEvents = UnboundedReceiverStream<RunEvent>;

/// Something that happened to the runner's current command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A command was launched. `command` is suitable for a log header.
    Started {
        /// The command as a shell would display it.
        command: String,
    },
    /// Output from the terminal.
    Output(OutputChunk),
    /// The privilege tool is waiting for a password.
    PasswordRequested(PasswordPrompt),
    /// The command finished.
    Finished(SessionResult),
    /// The session failed after it started.
    Failed(String),
}

#[derive(Debug)]
struct Active {
    id: SessionId,
    control: SessionControl,
    input: InputForwarder,
}

/// Runs one session at a time and reports it as [`RunEvent`]s.
#[derive(Debug)]
pub struct Runner {
    launcher: Launcher,
    active: Arc<Mutex<Option<Active>>>,
    events: mpsc::UnboundedSender<RunEvent>,
    receiver: Option<mpsc::UnboundedReceiver<RunEvent>>,
}

impl Runner {
    /// Create a runner that launches through `launcher`.
    #[must_use]
    pub fn new(launcher: Launcher) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            launcher,
            active: Arc::new(Mutex::new(None)),
            events,
            receiver: Some(receiver),
        }
    }

    /// Take the event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<RunEvents> {
        self.receiver.take().map(UnboundedReceiverStream::new)
    }

    /// Whether a command is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|active| active.control.is_running())
    }

    /// Launch `invocation`.
    ///
    /// Fails with [`RunnerError::Busy`] while another command is running.
    pub async fn run(&self, invocation: Invocation) -> Result<SessionId, RunnerError> {
        if self.is_running() {
            return Err(RunnerError::Busy);
        }

        let command = invocation.display_command();
        let mut session = self.launcher.launch(invocation).await?;
        let id = session.id();

        {
            let mut active = lock(&self.active);
            if active.as_ref().is_some_and(|a| a.control.is_running()) {
                // Another run() won the race while this one was launching.
                drop(active);
                session.kill();
                return Err(RunnerError::Busy);
            }
            *active = Some(Active {
                id,
                control: session.control(),
                input: session.input(),
            });
        }

        let _ = self.events.send(RunEvent::Started { command });
        let span = tracing::debug_span!("runner", session = %id);
        let streams = Streams {
            output: session.take_output(),
            prompts: session.take_prompts(),
        };
        let pump = pump(streams, session, self.events.clone(), Arc::clone(&self.active));
        tokio::spawn(pump.instrument(span));
        Ok(id)
    }

    /// Send SIGINT to the running command.
    pub fn interrupt(&self) -> Result<(), RunnerError> {
        let control = self.control().ok_or(RunnerError::Idle)?;
        control.interrupt()?;
        Ok(())
    }

    /// Stop the running command: SIGTERM, then SIGKILL after the grace
    /// period.
    pub fn terminate(&self) -> Result<(), RunnerError> {
        let control = self.control().ok_or(RunnerError::Idle)?;
        if control.terminate() {
            Ok(())
        } else {
            Err(RunnerError::Idle)
        }
    }

    /// Input handle of the running command.
    pub fn input(&self) -> Result<InputForwarder, RunnerError> {
        lock(&self.active)
            .as_ref()
            .filter(|active| active.control.is_running())
            .map(|active| active.input.clone())
            .ok_or(RunnerError::Idle)
    }

    fn control(&self) -> Option<SessionControl> {
        lock(&self.active)
            .as_ref()
            .filter(|active| active.control.is_running())
            .map(|active| active.control.clone())
    }
}

fn lock(active: &Mutex<Option<Active>>) -> MutexGuard<'_, Option<Active>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Streams {
    output: Option<OutputReceiver>,
    prompts: Option<PromptReceiver>,
}

/// Forward a session's streams as events, then its result.
async fn pump(
    mut streams: Streams,
    mut session: Session,
    events: mpsc::UnboundedSender<RunEvent>,
    active: Arc<Mutex<Option<Active>>>,
) {
    loop {
        let event = tokio::select! {
            Some(chunk) = recv(&mut streams.output) => RunEvent::Output(chunk),
            Some(prompt) = recv(&mut streams.prompts) => RunEvent::PasswordRequested(prompt),
            else => break,
        };
        let _ = events.send(event);
    }

    let event = match session.wait().await {
        Ok(result) => RunEvent::Finished(result),
        Err(e) => RunEvent::Failed(e.to_string()),
    };

    {
        let mut active = lock(&active);
        if active.as_ref().is_some_and(|a| a.id == session.id()) {
            *active = None;
        }
    }
    let _ = events.send(event);
}

/// Receive from an optional stream, closing it when it ends.
async fn recv<T>(stream: &mut Option<EventReceiver<T>>) -> Option<T> {
    let rx = stream.as_mut()?;
    let item = rx.recv().await;
    if item.is_none() {
        *stream = None;
    }
    item
}
