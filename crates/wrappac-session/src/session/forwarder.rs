//! Input forwarding: caller to terminal.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

use super::Shared;
use crate::error::{Result, SessionError};
use crate::types::{ControlChar, Key};

/// A write queued for the writer task.
pub(crate) enum InputCommand {
    Plain(Vec<u8>),
    Masked(Zeroizing<Vec<u8>>),
}

impl std::fmt::Debug for InputCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(bytes) => f.debug_tuple("Plain").field(&bytes.len()).finish(),
            Self::Masked(_) => f.write_str("Masked(..)"),
        }
    }
}

/// Cloneable handle that writes to a session's terminal.
///
/// Writes are queued and performed by a background task, so the send
/// methods never block. Writes from one handle reach the terminal in the
/// order they were sent.
#[derive(Debug, Clone)]
pub struct InputForwarder {
    tx: mpsc::UnboundedSender<InputCommand>,
    shared: Arc<Shared>,
}

impl InputForwarder {
    pub(crate) const fn new(tx: mpsc::UnboundedSender<InputCommand>, shared: Arc<Shared>) -> Self {
        Self { tx, shared }
    }

    fn queue(&self, command: InputCommand) -> Result<()> {
        if self.shared.status.get().is_terminal() {
            return Err(SessionError::Closed);
        }
        self.tx.send(command).map_err(|_| SessionError::Closed)
    }

    /// Queue caller text. In a masked session all of it is treated as a
    /// secret.
    fn queue_text(&self, bytes: Vec<u8>) -> Result<()> {
        if self.shared.masked {
            let bytes = Zeroizing::new(bytes);
            self.shared.secrets.register(&bytes);
            self.queue(InputCommand::Masked(bytes))
        } else {
            self.queue(InputCommand::Plain(bytes))
        }
    }

    /// Send raw bytes.
    pub fn send(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.queue_text(data.as_ref().to_vec())
    }

    /// Send a string.
    pub fn send_str(&self, text: &str) -> Result<()> {
        self.send(text)
    }

    /// Send a string followed by `\n`.
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.queue_text(data)
    }

    /// Send a control character such as Ctrl+C or Ctrl+D.
    ///
    /// Ctrl+C goes through the terminal, so the line discipline turns it
    /// into SIGINT for the foreground group.
    pub fn send_control(&self, ctrl: ControlChar) -> Result<()> {
        self.queue(InputCommand::Plain(vec![ctrl.as_byte()]))
    }

    /// Send the escape sequence for a key. Keys without an encoding are
    /// ignored.
    pub fn send_key(&self, key: Key) -> Result<()> {
        self.send_key_inner(key, false)
    }

    /// Send a key with the Alt modifier (ESC prefix).
    pub fn send_alt_key(&self, key: Key) -> Result<()> {
        self.send_key_inner(key, true)
    }

    fn send_key_inner(&self, key: Key, alt: bool) -> Result<()> {
        match key.encode(alt) {
            Some(bytes) => self.queue(InputCommand::Plain(bytes)),
            None => {
                tracing::trace!(?key, "key has no terminal encoding");
                Ok(())
            }
        }
    }

    /// Send bytes that must never appear in the session's output.
    ///
    /// The bytes are written with terminal echo off and are removed from
    /// any output that still repeats them.
    pub fn send_masked(&self, secret: impl AsRef<[u8]>) -> Result<()> {
        let secret = Zeroizing::new(secret.as_ref().to_vec());
        self.shared.secrets.register(&secret);
        self.queue(InputCommand::Masked(secret))
    }

    /// Answer a password prompt: the secret followed by `\n`, masked.
    pub fn send_password(&self, password: &str) -> Result<()> {
        self.shared.secrets.register(password.as_bytes());

        let mut line = Zeroizing::new(Vec::with_capacity(password.len() + 1));
        line.extend_from_slice(password.as_bytes());
        line.push(b'\n');
        self.queue(InputCommand::Masked(line))?;

        self.shared.awaiting_password.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Drain queued writes into the terminal until the session finishes or
/// every [`InputForwarder`] is gone.
pub(crate) async fn run_writer(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<InputCommand>) {
    let mut finished = shared.finished.subscribe();
    let mut writer = &*shared.master;
    // Echo is off because a masked write turned it off, not because the
    // session is masked.
    let mut echo_suppressed = false;

    loop {
        let command = tokio::select! {
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = finished.wait_for(|done| *done) => break,
        };

        let result = match command {
            InputCommand::Plain(bytes) => {
                if echo_suppressed {
                    set_echo(&shared, true);
                    echo_suppressed = false;
                }
                write(&mut writer, &bytes).await
            }
            InputCommand::Masked(bytes) => {
                if !shared.masked && !echo_suppressed {
                    set_echo(&shared, false);
                    echo_suppressed = true;
                }
                write(&mut writer, &bytes).await
            }
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "terminal write failed, input closed");
            break;
        }
    }

    if echo_suppressed && !*finished.borrow() {
        set_echo(&shared, true);
    }
}

async fn write(writer: &mut &wrappac_pty::UnixPtyMaster, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

fn set_echo(shared: &Shared, enabled: bool) {
    if let Err(e) = shared.master.set_echo(enabled) {
        tracing::warn!(enabled, error = %e, "failed to change terminal echo");
    }
}
