//! Output relay: terminal to caller.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use wrappac_pty::UnixPtyMaster;

pub use tokio::sync::mpsc::error::TryRecvError;

use super::Shared;
use crate::error::RelayError;
use crate::scrub::{PromptDetector, SecretScrubber};
use crate::types::{OutputChunk, PasswordPrompt};

const READ_BUFFER_SIZE: usize = 8192;

/// Receiving end of a session event stream.
///
/// Yields events in order and ends once the session has finished and
/// everything it produced has been received.
#[derive(Debug)]
pub struct EventReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

/// Output chunks of a session.
pub type OutputReceiver = EventReceiver<OutputChunk>;

/// Password prompts of a session.
pub type PromptReceiver = EventReceiver<PasswordPrompt>;

impl<T> EventReceiver<T> {
    pub(crate) const fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next event without waiting.
    ///
    /// Returns [`TryRecvError::Empty`] if nothing is queued yet and
    /// [`TryRecvError::Disconnected`] once the stream has ended.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Take every event queued right now.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}

impl<T> Stream for EventReceiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Owned reader over a session's terminal master.
#[derive(Debug)]
pub(crate) struct MasterReader(Arc<UnixPtyMaster>);

impl MasterReader {
    pub(crate) const fn new(master: Arc<UnixPtyMaster>) -> Self {
        Self(master)
    }
}

impl AsyncRead for MasterReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut master: &UnixPtyMaster = &self.0;
        Pin::new(&mut master).poll_read(cx, buf)
    }
}

/// Everything the relay task owns.
pub(crate) struct Relay {
    pub(crate) shared: Arc<Shared>,
    pub(crate) output: mpsc::UnboundedSender<OutputChunk>,
    pub(crate) prompts: mpsc::UnboundedSender<PasswordPrompt>,
    pub(crate) detector: Option<PromptDetector>,
    pub(crate) scrubber: SecretScrubber,
    pub(crate) stop: oneshot::Receiver<()>,
}

impl Relay {
    fn deliver(&mut self, seq: &mut u64, data: &[u8], at_eof: bool) {
        let (visible, prompt) = match self.detector.as_mut() {
            Some(detector) if at_eof => detector.finish(),
            Some(detector) => detector.feed(data),
            None => (data.to_vec(), None),
        };

        let clean = if at_eof {
            let mut clean = self.scrubber.feed(&visible);
            clean.extend(self.scrubber.finish());
            clean
        } else {
            self.scrubber.feed(&visible)
        };

        if !clean.is_empty() {
            let chunk = OutputChunk {
                seq: *seq,
                data: Bytes::from(clean),
            };
            *seq += 1;
            // The caller may have dropped the receiver; the child keeps running.
            let _ = self.output.send(chunk);
        }

        if let Some(prompt) = prompt {
            tracing::info!(tool = %prompt.tool, "password requested");
            let _ = self.prompts.send(prompt);
        }
    }
}

/// Read the terminal until EOF, or until told to stop after the child
/// exited.
///
/// Returns the number of bytes read. A read error kills the session.
pub(crate) async fn run<R>(mut relay: Relay, mut reader: R) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut bytes_read = 0u64;
    let mut seq = 0u64;

    loop {
        let read = tokio::select! {
            biased;
            _ = &mut relay.stop => {
                tracing::debug!(bytes_read, "relay stopped before EOF");
                break;
            }
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::trace!(bytes_read, "terminal closed");
                break;
            }
            Ok(n) => {
                bytes_read += n as u64;
                relay.deliver(&mut seq, &buf[..n], false);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => {
                tracing::error!(error = %source, bytes_read, "terminal read failed");
                relay.shared.kill();
                relay.deliver(&mut seq, &[], true);
                return Err(RelayError { bytes_read, source });
            }
        }
    }

    relay.deliver(&mut seq, &[], true);
    Ok(bytes_read)
}
