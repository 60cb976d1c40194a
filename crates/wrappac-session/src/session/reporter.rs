//! Result reporting: waits for the child and publishes its outcome.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wrappac_pty::{ExitStatus, UnixPtyChild};

use super::Shared;
use crate::error::{RelayError, Result, SessionError, WaitError};
use crate::types::{SessionResult, SessionStatus, TerminationCause};

/// Future resolving to a session's result.
///
/// Resolves once, after every output chunk has been delivered.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ResultFuture {
    rx: Option<oneshot::Receiver<Result<SessionResult>>>,
}

impl ResultFuture {
    pub(crate) const fn new(rx: oneshot::Receiver<Result<SessionResult>>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A future for a result that was already taken.
    pub(crate) const fn taken() -> Self {
        Self { rx: None }
    }

    /// The result, if it has been published. Does not wait.
    ///
    /// Returns `None` while the session is still running. After the result
    /// has been returned once, further calls report [`SessionError::Closed`].
    pub fn try_result(&mut self) -> Option<Result<SessionResult>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(SessionError::Closed))
            }
        }
    }
}

impl Future for ResultFuture {
    type Output = Result<SessionResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(SessionError::Closed));
        };
        let result = match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(SessionError::Closed),
            Poll::Pending => return Poll::Pending,
        };
        self.rx = None;
        Poll::Ready(result)
    }
}

/// Everything the reporter task owns.
pub(crate) struct Reporter {
    pub(crate) child: UnixPtyChild,
    pub(crate) shared: Arc<Shared>,
    pub(crate) relay: JoinHandle<std::result::Result<u64, RelayError>>,
    pub(crate) stop_relay: Option<oneshot::Sender<()>>,
    pub(crate) stderr: Option<JoinHandle<io::Result<Vec<u8>>>>,
    pub(crate) started: Instant,
    pub(crate) drain_timeout: Duration,
    pub(crate) result: oneshot::Sender<Result<SessionResult>>,
}

/// Wait for the child, let the relay drain, then publish the result.
pub(crate) async fn run(mut reporter: Reporter) {
    let outcome = report(&mut reporter).await;
    reporter.shared.finish();

    match &outcome {
        Ok(result) => tracing::info!(
            exit_code = result.exit_code,
            cause = ?result.cause,
            duration_ms = result.duration.as_millis() as u64,
            output_bytes = result.output_bytes,
            "session finished"
        ),
        Err(e) => tracing::warn!(error = %e, "session failed"),
    }

    // The session may have been dropped without anyone waiting.
    let _ = reporter.result.send(outcome);
}

async fn report(reporter: &mut Reporter) -> Result<SessionResult> {
    let shared = Arc::clone(&reporter.shared);
    let pid = reporter.child.pid();

    let status = match reporter.child.wait().await {
        Ok(status) => status,
        Err(source) => {
            shared.kill();
            stop_relay(reporter);
            return Err(WaitError { pid, source }.into());
        }
    };
    let duration = reporter.started.elapsed();

    // Losing the race means the owner killed the session first.
    let killed = shared
        .status
        .transition(SessionStatus::Running, SessionStatus::Exited)
        != SessionStatus::Running;
    tracing::debug!(%status, killed, "child reaped");

    let output_bytes = drain_relay(reporter).await?;
    let stderr = collect_stderr(reporter).await;

    let cause = match status {
        _ if killed => TerminationCause::Killed,
        ExitStatus::Exited(_) => TerminationCause::Exited,
        ExitStatus::Signaled(signal) => TerminationCause::Signaled(signal),
    };

    Ok(SessionResult {
        exit_code: status.as_code(),
        cause,
        stderr,
        duration,
        output_bytes,
    })
}

fn stop_relay(reporter: &mut Reporter) {
    if let Some(stop) = reporter.stop_relay.take() {
        let _ = stop.send(());
    }
}

/// Give the relay `drain_timeout` to reach EOF, then stop it.
///
/// Descendants that inherited the terminal can keep it open after the child
/// is reaped; their later output is not waited for.
async fn drain_relay(reporter: &mut Reporter) -> Result<u64> {
    let joined = match tokio::time::timeout(reporter.drain_timeout, &mut reporter.relay).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::debug!(
                timeout_ms = reporter.drain_timeout.as_millis() as u64,
                "terminal still open after exit, stopping relay"
            );
            stop_relay(reporter);
            (&mut reporter.relay).await
        }
    };

    match joined {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(SessionError::Relay(RelayError {
            bytes_read: 0,
            source: io::Error::other(e),
        })),
    }
}

async fn collect_stderr(reporter: &mut Reporter) -> Option<String> {
    let handle = reporter.stderr.take()?;
    match tokio::time::timeout(reporter.drain_timeout, handle).await {
        Ok(Ok(Ok(bytes))) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(Ok(Err(e))) => {
            tracing::warn!(error = %e, "failed to read stderr");
            Some(String::new())
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "stderr collector failed");
            Some(String::new())
        }
        Err(_) => {
            tracing::debug!("stderr still open after exit, giving up");
            Some(String::new())
        }
    }
}
