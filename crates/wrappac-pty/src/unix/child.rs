//! Unix child process management for PTY.
//!
//! Children are started through `tokio::process::Command` with the slave
//! side of the pair as their standard streams. Reaping stays with tokio so
//! the exit status is never stolen by a stray `waitpid`.

use std::ffi::OsStr;
use std::future::Future;
use std::io;
use std::os::unix::io::OwnedFd;
use std::pin::Pin;
use std::process::{ExitStatus as StdExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use rustix::process::{Pid, Signal, kill_process, kill_process_group};
use tokio::process::{Child as TokioChild, ChildStderr, Command};
use tokio::sync::Mutex;

use crate::config::{PtyConfig, PtySignal};
use crate::error::{PtyError, Result};
use crate::traits::{ExitStatus, PtyChild};

/// Unix child process handle.
pub struct UnixPtyChild {
    child: Arc<Mutex<TokioChild>>,
    pid: u32,
    running: Arc<AtomicBool>,
    exit_status: Arc<StdMutex<Option<ExitStatus>>>,
    stderr: Option<ChildStderr>,
}

impl std::fmt::Debug for UnixPtyChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyChild")
            .field("pid", &self.pid)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl UnixPtyChild {
    fn new(mut child: TokioChild) -> Result<Self> {
        let pid = child.id().ok_or_else(|| {
            PtyError::Spawn(io::Error::other("child exited before its pid was read"))
        })?;
        let stderr = child.stderr.take();

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            pid,
            running: Arc::new(AtomicBool::new(true)),
            exit_status: Arc::new(StdMutex::new(None)),
            stderr,
        })
    }

    /// Get the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take the read end of the stderr pipe.
    ///
    /// Only present when the child was spawned with `separate_stderr`, and
    /// only returned once.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    fn cached_status(&self) -> Option<ExitStatus> {
        self.exit_status.lock().ok().and_then(|guard| *guard)
    }

    fn record_status(&self, status: ExitStatus) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.exit_status.lock() {
            *guard = Some(status);
        }
    }

    /// Wait for the child process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.cached_status() {
            return Ok(status);
        }

        let status = {
            let mut child = self.child.lock().await;
            child.wait().await.map_err(PtyError::Wait)?
        };
        let status = convert_exit_status(status);
        self.record_status(status);
        Ok(status)
    }

    /// Try to get the exit status without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.cached_status() {
            return Ok(Some(status));
        }

        let Ok(mut child) = self.child.try_lock() else {
            // A concurrent wait owns the child; it will record the status.
            return Ok(None);
        };
        match child.try_wait().map_err(PtyError::Wait)? {
            Some(status) => {
                drop(child);
                let status = convert_exit_status(status);
                self.record_status(status);
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// A cloneable handle for signalling this child from other tasks.
    #[must_use]
    pub fn signaller(&self) -> ChildSignaller {
        ChildSignaller {
            pid: self.pid,
            running: Arc::clone(&self.running),
        }
    }

    /// Send a signal to the child process.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        self.signaller().signal(signal)
    }

    /// Send a signal to the child's process group.
    pub fn signal_group(&self, signal: PtySignal) -> Result<()> {
        self.signaller().signal_group(signal)
    }

    /// Kill the child's process group (SIGKILL).
    pub fn kill(&mut self) -> Result<()> {
        self.signal_group(PtySignal::Kill)
    }
}

/// Signals a PTY child without borrowing its [`UnixPtyChild`].
///
/// Lets one task wait on the child while another interrupts or kills it.
#[derive(Debug, Clone)]
pub struct ChildSignaller {
    pid: u32,
    running: Arc<AtomicBool>,
}

impl ChildSignaller {
    /// Process ID of the child.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child has not been reaped yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Send a signal to the child process.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        if !self.is_running() {
            return Err(PtyError::NotRunning);
        }

        let (pid, signal) = self.target(signal)?;
        kill_process(pid, signal).map_err(map_kill_error)
    }

    /// Send a signal to the child's process group.
    ///
    /// The group can outlive its leader, so this is still attempted after
    /// the child itself has exited.
    pub fn signal_group(&self, signal: PtySignal) -> Result<()> {
        let (pgid, raw) = self.target(signal)?;
        match kill_process_group(pgid, raw) {
            // The child may not have reached setsid yet.
            Err(rustix::io::Errno::SRCH) if self.is_running() => self.signal(signal),
            other => other.map_err(map_kill_error),
        }
    }

    fn target(&self, signal: PtySignal) -> Result<(Pid, Signal)> {
        let pid = i32::try_from(self.pid)
            .ok()
            .and_then(Pid::from_raw)
            .ok_or_else(|| {
                PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
            })?;
        let signal = Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))
        })?;
        Ok((pid, signal))
    }
}

fn map_kill_error(errno: rustix::io::Errno) -> PtyError {
    if errno == rustix::io::Errno::SRCH {
        PtyError::NotRunning
    } else {
        PtyError::from_errno(PtyError::Signal, errno)
    }
}

impl PtyChild for UnixPtyChild {
    fn pid(&self) -> u32 {
        Self::pid(self)
    }

    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitStatus>> + Send + '_>> {
        Box::pin(Self::wait(self))
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Self::try_wait(self)
    }

    fn signal_group(&self, signal: PtySignal) -> Result<()> {
        Self::signal_group(self, signal)
    }
}

fn convert_exit_status(status: StdExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        ExitStatus::Exited(code)
    } else if let Some(signal) = status.signal() {
        ExitStatus::Signaled(signal)
    } else {
        ExitStatus::Exited(-1)
    }
}

/// Spawn a child process on the slave side of a PTY.
///
/// The slave descriptor becomes the child's stdin and stdout, and its
/// stderr unless `separate_stderr` is set. The parent's copy is closed
/// when this returns, so the master sees EOF once the child and all of
/// its descendants are gone.
pub fn spawn_child<S, I>(
    slave_fd: OwnedFd,
    program: S,
    args: I,
    config: &PtyConfig,
) -> Result<UnixPtyChild>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let mut cmd = Command::new(program.as_ref());
    cmd.args(args);
    if let Some(env) = &config.env {
        cmd.env_clear();
        cmd.envs(env);
    }

    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    cmd.stdout(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    if config.separate_stderr {
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stderr(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    }

    // SAFETY: only async-signal-safe calls run between fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            // stdin has already been replaced with the slave at this point.
            if libc::ioctl(0, libc::TIOCSCTTY, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    drop(cmd);
    drop(slave_fd);

    UnixPtyChild::new(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unix::{UnixPtyMaster, open_slave};

    fn slave() -> (UnixPtyMaster, OwnedFd) {
        let (master, path) = UnixPtyMaster::open().expect("open pty");
        let slave = open_slave(&path).expect("open slave");
        (master, slave)
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let (_master, slave_fd) = slave();
        let mut child =
            spawn_child(slave_fd, "sh", ["-c", "exit 3"], &PtyConfig::default()).expect("spawn");

        let status = child.wait().await.expect("wait");
        assert_eq!(status, ExitStatus::Exited(3));
        assert!(!child.is_running());
        assert_eq!(child.try_wait().expect("try_wait"), Some(status));
    }

    #[tokio::test]
    async fn group_kill_reports_signal() {
        let (_master, slave_fd) = slave();
        let mut child =
            spawn_child(slave_fd, "sleep", ["30"], &PtyConfig::default()).expect("spawn");

        child.kill().expect("kill");
        let status = child.wait().await.expect("wait");
        assert_eq!(status, ExitStatus::Signaled(libc::SIGKILL));
        assert_eq!(status.as_code(), -libc::SIGKILL);
    }

    #[tokio::test]
    async fn signal_after_exit_is_rejected() {
        let (_master, slave_fd) = slave();
        let mut child = spawn_child(slave_fd, "true", std::iter::empty::<&str>(), &PtyConfig::default())
            .expect("spawn");

        child.wait().await.expect("wait");
        assert!(matches!(
            child.signal(PtySignal::Terminate),
            Err(PtyError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn signaller_interrupts_while_waiting() {
        let (_master, slave_fd) = slave();
        let mut child =
            spawn_child(slave_fd, "sleep", ["30"], &PtyConfig::default()).expect("spawn");
        let signaller = child.signaller();

        let waiter = tokio::spawn(async move { child.wait().await });
        signaller.signal_group(PtySignal::Terminate).expect("terminate");

        let status = waiter.await.expect("join").expect("wait");
        assert_eq!(status, ExitStatus::Signaled(libc::SIGTERM));
        assert!(!signaller.is_running());
    }

    #[tokio::test]
    async fn separate_stderr_is_piped() {
        use tokio::io::AsyncReadExt;

        let (_master, slave_fd) = slave();
        let config = PtyConfig::builder().separate_stderr(true).build();
        let mut child =
            spawn_child(slave_fd, "sh", ["-c", "echo oops >&2"], &config).expect("spawn");

        let mut stderr = child.take_stderr().expect("stderr pipe");
        assert!(child.take_stderr().is_none());

        let mut text = String::new();
        stderr.read_to_string(&mut text).await.expect("read stderr");
        child.wait().await.expect("wait");
        assert_eq!(text, "oops\n");
    }
}
