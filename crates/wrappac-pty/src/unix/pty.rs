//! The master side of a Unix terminal pair.
//!
//! The master descriptor is non-blocking and registered with tokio. Linux
//! reports `EIO` on a read once the last slave descriptor is closed; that
//! is surfaced as end-of-file.

use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::io::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, ready};

use rustix::fs::{Mode, OFlags, fcntl_setfl, open};
use rustix::pty::{OpenptFlags, grantpt, openpt, ptsname, unlockpt};
use rustix::termios::{
    LocalModes, OptionalActions, OutputModes, Termios, Winsize, tcgetattr, tcgetwinsize,
    tcsetattr, tcsetwinsize,
};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::config::WindowSize;
use crate::error::{PtyError, Result};
use crate::traits::PtyMaster;

/// Async handle on a terminal master.
///
/// `&UnixPtyMaster` implements `AsyncRead` and `AsyncWrite` as well, so a
/// relay task and a writer task can share one master through an `Arc`
/// while its owner resizes it and toggles echo.
pub struct UnixPtyMaster {
    fd: AsyncFd<OwnedFd>,
    closed: AtomicBool,
}

impl std::fmt::Debug for UnixPtyMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyMaster")
            .field("fd", &self.fd.as_raw_fd())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl UnixPtyMaster {
    /// Allocate a pair. Returns the master and the slave's device path.
    pub fn open() -> Result<(Self, PathBuf)> {
        let create = |e| PtyError::from_errno(PtyError::Create, e);

        let master = openpt(OpenptFlags::RDWR | OpenptFlags::NOCTTY).map_err(create)?;
        grantpt(&master).map_err(create)?;
        unlockpt(&master).map_err(create)?;
        let slave = ptsname(&master, Vec::new()).map_err(create)?;
        fcntl_setfl(&master, OFlags::NONBLOCK).map_err(create)?;

        let fd = AsyncFd::new(master).map_err(PtyError::Create)?;
        let path = PathBuf::from(OsString::from_vec(slave.into_bytes()));
        Ok((
            Self {
                fd,
                closed: AtomicBool::new(false),
            },
            path,
        ))
    }

    /// False once [`Self::close`] has been called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() { Ok(()) } else { Err(PtyError::Closed) }
    }

    fn termios(&self) -> Result<Termios> {
        self.ensure_open()?;
        tcgetattr(self.fd.get_ref()).map_err(|e| PtyError::from_errno(PtyError::Termios, e))
    }

    /// Apply a new window size. Zero dimensions are rejected.
    pub fn set_window_size(&self, size: WindowSize) -> Result<()> {
        self.ensure_open()?;
        if !size.is_valid() {
            return Err(PtyError::InvalidWindowSize {
                cols: size.cols,
                rows: size.rows,
            });
        }
        let winsize = Winsize {
            ws_col: size.cols,
            ws_row: size.rows,
            ws_xpixel: size.xpixel,
            ws_ypixel: size.ypixel,
        };
        tcsetwinsize(self.fd.get_ref(), winsize)
            .map_err(|e| PtyError::from_errno(PtyError::Resize, e))
    }

    /// The size currently on the terminal.
    pub fn get_window_size(&self) -> Result<WindowSize> {
        self.ensure_open()?;
        let ws = tcgetwinsize(self.fd.get_ref())
            .map_err(|e| PtyError::from_errno(PtyError::Termios, e))?;
        Ok(WindowSize {
            cols: ws.ws_col,
            rows: ws.ws_row,
            xpixel: ws.ws_xpixel,
            ypixel: ws.ws_ypixel,
        })
    }

    /// Turn ECHO on or off. The pair shares one termios, so this affects
    /// input written after the call.
    pub fn set_echo(&self, enabled: bool) -> Result<()> {
        let mut termios = self.termios()?;
        termios.local_modes.set(LocalModes::ECHO, enabled);
        tcsetattr(self.fd.get_ref(), OptionalActions::Now, &termios)
            .map_err(|e| PtyError::from_errno(PtyError::Termios, e))
    }

    /// Whether ECHO is set.
    pub fn echo_enabled(&self) -> Result<bool> {
        Ok(self.termios()?.local_modes.contains(LocalModes::ECHO))
    }

    /// Mark the master closed. Reads then see EOF and writes `BrokenPipe`.
    pub fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn poll_read_inner(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            if !self.is_open() {
                return Poll::Ready(Ok(()));
            }
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|fd| Ok(rustix::io::read(fd.get_ref(), &mut *unfilled)?)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => return Poll::Ready(Ok(())),
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => {}
            }
        }
    }

    fn poll_write_inner(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            if !self.is_open() {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|fd| Ok(rustix::io::write(fd.get_ref(), buf)?)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => {}
            }
        }
    }
}

impl AsRawFd for UnixPtyMaster {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsyncRead for UnixPtyMaster {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().poll_read_inner(cx, buf)
    }
}

impl AsyncRead for &UnixPtyMaster {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.poll_read_inner(cx, buf)
    }
}

impl AsyncWrite for UnixPtyMaster {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().poll_write_inner(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for &UnixPtyMaster {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_write_inner(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    // Shared handles cannot close the master for the owner.
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl PtyMaster for UnixPtyMaster {
    fn resize(&self, size: WindowSize) -> Result<()> {
        self.set_window_size(size)
    }

    fn window_size(&self) -> Result<WindowSize> {
        self.get_window_size()
    }

    fn set_echo(&self, enabled: bool) -> Result<()> {
        Self::set_echo(self, enabled)
    }

    fn echo_enabled(&self) -> Result<bool> {
        Self::echo_enabled(self)
    }

    fn close(&mut self) -> Result<()> {
        Self::close(self)
    }
}

/// Open the slave device of a pair without making it the caller's
/// controlling terminal.
pub fn open_slave(path: &Path) -> Result<OwnedFd> {
    open(path, OFlags::RDWR | OFlags::NOCTTY | OFlags::CLOEXEC, Mode::empty())
        .map_err(|e| PtyError::from_errno(PtyError::Create, e))
}

/// Set ECHO and ONLCR on a terminal before its child starts.
pub fn configure_line_discipline(fd: impl AsFd, echo: bool, translate_newlines: bool) -> Result<()> {
    let termios_err = |e| PtyError::from_errno(PtyError::Termios, e);

    let mut termios = tcgetattr(&fd).map_err(termios_err)?;
    termios.local_modes.set(LocalModes::ECHO, echo);
    termios.output_modes.set(OutputModes::ONLCR, translate_newlines);
    tcsetattr(&fd, OptionalActions::Now, &termios).map_err(termios_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slave_path_is_a_device() {
        let (master, slave) = UnixPtyMaster::open().expect("open pty");
        assert!(master.is_open());
        assert!(slave.starts_with("/dev"), "slave at {}", slave.display());
    }

    #[tokio::test]
    async fn resize_round_trips() {
        let (master, _) = UnixPtyMaster::open().expect("open pty");
        master.set_window_size(WindowSize::new(132, 43)).expect("resize");
        assert_eq!(master.get_window_size().expect("size"), WindowSize::new(132, 43));
        assert!(matches!(
            master.set_window_size(WindowSize::new(0, 10)),
            Err(PtyError::InvalidWindowSize { cols: 0, rows: 10 })
        ));
    }

    #[tokio::test]
    async fn echo_can_be_toggled() {
        let (master, slave) = UnixPtyMaster::open().expect("open pty");
        let _slave = open_slave(&slave).expect("open slave");

        master.set_echo(false).expect("echo off");
        assert!(!master.echo_enabled().expect("termios"));
        master.set_echo(true).expect("echo on");
        assert!(master.echo_enabled().expect("termios"));
    }

    #[tokio::test]
    async fn closed_master_refuses_control() {
        let (mut master, _) = UnixPtyMaster::open().expect("open pty");
        master.close().expect("close");
        assert!(!master.is_open());
        assert!(matches!(master.set_echo(false), Err(PtyError::Closed)));
    }
}
