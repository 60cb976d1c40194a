//! Common types for wrappac-session.
//!
//! This module defines the values that flow between a session and its
//! consumer: output chunks, password prompts, keys and control characters,
//! session status, and the final result.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::escalation::EscalationTool;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new unique session ID.
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle state of a session.
///
/// Transitions only move forward: `Created -> Running -> (Exited | Killed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionStatus {
    /// Built but not yet started.
    Created = 0,
    /// The child is running.
    Running = 1,
    /// The child exited on its own (including by an external signal).
    Exited = 2,
    /// The session was killed or cancelled by its owner.
    Killed = 3,
}

impl SessionStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Killed)
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Exited,
            _ => Self::Killed,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Killed => "killed",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`SessionStatus`].
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(SessionStatus::Created as u8))
    }

    pub(crate) fn get(&self) -> SessionStatus {
        SessionStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to`. Returns the status observed before the
    /// attempt; the transition happened only if that equals `from`.
    pub(crate) fn transition(&self, from: SessionStatus, to: SessionStatus) -> SessionStatus {
        match self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(prev) | Err(prev) => SessionStatus::from_u8(prev),
        }
    }
}

/// A piece of raw output from the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Position in the session's output, starting at 0.
    pub seq: u64,
    /// The bytes, exactly as the terminal produced them.
    pub data: Bytes,
}

impl OutputChunk {
    /// Lossy UTF-8 view of the chunk.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// The child is waiting for a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPrompt {
    /// The privilege tool that asked.
    pub tool: EscalationTool,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// The process exited normally.
    Exited,
    /// The process was terminated by a signal it did not receive from us.
    Signaled(i32),
    /// The owner killed or cancelled the session.
    Killed,
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    /// Exit code, or the negated signal number when a signal ended the process.
    pub exit_code: i32,
    /// Why the session ended.
    pub cause: TerminationCause,
    /// Captured stderr, when it was separated from the terminal.
    pub stderr: Option<String>,
    /// Wall-clock time from launch to exit.
    pub duration: Duration,
    /// Total bytes delivered to the output consumer.
    pub output_bytes: u64,
}

impl SessionResult {
    /// Whether the process exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0 && matches!(self.cause, TerminationCause::Exited)
    }
}

/// Control characters that can be sent to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlChar {
    /// Ctrl+C (ETX) - Interrupt
    CtrlC,
    /// Ctrl+D (EOT) - End of transmission / EOF
    CtrlD,
    /// Ctrl+L (FF) - Clear screen
    CtrlL,
    /// Ctrl+Q (DC1) - XON / Resume
    CtrlQ,
    /// Ctrl+S (DC3) - XOFF / Pause
    CtrlS,
    /// Ctrl+U (NAK) - Kill line
    CtrlU,
    /// Ctrl+W (ETB) - Kill word
    CtrlW,
    /// Ctrl+Z (SUB) - Suspend
    CtrlZ,
    /// Ctrl+\ (FS) - Quit
    CtrlBackslash,
    /// Escape
    Escape,
}

impl ControlChar {
    /// Get the byte value of this control character.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::CtrlC => 0x03,
            Self::CtrlD => 0x04,
            Self::CtrlL => 0x0C,
            Self::CtrlQ => 0x11,
            Self::CtrlS => 0x13,
            Self::CtrlU => 0x15,
            Self::CtrlW => 0x17,
            Self::CtrlZ => 0x1A,
            Self::CtrlBackslash => 0x1C,
            Self::Escape => 0x1B,
        }
    }

    /// Create from a character (e.g., 'c' for Ctrl+C).
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'c' => Some(Self::CtrlC),
            'd' => Some(Self::CtrlD),
            'l' => Some(Self::CtrlL),
            'q' => Some(Self::CtrlQ),
            's' => Some(Self::CtrlS),
            'u' => Some(Self::CtrlU),
            'w' => Some(Self::CtrlW),
            'z' => Some(Self::CtrlZ),
            '\\' => Some(Self::CtrlBackslash),
            '[' => Some(Self::Escape),
            _ => None,
        }
    }
}

/// A keyboard key, as a terminal front-end sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// A printable character.
    Char(char),
    /// Ctrl plus a letter.
    Ctrl(char),
    /// Backspace (sends DEL).
    Backspace,
    /// Return/Enter.
    Enter,
    /// Tab.
    Tab,
    /// Escape.
    Escape,
    /// Cursor up.
    Up,
    /// Cursor down.
    Down,
    /// Cursor left.
    Left,
    /// Cursor right.
    Right,
    /// Home.
    Home,
    /// End.
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Insert.
    Insert,
    /// Delete.
    Delete,
    /// Function key F1 to F12.
    F(u8),
}

impl Key {
    /// The byte sequence an xterm-compatible terminal sends for this key.
    ///
    /// With `alt`, the sequence is prefixed by ESC. Returns `None` for keys
    /// with no encoding (`Ctrl` of a non-letter, function keys above F12).
    #[must_use]
    pub fn encode(self, alt: bool) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(8);
        if alt {
            out.push(0x1b);
        }

        match self {
            Self::Char(c) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Self::Ctrl(c) => {
                let lower = c.to_ascii_lowercase();
                if !lower.is_ascii_lowercase() {
                    return None;
                }
                out.push(lower as u8 - b'a' + 1);
            }
            Self::Backspace => out.push(0x7f),
            Self::Enter => out.push(b'\r'),
            Self::Tab => out.push(b'\t'),
            Self::Escape => out.push(0x1b),
            Self::Up => out.extend_from_slice(b"\x1b[A"),
            Self::Down => out.extend_from_slice(b"\x1b[B"),
            Self::Right => out.extend_from_slice(b"\x1b[C"),
            Self::Left => out.extend_from_slice(b"\x1b[D"),
            Self::Home => out.extend_from_slice(b"\x1b[H"),
            Self::End => out.extend_from_slice(b"\x1b[F"),
            Self::PageUp => out.extend_from_slice(b"\x1b[5~"),
            Self::PageDown => out.extend_from_slice(b"\x1b[6~"),
            Self::Insert => out.extend_from_slice(b"\x1b[2~"),
            Self::Delete => out.extend_from_slice(b"\x1b[3~"),
            Self::F(n) => out.extend_from_slice(function_key(n)?),
        }

        Some(out)
    }
}

const fn function_key(n: u8) -> Option<&'static [u8]> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq)
}
