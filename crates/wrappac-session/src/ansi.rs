//! Plain-text rendering of terminal output.
//!
//! The output relay never alters escape sequences. Consumers that write a
//! plain log (the package manager's history view, a log file) run chunks
//! through an [`AnsiStripper`], which drops CSI, OSC, DCS and charset
//! sequences while keeping printable text and line control. The parser
//! state carries over between chunks, so a sequence split across two reads
//! is still removed.

use vte::{Parser, Perform};

/// Streaming escape-sequence remover.
pub struct AnsiStripper {
    parser: Parser,
    sink: TextSink,
}

impl std::fmt::Debug for AnsiStripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiStripper").finish_non_exhaustive()
    }
}

impl Default for AnsiStripper {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiStripper {
    /// Create a stripper with empty parser state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            sink: TextSink::default(),
        }
    }

    /// Strip one chunk of raw output.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD.
    pub fn strip(&mut self, data: &[u8]) -> String {
        self.parser.advance(&mut self.sink, data);
        std::mem::take(&mut self.sink.text)
    }
}

#[derive(Default)]
struct TextSink {
    text: String,
}

impl Perform for TextSink {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t' | 0x08) {
            self.text.push(byte as char);
        }
    }
}

/// Strip escape sequences from a complete piece of output.
#[must_use]
pub fn strip_ansi(data: &[u8]) -> String {
    AnsiStripper::new().strip(data)
}
