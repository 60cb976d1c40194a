//! The user's own terminal: raw mode and key translation.

use std::io::{self, IsTerminal};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use wrappac_session::Key;
use zeroize::Zeroizing;

/// Raw mode for the lifetime of the guard.
#[derive(Debug)]
pub struct RawMode {
    _private: (),
}

impl RawMode {
    /// Enter raw mode if stdin is a terminal.
    pub fn enable() -> io::Result<Option<Self>> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }
        terminal::enable_raw_mode()?;
        Ok(Some(Self { _private: () }))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

/// Current size of the user's terminal, if it has one.
pub fn size() -> Option<(u16, u16)> {
    terminal::size().ok().filter(|&(cols, rows)| cols > 0 && rows > 0)
}

/// A key press translated for the session, with its Alt state.
pub fn translate(event: KeyEvent) -> Option<(Key, bool)> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    let alt = event.modifiers.contains(KeyModifiers::ALT);
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);

    let key = match event.code {
        KeyCode::Char(c) if ctrl => Key::Ctrl(c),
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Enter => Key::Enter,
        KeyCode::Tab => Key::Tab,
        KeyCode::Esc => Key::Escape,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Insert => Key::Insert,
        KeyCode::Delete => Key::Delete,
        KeyCode::F(n) => Key::F(n),
        _ => return None,
    };
    Some((key, alt))
}

/// Line editor for a password typed in raw mode. Nothing is echoed.
#[derive(Debug, Default)]
pub struct PasswordEntry {
    buffer: Zeroizing<String>,
}

/// What a key press did to a [`PasswordEntry`].
#[derive(Debug, PartialEq, Eq)]
pub enum Entry {
    /// Still typing.
    Pending,
    /// Enter was pressed. The password is wiped when dropped.
    Done(Zeroizing<String>),
    /// Entry was abandoned with Ctrl+C or Escape.
    Cancelled,
}

impl PasswordEntry {
    /// Feed one key.
    pub fn key(&mut self, key: Key) -> Entry {
        match key {
            Key::Char(c) => self.buffer.push(c),
            Key::Backspace => {
                self.buffer.pop();
            }
            Key::Ctrl('u' | 'U') => self.buffer.clear(),
            Key::Enter => return Entry::Done(std::mem::take(&mut self.buffer)),
            Key::Ctrl('c' | 'C') | Key::Escape => {
                self.buffer.clear();
                return Entry::Cancelled;
            }
            _ => {}
        }
        Entry::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn keys_translate() {
        assert_eq!(
            translate(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some((Key::Ctrl('c'), false))
        );
        assert_eq!(
            translate(press(KeyCode::Char('x'), KeyModifiers::ALT)),
            Some((Key::Char('x'), true))
        );
        assert_eq!(translate(press(KeyCode::F(5), KeyModifiers::NONE)), Some((Key::F(5), false)));
        assert_eq!(translate(press(KeyCode::CapsLock, KeyModifiers::NONE)), None);
    }

    #[test]
    fn password_entry_edits_and_finishes() {
        let mut entry = PasswordEntry::default();
        for c in "hunterX".chars() {
            assert_eq!(entry.key(Key::Char(c)), Entry::Pending);
        }
        entry.key(Key::Backspace);
        entry.key(Key::Char('2'));
        assert_eq!(entry.key(Key::Enter), Entry::Done(Zeroizing::new("hunter2".to_string())));
        assert_eq!(entry.key(Key::Enter), Entry::Done(Zeroizing::default()));
    }

    #[test]
    fn password_entry_can_be_cancelled() {
        let mut entry = PasswordEntry::default();
        entry.key(Key::Char('a'));
        assert_eq!(entry.key(Key::Ctrl('c')), Entry::Cancelled);
        assert_eq!(entry.key(Key::Enter), Entry::Done(Zeroizing::default()));
    }
}
