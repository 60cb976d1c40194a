//! Watching the caller's own terminal for size changes.
//!
//! A front-end that shows a session in its terminal mirrors that
//! terminal's size onto the session's pair whenever SIGWINCH arrives.

use std::io;

use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::{Handle, Signals};

/// Registration returned by [`on_window_change`]. Dropping it stops the
/// watcher thread.
#[derive(Debug)]
pub struct SignalHandle {
    handle: Handle,
}

impl SignalHandle {
    /// Stop watching. Idempotent.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Whether [`Self::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

impl Drop for SignalHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run `callback` on a background thread after every SIGWINCH.
pub fn on_window_change<F>(callback: F) -> io::Result<SignalHandle>
where
    F: Fn() + Send + 'static,
{
    let mut signals = Signals::new([SIGWINCH])?;
    let handle = signals.handle();

    std::thread::Builder::new()
        .name("wrappac-sigwinch".into())
        .spawn(move || {
            // Ends once the handle is closed.
            for _ in signals.forever() {
                callback();
            }
        })?;

    Ok(SignalHandle { handle })
}
