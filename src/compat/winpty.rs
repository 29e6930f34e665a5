//! winpty soft-wrap fix
//!
//! winpty reflows long lines by emitting an explicit CR/LF at the right edge,
//! so the terminal never marks the continuation row as wrapped and selection /
//! reflow treat it as a hard break. After each line feed we look at the last
//! column of the previous row: anything other than a blank single-width cell
//! means the line ran to the edge, and the new row is flagged as wrapped.
//!
//! Only applied when the remote host is Windows.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::event::ListenerId;
use crate::terminal::{Cell, LineBuffer, TerminalEvent, TerminalSurface};

/// Platform of the host running the remote PTY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPlatform {
    Windows,
    Other,
}

impl HostPlatform {
    /// Platform of the current process (for local PTYs)
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Other
        }
    }
}

/// Installed shim; removing it (or dropping it) unregisters the listener.
pub struct WinptyCompat {
    terminal: Weak<dyn TerminalSurface>,
    listener: Option<ListenerId>,
}

impl WinptyCompat {
    /// Install the shim on `terminal` if `host` needs it.
    pub fn apply<T>(terminal: &Arc<T>, host: HostPlatform) -> Option<Self>
    where
        T: TerminalSurface + LineBuffer + 'static,
    {
        if host != HostPlatform::Windows {
            trace!("winpty compat not needed for {:?}", host);
            return None;
        }
        Some(Self::install(terminal))
    }

    /// Install unconditionally (explicit override of host detection).
    pub fn install<T>(terminal: &Arc<T>) -> Self
    where
        T: TerminalSurface + LineBuffer + 'static,
    {
        let buffer: Weak<T> = Arc::downgrade(terminal);
        let listener = terminal.events().listen(move |event| {
            if *event == TerminalEvent::LineFeed {
                if let Some(buffer) = buffer.upgrade() {
                    fix_wrap(&*buffer);
                }
            }
            Ok(())
        });

        let surface: Arc<dyn TerminalSurface> = terminal.clone();
        debug!("winpty compat installed");
        Self {
            terminal: Arc::downgrade(&surface),
            listener: Some(listener),
        }
    }

    pub fn remove(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if let Some(id) = self.listener.take() {
            if let Some(terminal) = self.terminal.upgrade() {
                terminal.events().unlisten(id);
            }
        }
    }
}

impl Drop for WinptyCompat {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Mark the cursor's line as a continuation if the previous line is full.
pub fn fix_wrap<B: LineBuffer + ?Sized>(buffer: &B) {
    let line = buffer.cursor_line();
    let cols = buffer.cols();
    if line == 0 || cols == 0 {
        return;
    }
    let last = buffer.cell(line - 1, cols - 1).unwrap_or(Cell::BLANK);
    if !last.is_blank() {
        buffer.set_wrapped(line, true);
    }
}
