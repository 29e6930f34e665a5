//! Terminal Surface contract
//!
//! The attach layer never owns a terminal emulator. It talks to whatever
//! surface the caller renders (xterm.js behind a webview, a headless grid, a
//! test double) through these traits.

use serde::{Deserialize, Serialize};

use crate::event::EventHub;

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

/// Notifications emitted by a terminal surface
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalEvent {
    /// User input to be sent to the remote side
    Data(String),
    /// The visible grid was resized
    Resize(TerminalSize),
    /// The cursor moved down one line (after the move)
    LineFeed,
}

/// A live terminal that can display output and report input.
pub trait TerminalSurface: Send + Sync {
    /// Render output text.
    fn write(&self, data: &str);

    /// Input, resize and line-feed notifications.
    fn events(&self) -> &EventHub<TerminalEvent>;
}

/// One rendered cell of the line buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    /// Rendered width in columns (0 for the trailing half of a wide char)
    pub width: u8,
}

impl Cell {
    /// Blank single-width cell left behind by an unwritten column.
    pub const BLANK: Cell = Cell { ch: ' ', width: 1 };

    pub fn is_blank(&self) -> bool {
        *self == Self::BLANK
    }
}

/// Read/patch access to a terminal's line buffer.
///
/// Only the winpty compatibility shim needs this; plain attach strategies work
/// with any [`TerminalSurface`].
pub trait LineBuffer {
    fn cols(&self) -> u16;

    /// Absolute index (scrollback included) of the cursor's line.
    fn cursor_line(&self) -> usize;

    fn cell(&self, line: usize, col: u16) -> Option<Cell>;

    fn set_wrapped(&self, line: usize, wrapped: bool);
}
