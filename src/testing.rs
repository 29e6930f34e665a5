//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::AttachError;
use crate::event::EventHub;
use crate::terminal::{Cell, LineBuffer, TerminalEvent, TerminalSize, TerminalSurface};
use crate::zmodem::{SentryOutput, ZmodemParser};

struct Line {
    cells: Vec<Cell>,
    wrapped: bool,
}

/// Terminal surface that records writes and keeps a tiny line buffer.
pub struct FakeTerminal {
    writes: Mutex<Vec<String>>,
    events: EventHub<TerminalEvent>,
    cols: u16,
    lines: Mutex<Vec<Line>>,
    cursor: Mutex<usize>,
}

impl FakeTerminal {
    pub fn new() -> Arc<Self> {
        Self::with_grid(80, 24)
    }

    pub fn with_grid(cols: u16, rows: usize) -> Arc<Self> {
        let lines = (0..rows)
            .map(|_| Line {
                cells: vec![Cell::BLANK; cols as usize],
                wrapped: false,
            })
            .collect();
        Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            events: EventHub::new(),
            cols,
            lines: Mutex::new(lines),
            cursor: Mutex::new(0),
        })
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn input(&self, data: &str) {
        self.events
            .emit(&TerminalEvent::Data(data.to_string()))
            .unwrap();
    }

    pub fn resize(&self, rows: u16, cols: u16) {
        self.events
            .emit(&TerminalEvent::Resize(TerminalSize { rows, cols }))
            .unwrap();
    }

    pub fn put_line(&self, line: usize, text: &str) {
        for (col, ch) in text.chars().enumerate() {
            self.set_cell(line, col as u16, Cell { ch, width: 1 });
        }
    }

    pub fn set_cell(&self, line: usize, col: u16, cell: Cell) {
        self.lines.lock()[line].cells[col as usize] = cell;
    }

    pub fn line_feed(&self) {
        *self.cursor.lock() += 1;
        self.events.emit(&TerminalEvent::LineFeed).unwrap();
    }

    pub fn is_wrapped(&self, line: usize) -> bool {
        self.lines.lock()[line].wrapped
    }
}

impl TerminalSurface for FakeTerminal {
    fn write(&self, data: &str) {
        self.writes.lock().push(data.to_string());
    }

    fn events(&self) -> &EventHub<TerminalEvent> {
        &self.events
    }
}

impl LineBuffer for FakeTerminal {
    fn cols(&self) -> u16 {
        self.cols
    }

    fn cursor_line(&self) -> usize {
        *self.cursor.lock()
    }

    fn cell(&self, line: usize, col: u16) -> Option<Cell> {
        self.lines
            .lock()
            .get(line)
            .and_then(|l| l.cells.get(col as usize).copied())
    }

    fn set_wrapped(&self, line: usize, wrapped: bool) {
        if let Some(l) = self.lines.lock().get_mut(line) {
            l.wrapped = wrapped;
        }
    }
}

/// Zmodem parser double that replays a script, one entry per consume() call.
/// The chunk `b"bad"` is rejected with a parser error.
pub struct ScriptedParser {
    script: VecDeque<Vec<SentryOutput>>,
}

impl ScriptedParser {
    pub fn new(script: Vec<Vec<SentryOutput>>) -> Box<Self> {
        Box::new(Self {
            script: script.into(),
        })
    }
}

impl ZmodemParser for ScriptedParser {
    fn consume(&mut self, octets: &[u8]) -> Result<Vec<SentryOutput>, AttachError> {
        if octets == b"bad" {
            return Err(AttachError::Parser("bad header".into()));
        }
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

/// Poll `cond` until it holds, failing the test after 5 seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
