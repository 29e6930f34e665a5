//! Output coalescing buffer
//!
//! Chunks arriving within one flush window are concatenated and written to the
//! terminal in a single `write`. At most one flush is pending per buffer.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::terminal::TerminalSurface;

/// Default delay between the first buffered chunk and the flush
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(10);

pub struct OutputBuffer {
    /// `Some` while a flush is scheduled
    pending: Mutex<Option<String>>,
    delay: Duration,
}

impl OutputBuffer {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(None),
            delay,
        })
    }

    /// Append a chunk, scheduling a flush if none is pending.
    ///
    /// The check and the scheduling happen under one lock, so two chunks can
    /// never both see "no flush pending".
    pub fn push(self: &Arc<Self>, data: &str, terminal: Weak<dyn TerminalSurface>) {
        let mut pending = self.pending.lock();
        if let Some(buf) = pending.as_mut() {
            buf.push_str(data);
            trace!("buffered {} bytes ({} pending)", data.len(), buf.len());
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                *pending = Some(data.to_owned());
                let this = Arc::clone(self);
                handle.spawn(async move {
                    tokio::time::sleep(this.delay).await;
                    this.flush(&terminal);
                });
            }
            Err(_) => {
                // No timer available; degrade to an immediate write
                drop(pending);
                debug!("no tokio runtime for flush timer, writing through");
                if let Some(terminal) = terminal.upgrade() {
                    terminal.write(data);
                }
            }
        }
    }

    /// Write out and clear whatever is pending.
    ///
    /// A flush firing after detach still writes: the terminal is alive, the
    /// output is simply no longer followed by more.
    pub fn flush(&self, terminal: &Weak<dyn TerminalSurface>) {
        let data = self.pending.lock().take();
        let Some(data) = data else {
            return;
        };
        trace!("flushing {} bytes", data.len());
        if let Some(terminal) = terminal.upgrade() {
            terminal.write(&data);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("pending", &self.is_pending())
            .field("delay", &self.delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTerminal;

    fn weak(t: &Arc<FakeTerminal>) -> Weak<dyn TerminalSurface> {
        let t: Arc<dyn TerminalSurface> = t.clone();
        Arc::downgrade(&t)
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_coalesce_into_one_write() {
        let terminal = FakeTerminal::new();
        let buffer = OutputBuffer::new(DEFAULT_FLUSH_DELAY);

        buffer.push("a", weak(&terminal));
        buffer.push("b", weak(&terminal));
        tokio::time::sleep(Duration::from_millis(5)).await;
        buffer.push("c", weak(&terminal));
        assert!(terminal.writes().is_empty());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(terminal.writes(), vec!["abc".to_string()]);
        assert!(!buffer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_window_after_flush() {
        let terminal = FakeTerminal::new();
        let buffer = OutputBuffer::new(DEFAULT_FLUSH_DELAY);

        buffer.push("one", weak(&terminal));
        tokio::time::sleep(Duration::from_millis(15)).await;
        buffer.push("two", weak(&terminal));
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert_eq!(terminal.writes(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_without_runtime_writes_through() {
        let terminal = FakeTerminal::new();
        let buffer = OutputBuffer::new(DEFAULT_FLUSH_DELAY);
        buffer.push("now", weak(&terminal));
        assert_eq!(terminal.writes(), vec!["now".to_string()]);
        assert!(!buffer.is_pending());
    }
}
