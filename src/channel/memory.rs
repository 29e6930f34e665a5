//! In-process channel
//!
//! Loopback transport for embedding the attach layer without a network hop,
//! and the channel the unit tests drive. The owner delivers inbound traffic
//! with [`MemoryChannel::deliver`] and inspects what strategies sent via
//! [`MemoryChannel::sent`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::{BinaryMode, ChannelEvent, ChannelMessage, ReadyState, TransportChannel};
use crate::error::{AttachError, ChannelError};
use crate::event::EventHub;

pub struct MemoryChannel {
    id: String,
    state: AtomicU8,
    binary_mode: Mutex<BinaryMode>,
    outbox: Mutex<Vec<ChannelMessage>>,
    events: EventHub<ChannelEvent>,
}

impl MemoryChannel {
    /// Create an open channel.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            state: AtomicU8::new(ReadyState::Open as u8),
            binary_mode: Mutex::new(BinaryMode::default()),
            outbox: Mutex::new(Vec::new()),
            events: EventHub::new(),
        })
    }

    /// Dispatch an inbound message to listeners.
    ///
    /// Returns the first protocol error raised by a listener.
    pub fn deliver(&self, msg: ChannelMessage) -> Result<(), AttachError> {
        let msg = msg.with_binary_mode(*self.binary_mode.lock());
        self.events.emit(&ChannelEvent::Message(msg))
    }

    /// Simulate the remote side going away.
    pub fn remote_close(&self) {
        self.state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        let _ = self.events.emit(&ChannelEvent::Close);
    }

    /// Simulate a transport failure (error followed by close).
    pub fn fail(&self, reason: &str) {
        let _ = self.events.emit(&ChannelEvent::Error(reason.to_string()));
        self.remote_close();
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<ChannelMessage> {
        self.outbox.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<ChannelMessage> {
        std::mem::take(&mut *self.outbox.lock())
    }
}

impl TransportChannel for MemoryChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, msg: ChannelMessage) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen);
        }
        self.outbox.lock().push(msg);
        Ok(())
    }

    fn close(&self) {
        if self.ready_state() == ReadyState::Closed {
            return;
        }
        self.remote_close();
    }

    fn binary_mode(&self) -> BinaryMode {
        *self.binary_mode.lock()
    }

    fn set_binary_mode(&self, mode: BinaryMode) {
        *self.binary_mode.lock() = mode;
    }

    fn events(&self) -> &EventHub<ChannelEvent> {
        &self.events
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("id", &self.id)
            .field("state", &self.ready_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_records_when_open() {
        let ch = MemoryChannel::new();
        ch.send(ChannelMessage::text("a")).unwrap();
        assert_eq!(ch.sent(), vec![ChannelMessage::text("a")]);
        assert_eq!(ch.take_sent().len(), 1);
        assert!(ch.sent().is_empty());
    }

    #[test]
    fn test_send_rejected_when_not_open() {
        let ch = MemoryChannel::new();
        ch.set_ready_state(ReadyState::Connecting);
        assert!(matches!(
            ch.send(ChannelMessage::text("a")),
            Err(ChannelError::NotOpen)
        ));
    }

    #[test]
    fn test_close_emits_once() {
        let ch = MemoryChannel::new();
        let closes = Arc::new(Mutex::new(0));
        let closes_clone = closes.clone();
        ch.events().listen(move |ev| {
            if *ev == ChannelEvent::Close {
                *closes_clone.lock() += 1;
            }
            Ok(())
        });

        ch.close();
        ch.close();
        assert_eq!(*closes.lock(), 1);
        assert_eq!(ch.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_fail_emits_error_then_close() {
        let ch = MemoryChannel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        ch.events().listen(move |ev| {
            seen_clone.lock().push(ev.clone());
            Ok(())
        });

        ch.fail("reset by peer");
        assert_eq!(
            *seen.lock(),
            vec![
                ChannelEvent::Error("reset by peer".into()),
                ChannelEvent::Close
            ]
        );
    }
}
