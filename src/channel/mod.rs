//! Transport Channel abstraction
//!
//! A channel is any ordered duplex message pipe with close/error
//! notifications (in practice a WebSocket). Adapters normalize every inbound
//! frame into a [`ChannelMessage`] before strategies see it, so strategies
//! never inspect payload shapes at runtime.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::ChannelError;
use crate::event::EventHub;

pub mod memory;
#[cfg(feature = "websocket")]
pub mod ws;

pub use memory::MemoryChannel;
#[cfg(feature = "websocket")]
pub use ws::WsChannel;

/// A normalized channel payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

impl ChannelMessage {
    pub fn text(s: impl Into<String>) -> Self {
        ChannelMessage::Text(s.into())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        ChannelMessage::Binary(b.into())
    }

    pub fn len(&self) -> usize {
        match self {
            ChannelMessage::Text(s) => s.len(),
            ChannelMessage::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the channel's binary mode to an inbound binary payload.
    pub(crate) fn with_binary_mode(self, mode: BinaryMode) -> Self {
        match (self, mode) {
            (ChannelMessage::Binary(b), BinaryMode::Text) => {
                ChannelMessage::Text(String::from_utf8_lossy(&b).into_owned())
            }
            (msg, _) => msg,
        }
    }
}

/// Inbound channel notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(ChannelMessage),
    Close,
    Error(String),
}

/// WebSocket-style ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// How an adapter hands binary frames to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryMode {
    /// Deliver as [`ChannelMessage::Binary`]
    #[default]
    Raw,
    /// Decode to UTF-8 text (lossy) and deliver as [`ChannelMessage::Text`]
    Text,
}

/// Duplex message channel a terminal can be attached to.
pub trait TransportChannel: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    fn ready_state(&self) -> ReadyState;

    fn send(&self, msg: ChannelMessage) -> Result<(), ChannelError>;

    /// Start a graceful close. A `Close` event follows once the channel is down.
    fn close(&self);

    fn binary_mode(&self) -> BinaryMode;

    fn set_binary_mode(&self, mode: BinaryMode);

    fn events(&self) -> &EventHub<ChannelEvent>;

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// Pointer identity for trait-object channels (ignores vtable differences).
pub(crate) fn same_channel(a: &Arc<dyn TransportChannel>, b: &Arc<dyn TransportChannel>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
