//! OxideTerm Attach - terminal/transport glue
//!
//! Connects a terminal surface to a bidirectional message channel (usually a
//! WebSocket) using one of a small set of wire conventions: plain passthrough,
//! terminado-style JSON frames, or a zmodem-aware sentry that can take over
//! the stream for file transfers. Also ships the winpty soft-wrap shim.

pub mod attach;
pub mod channel;
pub mod compat;
pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod terminal;
pub mod zmodem;

#[cfg(test)]
mod testing;

pub use attach::{AttachOptions, AttachState, AttachStrategy, DetachReason, FramedAttach, PlainAttach};
pub use channel::{BinaryMode, ChannelEvent, ChannelMessage, MemoryChannel, ReadyState, TransportChannel};
#[cfg(feature = "websocket")]
pub use channel::WsChannel;
pub use compat::{HostPlatform, WinptyCompat};
pub use config::{AttachConfig, AttachMode, CompatMode, ConfigError};
pub use error::{AttachError, ChannelError};
pub use event::{EventHub, ListenerId};
pub use session::TerminalSession;
pub use terminal::{Cell, LineBuffer, TerminalEvent, TerminalSize, TerminalSurface};
pub use zmodem::{
    Detection, RawSender, SentryOutput, TransferDirection, ZmodemEvent, ZmodemOptions, ZmodemParser,
    ZmodemSentry,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the default tracing subscriber (`RUST_LOG`, falling back to `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
