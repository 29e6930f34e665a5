//! Attach layer error types

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while routing traffic between a terminal and its channel.
///
/// Protocol violations are returned from the channel's message dispatch so the
/// transport owner can log or surface them; they are never swallowed here.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Unsupported channel payload: {0}")]
    UnsupportedPayload(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Detection is no longer pending: {0}")]
    StaleDetection(Uuid),

    #[error("Zmodem parser error: {0}")]
    Parser(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Transport channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel is not open")]
    NotOpen,

    #[error("Outbound queue is full")]
    Backpressure,

    #[error("Channel closed")]
    Closed,

    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
