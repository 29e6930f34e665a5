//! WebSocket channel adapter (tokio-tungstenite)
//!
//! Splits the socket into a reader task that normalizes and dispatches inbound
//! frames, and a writer task that drains a bounded outbound queue. The
//! synchronous `send` used by attach strategies only enqueues.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::{BinaryMode, ChannelEvent, ChannelMessage, ReadyState, TransportChannel};
use crate::error::{AttachError, ChannelError};
use crate::event::EventHub;

/// Outbound queue capacity - larger on Windows due to slower I/O throughput
#[cfg(target_os = "windows")]
const OUTBOUND_CAPACITY: usize = 16384;
#[cfg(not(target_os = "windows"))]
const OUTBOUND_CAPACITY: usize = 4096;

enum Outbound {
    Frame(Message),
    Close,
}

/// A [`TransportChannel`] backed by a WebSocket connection.
pub struct WsChannel {
    id: String,
    state: AtomicU8,
    binary_mode: Mutex<BinaryMode>,
    outbound_tx: mpsc::Sender<Outbound>,
    events: EventHub<ChannelEvent>,
}

impl WsChannel {
    /// Connect to `url` (ws:// or wss://) and start the pumps.
    pub async fn connect(url: &str) -> Result<Arc<Self>, ChannelError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let channel = Self::from_stream(ws_stream);
        info!("WebSocket channel {} connected to {}", channel.id, url);
        Ok(channel)
    }

    /// Wrap an already-handshaken WebSocket stream.
    ///
    /// Must be called from within a tokio runtime; the pumps are spawned
    /// immediately and the channel starts out `Open`.
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
        let channel = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            state: AtomicU8::new(ReadyState::Open as u8),
            binary_mode: Mutex::new(BinaryMode::default()),
            outbound_tx,
            events: EventHub::new(),
        });

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Task: outbound queue -> socket
        let id_out = channel.id.clone();
        tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                match item {
                    Outbound::Frame(msg) => {
                        if let Err(e) = ws_sender.send(msg).await {
                            debug!("WebSocket send failed on channel {}: {:?}", id_out, e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        if let Err(e) = ws_sender.send(Message::Close(None)).await {
                            debug!("WebSocket close on channel {}: {:?}", id_out, e);
                        }
                        break;
                    }
                }
            }
            debug!("WebSocket writer stopped for channel {}", id_out);
        });

        // Task: socket -> listeners
        let weak = Arc::downgrade(&channel);
        let id_in = channel.id.clone();
        tokio::spawn(async move {
            while let Some(item) = ws_receiver.next().await {
                let Some(channel) = weak.upgrade() else {
                    break;
                };
                match item {
                    Ok(Message::Close(frame)) => {
                        debug!("WebSocket close received on channel {}: {:?}", id_in, frame);
                        break;
                    }
                    Ok(msg) => channel.dispatch(msg),
                    Err(e) => {
                        warn!("WebSocket receive error on channel {}: {}", id_in, e);
                        let _ = channel.events.emit(&ChannelEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            if let Some(channel) = Weak::upgrade(&weak) {
                // Flushes the close reply (or our own close) before the writer exits
                let _ = channel.outbound_tx.try_send(Outbound::Close);
                channel.mark_closed();
            }
            debug!("WebSocket reader stopped for channel {}", id_in);
        });

        channel
    }

    fn dispatch(&self, msg: Message) {
        let normalized = match normalize(msg) {
            Ok(Some(m)) => m.with_binary_mode(self.binary_mode()),
            Ok(None) => return,
            Err(e) => {
                error!("Protocol violation on channel {}: {}", self.id, e);
                return;
            }
        };
        trace!("channel {} <- {} bytes", self.id, normalized.len());
        if let Err(e) = self.events.emit(&ChannelEvent::Message(normalized)) {
            error!("Protocol violation on channel {}: {}", self.id, e);
        }
    }

    fn mark_closed(&self) {
        let prev = self.state.swap(ReadyState::Closed as u8, Ordering::SeqCst);
        if ReadyState::from_u8(prev) != ReadyState::Closed {
            info!("WebSocket channel {} closed", self.id);
            let _ = self.events.emit(&ChannelEvent::Close);
        }
    }
}

/// Map a WebSocket frame onto the tagged channel payload.
///
/// Control frames yield `None`; anything that is neither text nor binary is a
/// protocol violation.
pub(crate) fn normalize(msg: Message) -> Result<Option<ChannelMessage>, AttachError> {
    match msg {
        Message::Text(text) => Ok(Some(ChannelMessage::Text(text))),
        Message::Binary(data) => Ok(Some(ChannelMessage::binary(data))),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
        Message::Close(_) => Ok(None),
        Message::Frame(_) => Err(AttachError::UnsupportedPayload(
            "raw WebSocket frame".to_string(),
        )),
    }
}

impl TransportChannel for WsChannel {
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
        let frame = match msg {
            ChannelMessage::Text(text) => Message::Text(text),
            ChannelMessage::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.outbound_tx
            .try_send(Outbound::Frame(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ChannelError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
            })
    }

    fn close(&self) {
        let swapped = self.state.compare_exchange(
            ReadyState::Open as u8,
            ReadyState::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if swapped.is_ok() && self.outbound_tx.try_send(Outbound::Close).is_err() {
            warn!("Failed to queue close frame for channel {}", self.id);
        }
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

impl std::fmt::Debug for WsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsChannel")
            .field("id", &self.id)
            .field("state", &self.ready_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::{AttachOptions, AttachState, AttachStrategy, PlainAttach};
    use crate::testing::{wait_until, FakeTerminal};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_normalize_text_and_binary() {
        assert_eq!(
            normalize(Message::Text("hi".into())).unwrap(),
            Some(ChannelMessage::text("hi"))
        );
        assert_eq!(
            normalize(Message::Binary(b"ok\n".to_vec())).unwrap(),
            Some(ChannelMessage::binary(&b"ok\n"[..]))
        );
    }

    #[test]
    fn test_normalize_control_frames_skipped() {
        assert_eq!(normalize(Message::Ping(Vec::new())).unwrap(), None);
        assert_eq!(normalize(Message::Pong(Vec::new())).unwrap(), None);
    }

    #[tokio::test]
    async fn test_plain_attach_over_websocket() {
        crate::init_logging();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // Client forwards terminal input before we start talking
            let first = ws.next().await.unwrap().unwrap();
            assert_eq!(first, Message::Text("ls\r".into()));

            ws.send(Message::Binary(b"ok\n".to_vec())).await.unwrap();
            ws.send(Message::Text("done".into())).await.unwrap();
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let channel = WsChannel::connect(&format!("ws://{}", addr)).await.unwrap();
        assert!(channel.is_open());

        let terminal = FakeTerminal::new();
        let attach = PlainAttach::new(AttachOptions::default());
        attach.attach(terminal.clone(), channel.clone());
        terminal.input("ls\r");

        wait_until(|| attach.state() == AttachState::Detached).await;
        assert_eq!(terminal.writes(), vec!["ok\n".to_string(), "done".to_string()]);
        assert_eq!(channel.ready_state(), ReadyState::Closed);

        // Input after the remote closed goes nowhere
        terminal.input("ignored");
        assert!(matches!(
            channel.send(ChannelMessage::text("x")),
            Err(ChannelError::NotOpen)
        ));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_local_close_emits_close_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let channel = WsChannel::connect(&format!("ws://{}", addr)).await.unwrap();
        let closed = Arc::new(AtomicU8::new(0));
        let closed_clone = closed.clone();
        channel.events().listen(move |ev| {
            if *ev == ChannelEvent::Close {
                closed_clone.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        channel.close();
        assert_eq!(channel.ready_state(), ReadyState::Closing);

        wait_until(|| closed.load(Ordering::SeqCst) == 1).await;
        assert_eq!(channel.ready_state(), ReadyState::Closed);

        server.await.unwrap();
    }
}
