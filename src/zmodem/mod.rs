//! Zmodem session sentry
//!
//! Sits between a channel and a terminal and multiplexes the byte stream
//! between normal display and an embedded zmodem transfer:
//! - text messages go to the terminal, gated by [`ZmodemSentry::should_write`]
//! - binary messages always go to the injected [`ZmodemParser`], which decides
//!   what is handshake and what is plain output
//! - parser notifications (detect / retract / complete) are re-emitted to
//!   observers through [`ZmodemSentry::events`]
//!
//! The zmodem wire protocol itself (header parsing, transfer engine) is the
//! parser's business, not this module's.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::attach::{AttachSlot, AttachState, AttachStrategy, Binding, DetachReason, Utf8Decoder};
use crate::channel::{BinaryMode, ChannelEvent, ChannelMessage, TransportChannel};
use crate::error::{AttachError, ChannelError};
use crate::event::EventHub;
use crate::terminal::TerminalSurface;

/// Which way the detected transfer goes, from the terminal user's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Remote ran `rz`: we send files
    Upload,
    /// Remote ran `sz`: we receive files
    Download,
}

/// Descriptor of a detected (not yet accepted) transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub id: Uuid,
    pub direction: TransferDirection,
}

impl Detection {
    pub fn new(direction: TransferDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
        }
    }
}

/// What the parser wants done with a consumed chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentryOutput {
    /// Ordinary terminal output
    ToTerminal(Bytes),
    /// A transfer handshake was seen
    Detect(Detection),
    /// The pending or active session went away
    Retract,
    /// The confirmed session finished
    Complete,
    /// Raw bytes for the remote side
    Send(Bytes),
}

/// Injected zmodem implementation.
pub trait ZmodemParser: Send {
    fn consume(&mut self, octets: &[u8]) -> Result<Vec<SentryOutput>, AttachError>;
}

/// Notifications for whoever drives the transfer UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZmodemEvent {
    Detected(Detection),
    Retracted,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZmodemOptions {
    /// Suppress terminal output unless a session is confirmed
    pub no_terminal_write_outside_session: bool,
}

/// Writes raw bytes straight to the channel, bypassing any stdin framing.
#[derive(Clone)]
pub struct RawSender {
    channel: Weak<dyn TransportChannel>,
}

impl RawSender {
    pub fn send(&self, octets: &[u8]) -> Result<(), ChannelError> {
        let channel = self.channel.upgrade().ok_or(ChannelError::Closed)?;
        channel.send(ChannelMessage::Binary(Bytes::copy_from_slice(octets)))
    }
}

struct SentryState {
    terminal: Mutex<Option<Weak<dyn TerminalSurface>>>,
    options: ZmodemOptions,
    confirmed: AtomicBool,
    pending: Mutex<Option<Detection>>,
    parser: Mutex<Box<dyn ZmodemParser>>,
    decoder: Mutex<Utf8Decoder>,
    events: EventHub<ZmodemEvent>,
}

impl SentryState {
    fn should_write(&self) -> bool {
        self.confirmed.load(Ordering::SeqCst) || !self.options.no_terminal_write_outside_session
    }

    fn write_gated(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.should_write() {
            trace!("suppressing {} bytes outside zmodem session", text.len());
            return;
        }
        let terminal = self.terminal.lock().as_ref().and_then(Weak::upgrade);
        if let Some(terminal) = terminal {
            terminal.write(text);
        }
    }

    /// Forget any pending or confirmed session. Runs on every detach, so a
    /// session never outlives the channel it was negotiated on.
    fn reset(&self) {
        let had_pending = self.pending.lock().take().is_some();
        let was_confirmed = self.confirmed.swap(false, Ordering::SeqCst);
        *self.decoder.lock() = Utf8Decoder::new();
        if had_pending || was_confirmed {
            info!("Zmodem session dropped with its channel");
            if let Err(e) = self.events.emit(&ZmodemEvent::Retracted) {
                warn!("Zmodem retract observer failed: {}", e);
            }
        }
    }

    fn on_message(&self, msg: &ChannelMessage, channel: &Weak<dyn TransportChannel>) -> Result<(), AttachError> {
        match msg {
            ChannelMessage::Text(text) => {
                self.write_gated(text);
                Ok(())
            }
            ChannelMessage::Binary(octets) => {
                // Parser lock is released before acting on its outputs, so
                // observers may call confirm() from inside a notification.
                let outputs = self.parser.lock().consume(octets)?;
                for output in outputs {
                    self.apply(output, channel)?;
                }
                Ok(())
            }
        }
    }

    fn apply(&self, output: SentryOutput, channel: &Weak<dyn TransportChannel>) -> Result<(), AttachError> {
        match output {
            SentryOutput::ToTerminal(octets) => {
                let text = self.decoder.lock().decode(&octets);
                self.write_gated(&text);
            }
            SentryOutput::Detect(detection) => {
                info!(
                    "Zmodem transfer detected: {} ({:?})",
                    detection.id, detection.direction
                );
                *self.pending.lock() = Some(detection.clone());
                self.events.emit(&ZmodemEvent::Detected(detection))?;
            }
            SentryOutput::Retract => {
                info!("Zmodem session retracted");
                self.pending.lock().take();
                self.confirmed.store(false, Ordering::SeqCst);
                self.events.emit(&ZmodemEvent::Retracted)?;
            }
            SentryOutput::Complete => {
                info!("Zmodem session completed");
                self.pending.lock().take();
                self.confirmed.store(false, Ordering::SeqCst);
                self.events.emit(&ZmodemEvent::Completed)?;
            }
            SentryOutput::Send(octets) => {
                let sender = RawSender {
                    channel: channel.clone(),
                };
                sender.send(&octets)?;
            }
        }
        Ok(())
    }
}

/// Protocol-detecting intermediary between a terminal and its channel.
///
/// Implements [`AttachStrategy`], so it binds like the plain and framed
/// strategies (including through `TerminalSession::bind`).
pub struct ZmodemSentry {
    state: Arc<SentryState>,
    slot: AttachSlot,
    channel: Mutex<Option<Weak<dyn TransportChannel>>>,
}

impl ZmodemSentry {
    pub fn new(options: ZmodemOptions, parser: Box<dyn ZmodemParser>) -> Self {
        Self {
            state: Arc::new(SentryState {
                terminal: Mutex::new(None),
                options,
                confirmed: AtomicBool::new(false),
                pending: Mutex::new(None),
                parser: Mutex::new(parser),
                decoder: Mutex::new(Utf8Decoder::new()),
                events: EventHub::new(),
            }),
            slot: AttachSlot::default(),
            channel: Mutex::new(None),
        }
    }

    pub fn options(&self) -> ZmodemOptions {
        self.state.options
    }

    pub fn last_detach_reason(&self) -> Option<DetachReason> {
        self.slot.last_detach_reason()
    }

    /// Accept a detected transfer; the session then claims the channel.
    pub fn confirm(&self, detection: &Detection) -> Result<(), AttachError> {
        let mut pending = self.state.pending.lock();
        match pending.as_ref() {
            Some(p) if p.id == detection.id => {
                pending.take();
                self.state.confirmed.store(true, Ordering::SeqCst);
                info!("Zmodem session {} confirmed", detection.id);
                Ok(())
            }
            _ => {
                warn!("Zmodem detection {} is not pending", detection.id);
                Err(AttachError::StaleDetection(detection.id))
            }
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state.confirmed.load(Ordering::SeqCst)
    }

    pub fn pending_detection(&self) -> Option<Detection> {
        self.state.pending.lock().clone()
    }

    pub fn should_write(&self) -> bool {
        self.state.should_write()
    }

    /// Sender for the transfer engine's own traffic, while attached.
    pub fn raw_sender(&self) -> Option<RawSender> {
        if self.slot.state() != AttachState::Attached {
            return None;
        }
        self.channel
            .lock()
            .as_ref()
            .map(|channel| RawSender {
                channel: channel.clone(),
            })
    }

    pub fn events(&self) -> &EventHub<ZmodemEvent> {
        &self.state.events
    }
}

impl AttachStrategy for ZmodemSentry {
    /// Start routing `channel` through the sentry.
    ///
    /// The channel is switched to raw binary mode before the listener is
    /// registered so the parser always sees bytes. Session state starts clean.
    fn attach(&self, terminal: Arc<dyn TerminalSurface>, channel: Arc<dyn TransportChannel>) {
        self.slot.clear_for_replace();
        self.state.reset();
        *self.state.terminal.lock() = Some(Arc::downgrade(&terminal));

        channel.set_binary_mode(BinaryMode::Raw);

        let binding = Binding::new(terminal, channel.clone());
        let state = Arc::downgrade(&self.state);
        let channel_weak = Arc::downgrade(&channel);
        let listener_channel = channel_weak.clone();
        let message_id = channel.events().listen(move |event| {
            let ChannelEvent::Message(msg) = event else {
                return Ok(());
            };
            match state.upgrade() {
                Some(state) => state.on_message(msg, &listener_channel),
                None => Ok(()),
            }
        });
        binding.track_channel(message_id);

        let state = Arc::downgrade(&self.state);
        binding.on_detach(move || {
            if let Some(state) = state.upgrade() {
                state.reset();
            }
        });
        binding.watch_channel_lifecycle();

        debug!("Zmodem sentry {} attached to channel {}", binding.id(), channel.id());
        *self.channel.lock() = Some(channel_weak);
        self.slot.install(binding);
    }

    fn detach(&self, channel: Option<&Arc<dyn TransportChannel>>) {
        self.slot.detach(channel);
    }

    fn state(&self) -> AttachState {
        self.slot.state()
    }

    fn name(&self) -> &'static str {
        "zmodem"
    }
}
