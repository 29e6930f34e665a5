//! Attach strategies
//!
//! An attach strategy binds one terminal surface to one transport channel
//! under a wire convention:
//! - [`PlainAttach`]: raw bytes / text, no framing
//! - [`FramedAttach`]: terminado-style JSON arrays
//!
//! Lifecycle is `Detached -> Attached -> Detached`. Attaching while attached
//! fully detaches the previous binding first, because [`EventHub`] does not
//! deduplicate listeners. A channel `Close`/`Error` detaches automatically.
//!
//! [`EventHub`]: crate::event::EventHub

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::channel::{same_channel, ChannelEvent, ChannelMessage, TransportChannel};
use crate::event::ListenerId;
use crate::terminal::TerminalSurface;

pub mod buffer;
pub mod decode;
pub mod framed;
pub mod plain;

pub use buffer::{OutputBuffer, DEFAULT_FLUSH_DELAY};
pub use decode::Utf8Decoder;
pub use framed::FramedAttach;
pub use plain::PlainAttach;

/// Attachment state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    Attached,
}

/// Why a binding ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachReason {
    /// `detach()` was called
    Explicit,
    /// A new `attach()` replaced this binding
    Replaced,
    /// The channel reported close
    ChannelClosed,
    /// The channel reported an error
    ChannelError(String),
}

impl DetachReason {
    pub fn description(&self) -> String {
        match self {
            DetachReason::Explicit => "Detached by caller".to_string(),
            DetachReason::Replaced => "Replaced by a new attachment".to_string(),
            DetachReason::ChannelClosed => "Channel closed".to_string(),
            DetachReason::ChannelError(e) => format!("Channel error: {}", e),
        }
    }
}

/// Options shared by the plain and framed strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOptions {
    /// Forward terminal input to the channel
    pub bidirectional: bool,
    /// Coalesce output into one write per flush window
    pub buffered: bool,
    pub flush_delay: Duration,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            bidirectional: true,
            buffered: false,
            flush_delay: DEFAULT_FLUSH_DELAY,
        }
    }
}

impl AttachOptions {
    pub fn output_only() -> Self {
        Self {
            bidirectional: false,
            ..Self::default()
        }
    }

    pub fn buffered() -> Self {
        Self {
            buffered: true,
            ..Self::default()
        }
    }
}

/// A policy binding a terminal surface to a transport channel.
pub trait AttachStrategy: Send + Sync {
    /// Bind `terminal` to `channel`, replacing any existing binding.
    fn attach(&self, terminal: Arc<dyn TerminalSurface>, channel: Arc<dyn TransportChannel>);

    /// Remove the binding. `channel` defaults to the bound one; naming a
    /// different channel is a no-op. Safe to call when not attached.
    fn detach(&self, channel: Option<&Arc<dyn TransportChannel>>);

    fn state(&self) -> AttachState;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

impl<S: AttachStrategy + ?Sized> AttachStrategy for Arc<S> {
    fn attach(&self, terminal: Arc<dyn TerminalSurface>, channel: Arc<dyn TransportChannel>) {
        (**self).attach(terminal, channel)
    }

    fn detach(&self, channel: Option<&Arc<dyn TransportChannel>>) {
        (**self).detach(channel)
    }

    fn state(&self) -> AttachState {
        (**self).state()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ============================================================================
// Binding
// ============================================================================

/// One terminal <-> channel association and the listeners it registered.
pub(crate) struct Binding {
    id: Uuid,
    terminal: Arc<dyn TerminalSurface>,
    channel: Arc<dyn TransportChannel>,
    terminal_listeners: Mutex<Vec<ListenerId>>,
    channel_listeners: Mutex<Vec<ListenerId>>,
    detached: AtomicBool,
    reason: Mutex<Option<DetachReason>>,
    on_detach: Mutex<Option<DetachHook>>,
}

type DetachHook = Box<dyn FnOnce() + Send>;

impl Binding {
    pub(crate) fn new(
        terminal: Arc<dyn TerminalSurface>,
        channel: Arc<dyn TransportChannel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            terminal,
            channel,
            terminal_listeners: Mutex::new(Vec::new()),
            channel_listeners: Mutex::new(Vec::new()),
            detached: AtomicBool::new(false),
            reason: Mutex::new(None),
            on_detach: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn channel(&self) -> &Arc<dyn TransportChannel> {
        &self.channel
    }

    pub(crate) fn track_terminal(&self, id: ListenerId) {
        self.terminal_listeners.lock().push(id);
    }

    pub(crate) fn track_channel(&self, id: ListenerId) {
        self.channel_listeners.lock().push(id);
    }

    /// Run `hook` once when this binding detaches, whatever the cause.
    pub(crate) fn on_detach<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.on_detach.lock() = Some(Box::new(hook));
    }

    /// Register the close/error listener that detaches this binding.
    pub(crate) fn watch_channel_lifecycle(self: &Arc<Self>) {
        let weak: Weak<Binding> = Arc::downgrade(self);
        let id = self.channel.events().listen(move |event| {
            let reason = match event {
                ChannelEvent::Close => DetachReason::ChannelClosed,
                ChannelEvent::Error(e) => DetachReason::ChannelError(e.clone()),
                ChannelEvent::Message(_) => return Ok(()),
            };
            if let Some(binding) = weak.upgrade() {
                binding.detach(reason);
            }
            Ok(())
        });
        self.track_channel(id);
    }

    /// Remove every listener this binding registered. Idempotent.
    pub(crate) fn detach(&self, reason: DetachReason) -> bool {
        if self.detached.swap(true, Ordering::SeqCst) {
            return false;
        }

        for id in self.terminal_listeners.lock().drain(..) {
            self.terminal.events().unlisten(id);
        }
        for id in self.channel_listeners.lock().drain(..) {
            self.channel.events().unlisten(id);
        }

        debug!(
            "Binding {} detached from channel {}: {}",
            self.id,
            self.channel.id(),
            reason.description()
        );
        *self.reason.lock() = Some(reason);

        let hook = self.on_detach.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    pub(crate) fn is_attached(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }

    pub(crate) fn reason(&self) -> Option<DetachReason> {
        self.reason.lock().clone()
    }
}

/// Holder for a strategy's current binding.
#[derive(Default)]
pub(crate) struct AttachSlot {
    current: Mutex<Option<Arc<Binding>>>,
}

impl AttachSlot {
    /// Detach whatever is bound (reason `Replaced`) and clear the slot.
    pub(crate) fn clear_for_replace(&self) {
        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            previous.detach(DetachReason::Replaced);
        }
    }

    pub(crate) fn install(&self, binding: Arc<Binding>) {
        *self.current.lock() = Some(binding);
    }

    pub(crate) fn detach(&self, channel: Option<&Arc<dyn TransportChannel>>) {
        let binding = self.current.lock().clone();
        let Some(binding) = binding else {
            return;
        };
        if let Some(channel) = channel {
            if !same_channel(channel, binding.channel()) {
                debug!(
                    "Ignoring detach for channel {}: bound to {}",
                    channel.id(),
                    binding.channel().id()
                );
                return;
            }
        }
        binding.detach(DetachReason::Explicit);
    }

    pub(crate) fn state(&self) -> AttachState {
        match self.current.lock().as_ref() {
            Some(b) if b.is_attached() => AttachState::Attached,
            _ => AttachState::Detached,
        }
    }

    pub(crate) fn last_detach_reason(&self) -> Option<DetachReason> {
        self.current.lock().as_ref().and_then(|b| b.reason())
    }
}

// ============================================================================
// Display / send helpers shared by the strategies
// ============================================================================

/// The "display" step: immediate write or buffered write.
pub(crate) struct Display {
    terminal: Weak<dyn TerminalSurface>,
    buffer: Option<Arc<OutputBuffer>>,
}

impl Display {
    pub(crate) fn new(terminal: &Arc<dyn TerminalSurface>, options: &AttachOptions) -> Self {
        Self {
            terminal: Arc::downgrade(terminal),
            buffer: options
                .buffered
                .then(|| OutputBuffer::new(options.flush_delay)),
        }
    }

    pub(crate) fn show(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &self.buffer {
            Some(buffer) => buffer.push(text, self.terminal.clone()),
            None => {
                if let Some(terminal) = self.terminal.upgrade() {
                    terminal.write(text);
                }
            }
        }
    }
}

/// Send if the channel is open; otherwise drop silently (never queued).
pub(crate) fn send_if_open(channel: &Weak<dyn TransportChannel>, msg: ChannelMessage) {
    let Some(channel) = channel.upgrade() else {
        return;
    };
    if !channel.is_open() {
        trace!("channel {} not open, dropping {} bytes", channel.id(), msg.len());
        return;
    }
    if let Err(e) = channel.send(msg) {
        trace!("send on channel {} failed: {}", channel.id(), e);
    }
}
