//! Plain attach: raw bytes or text, no framing

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    send_if_open, AttachOptions, AttachSlot, AttachState, AttachStrategy, Binding, DetachReason,
    Display, Utf8Decoder,
};
use crate::channel::{ChannelEvent, ChannelMessage, TransportChannel};
use crate::terminal::{TerminalEvent, TerminalSurface};

/// Direct byte bridge between a terminal and a channel.
///
/// Inbound text is displayed as-is, inbound binary is UTF-8 decoded first.
/// Terminal input is forwarded verbatim while the channel is open.
pub struct PlainAttach {
    options: AttachOptions,
    slot: AttachSlot,
}

impl PlainAttach {
    pub fn new(options: AttachOptions) -> Self {
        Self {
            options,
            slot: AttachSlot::default(),
        }
    }

    pub fn options(&self) -> &AttachOptions {
        &self.options
    }

    pub fn last_detach_reason(&self) -> Option<DetachReason> {
        self.slot.last_detach_reason()
    }
}

impl AttachStrategy for PlainAttach {
    fn attach(&self, terminal: Arc<dyn TerminalSurface>, channel: Arc<dyn TransportChannel>) {
        self.slot.clear_for_replace();

        let binding = Binding::new(terminal.clone(), channel.clone());
        let display = Display::new(&terminal, &self.options);
        let decoder = Mutex::new(Utf8Decoder::new());

        let message_id = channel.events().listen(move |event| {
            let ChannelEvent::Message(msg) = event else {
                return Ok(());
            };
            match msg {
                ChannelMessage::Text(text) => display.show(text),
                ChannelMessage::Binary(bytes) => {
                    let text = decoder.lock().decode(bytes);
                    display.show(&text);
                }
            }
            Ok(())
        });
        binding.track_channel(message_id);

        if self.options.bidirectional {
            let channel_weak = Arc::downgrade(&channel);
            let input_id = terminal.events().listen(move |event| {
                if let TerminalEvent::Data(data) = event {
                    send_if_open(&channel_weak, ChannelMessage::Text(data.clone()));
                }
                Ok(())
            });
            binding.track_terminal(input_id);
        }

        binding.watch_channel_lifecycle();

        debug!(
            "Plain attach {} to channel {} (bidirectional={}, buffered={})",
            binding.id(),
            channel.id(),
            self.options.bidirectional,
            self.options.buffered
        );
        self.slot.install(binding);
    }

    fn detach(&self, channel: Option<&Arc<dyn TransportChannel>>) {
        trace!("plain detach requested");
        self.slot.detach(channel);
    }

    fn state(&self) -> AttachState {
        self.slot.state()
    }

    fn name(&self) -> &'static str {
        "plain"
    }
}
