//! Framed attach: terminado JSON-array wire format
//!
//! Inbound:  `["stdout", text]` -> display; any other tag is ignored.
//! Outbound: `["stdin", text]` for input, `["set_size", rows, cols]` on resize.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::{
    send_if_open, AttachOptions, AttachSlot, AttachState, AttachStrategy, Binding, DetachReason,
    Display,
};
use crate::channel::{ChannelEvent, ChannelMessage, TransportChannel};
use crate::error::AttachError;
use crate::terminal::{TerminalEvent, TerminalSize, TerminalSurface};

const TAG_STDOUT: &str = "stdout";
const TAG_STDIN: &str = "stdin";
const TAG_SET_SIZE: &str = "set_size";

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Stdout(String),
    /// Any tag we don't act on (kept for forward compatibility)
    Other(Value),
}

/// Parse one inbound message.
///
/// Malformed JSON is an error; a well-formed frame with an unknown tag or
/// shape is not.
pub fn parse_frame(text: &str) -> Result<InboundFrame, AttachError> {
    let value: Value = serde_json::from_str(text)?;
    if let Value::Array(items) = &value {
        if let [Value::String(tag), Value::String(data)] = items.as_slice() {
            if tag == TAG_STDOUT {
                return Ok(InboundFrame::Stdout(data.clone()));
            }
        }
    }
    Ok(InboundFrame::Other(value))
}

pub fn stdin_frame(data: &str) -> String {
    serde_json::json!([TAG_STDIN, data]).to_string()
}

pub fn set_size_frame(size: TerminalSize) -> String {
    serde_json::json!([TAG_SET_SIZE, size.rows, size.cols]).to_string()
}

/// terminado-compatible bridge.
pub struct FramedAttach {
    options: AttachOptions,
    slot: AttachSlot,
}

impl FramedAttach {
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

impl AttachStrategy for FramedAttach {
    fn attach(&self, terminal: Arc<dyn TerminalSurface>, channel: Arc<dyn TransportChannel>) {
        self.slot.clear_for_replace();

        let binding = Binding::new(terminal.clone(), channel.clone());
        let display = Display::new(&terminal, &self.options);
        let message_id = channel.events().listen(move |event| {
            let ChannelEvent::Message(msg) = event else {
                return Ok(());
            };
            let frame = match msg {
                ChannelMessage::Text(text) => parse_frame(text)?,
                // Each frame is a complete JSON document; nothing carries over
                ChannelMessage::Binary(bytes) => parse_frame(&String::from_utf8_lossy(bytes))?,
            };
            match frame {
                InboundFrame::Stdout(data) => display.show(&data),
                InboundFrame::Other(value) => trace!("ignoring frame {}", value),
            }
            Ok(())
        });
        binding.track_channel(message_id);

        let channel_weak = Arc::downgrade(&channel);
        let bidirectional = self.options.bidirectional;
        let terminal_id = terminal.events().listen(move |event| {
            match event {
                TerminalEvent::Data(data) if bidirectional => {
                    send_if_open(&channel_weak, ChannelMessage::Text(stdin_frame(data)));
                }
                TerminalEvent::Resize(size) => {
                    send_if_open(&channel_weak, ChannelMessage::Text(set_size_frame(*size)));
                }
                _ => {}
            }
            Ok(())
        });
        binding.track_terminal(terminal_id);

        binding.watch_channel_lifecycle();

        debug!(
            "Framed attach {} to channel {} (bidirectional={}, buffered={})",
            binding.id(),
            channel.id(),
            self.options.bidirectional,
            self.options.buffered
        );
        self.slot.install(binding);
    }

    fn detach(&self, channel: Option<&Arc<dyn TransportChannel>>) {
        self.slot.detach(channel);
    }

    fn state(&self) -> AttachState {
        self.slot.state()
    }

    fn name(&self) -> &'static str {
        "framed"
    }
}
