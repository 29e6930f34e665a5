//! Attach configuration
//!
//! Loaded from JSON (camelCase keys, every field optional):
//!
//! ```json
//! {
//!   "mode": "framed",
//!   "bidirectional": true,
//!   "buffered": true,
//!   "flushDelayMs": 10,
//!   "zmodem": { "noTerminalWriteOutsideSession": true },
//!   "winptyCompat": "auto"
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::attach::{AttachOptions, AttachStrategy, FramedAttach, PlainAttach, DEFAULT_FLUSH_DELAY};
use crate::compat::HostPlatform;
use crate::zmodem::{ZmodemOptions, ZmodemParser, ZmodemSentry};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire convention used on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    #[default]
    Plain,
    Framed,
}

/// When to install the winpty soft-wrap shim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatMode {
    /// Only when the host platform is Windows
    #[default]
    Auto,
    Always,
    Never,
}

impl CompatMode {
    pub fn enabled_for(self, host: HostPlatform) -> bool {
        match self {
            CompatMode::Auto => host == HostPlatform::Windows,
            CompatMode::Always => true,
            CompatMode::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachConfig {
    pub mode: AttachMode,
    pub bidirectional: bool,
    pub buffered: bool,
    pub flush_delay_ms: u64,
    pub zmodem: ZmodemOptions,
    pub winpty_compat: CompatMode,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            mode: AttachMode::default(),
            bidirectional: true,
            buffered: false,
            flush_delay_ms: DEFAULT_FLUSH_DELAY.as_millis() as u64,
            zmodem: ZmodemOptions::default(),
            winpty_compat: CompatMode::default(),
        }
    }
}

impl AttachConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&content)
    }

    pub fn attach_options(&self) -> AttachOptions {
        AttachOptions {
            bidirectional: self.bidirectional,
            buffered: self.buffered,
            flush_delay: Duration::from_millis(self.flush_delay_ms),
        }
    }

    /// Build the configured strategy (unattached)
    pub fn build_strategy(&self) -> Box<dyn AttachStrategy> {
        let options = self.attach_options();
        match self.mode {
            AttachMode::Plain => Box::new(PlainAttach::new(options)),
            AttachMode::Framed => Box::new(FramedAttach::new(options)),
        }
    }

    /// Build a zmodem sentry around `parser` using the `zmodem` section.
    pub fn zmodem_sentry(&self, parser: Box<dyn ZmodemParser>) -> Arc<ZmodemSentry> {
        Arc::new(ZmodemSentry::new(self.zmodem, parser))
    }
}
