//! Terminal session: a terminal surface composed with its attach strategy
//!
//! The surface never gets methods bolted onto it; it is paired with a strategy
//! object here and every attach/detach goes through that pairing.

use std::sync::Arc;

use tracing::debug;

use crate::attach::{AttachState, AttachStrategy};
use crate::channel::TransportChannel;
use crate::compat::{HostPlatform, WinptyCompat};
use crate::config::AttachConfig;
use crate::terminal::{LineBuffer, TerminalSurface};
use crate::zmodem::{ZmodemParser, ZmodemSentry};

pub struct TerminalSession {
    surface: Arc<dyn TerminalSurface>,
    strategy: Box<dyn AttachStrategy>,
    compat: Option<WinptyCompat>,
}

impl TerminalSession {
    pub fn new(surface: Arc<dyn TerminalSurface>, strategy: Box<dyn AttachStrategy>) -> Self {
        Self {
            surface,
            strategy,
            compat: None,
        }
    }

    /// Build the configured strategy and, if the config asks for it on this
    /// host, install the winpty wrap fix.
    pub fn from_config<T>(surface: Arc<T>, config: &AttachConfig, host: HostPlatform) -> Self
    where
        T: TerminalSurface + LineBuffer + 'static,
    {
        let compat = config
            .winpty_compat
            .enabled_for(host)
            .then(|| WinptyCompat::install(&surface));
        let surface: Arc<dyn TerminalSurface> = surface;
        Self {
            surface,
            strategy: config.build_strategy(),
            compat,
        }
    }

    /// Swap the strategy. The current one is detached first.
    pub fn bind(&mut self, strategy: Box<dyn AttachStrategy>) {
        self.strategy.detach(None);
        debug!(
            "Rebinding terminal session: {} -> {}",
            self.strategy.name(),
            strategy.name()
        );
        self.strategy = strategy;
    }

    /// Bind a zmodem sentry built from `config.zmodem` around `parser`.
    ///
    /// The returned handle drives the transfer side (confirm, events, raw
    /// sends); the session still owns attach/detach.
    pub fn bind_zmodem(
        &mut self,
        config: &AttachConfig,
        parser: Box<dyn ZmodemParser>,
    ) -> Arc<ZmodemSentry> {
        let sentry = config.zmodem_sentry(parser);
        self.bind(Box::new(sentry.clone()));
        sentry
    }

    pub fn attach(&self, channel: Arc<dyn TransportChannel>) {
        self.strategy.attach(self.surface.clone(), channel);
    }

    pub fn detach(&self) {
        self.strategy.detach(None);
    }

    pub fn state(&self) -> AttachState {
        self.strategy.state()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn has_winpty_compat(&self) -> bool {
        self.compat.is_some()
    }

    pub fn surface(&self) -> &Arc<dyn TerminalSurface> {
        &self.surface
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.strategy.detach(None);
    }
}
