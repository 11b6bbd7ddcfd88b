//! Discovery service: advertising and browsing switches over the transport.
//!
//! Starting a side twice is an error rather than a second subscription.
//! Stopping a side that never started is a no-op. Sightings are only
//! accepted while browsing, so nothing reaches the directory after stop.

use crate::error::TransportError;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("{0} already running")]
    AlreadyRunning(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Default)]
pub struct Discovery {
    advertising: bool,
    browsing: bool,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_advertising(&mut self, transport: &dyn Transport) -> Result<(), DiscoveryError> {
        if self.advertising {
            return Err(DiscoveryError::AlreadyRunning("advertising"));
        }
        transport.start_advertising()?;
        self.advertising = true;
        tracing::info!(local = %transport.local(), "advertising started");
        Ok(())
    }

    pub fn stop_advertising(&mut self, transport: &dyn Transport) {
        if !self.advertising {
            return;
        }
        transport.stop_advertising();
        self.advertising = false;
        tracing::info!("advertising stopped");
    }

    /// Start browsing. The caller clears its directory first; a restart is
    /// the only way to refresh the view.
    pub fn start_browsing(&mut self, transport: &dyn Transport) -> Result<(), DiscoveryError> {
        if self.browsing {
            return Err(DiscoveryError::AlreadyRunning("browsing"));
        }
        transport.start_browsing()?;
        self.browsing = true;
        tracing::info!("browsing started");
        Ok(())
    }

    pub fn stop_browsing(&mut self, transport: &dyn Transport) {
        if !self.browsing {
            return;
        }
        transport.stop_browsing();
        self.browsing = false;
        tracing::info!("browsing stopped");
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Whether sightings should reach the directory.
    pub fn is_browsing(&self) -> bool {
        self.browsing
    }
}
