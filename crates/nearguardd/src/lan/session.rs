//! Unicast frame receiver for invitations, replies, payloads and teardown.

use std::sync::Arc;

use tokio::sync::broadcast;

use nearguard_core::wire::{Frame, MAX_FRAME_BYTES};

use super::LanTransport;

/// Receive frames on the session socket until shutdown.
pub async fn frame_loop(lan: Arc<LanTransport>, mut shutdown: broadcast::Receiver<()>) {
    let socket = lan.socket.clone();
    let mut buf = vec![0u8; MAX_FRAME_BYTES];

    loop {
        let (len, src) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("session receiver shutting down");
                return;
            }
            r = socket.recv_from(&mut buf) => match r {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "session recv_from failed");
                    continue;
                }
            },
        };

        match Frame::decode(&buf[..len]) {
            Ok(frame) => {
                tracing::trace!(src = %src, bytes = len, "frame received");
                lan.handle_frame(frame, src);
            }
            Err(e) => tracing::debug!(src = %src, error = %e, "malformed frame dropped"),
        }
    }
}
