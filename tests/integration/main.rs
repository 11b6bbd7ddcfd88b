//! Nearguard integration test harness.
//!
//! Every scenario runs whole coordinators, each on its own task, joined to
//! one in-memory hub. Nothing touches the network. Store-backed scenarios use
//! a scratch directory under the system temp dir and remove it when done.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use nearguard_core::{Endpoint, EndpointId};
use nearguard_services::{
    CoordinatorEvent, CoordinatorHandle, CoordinatorSettings, CoordinatorTask, LearningPipeline,
    MemoryHub, SessionCoordinator,
};

mod discovery;
mod learning;
mod messaging;
mod sessions;

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn endpoint(n: u8) -> Endpoint {
    Endpoint::new(EndpointId([n; 16]), format!("device-{n}"))
}

/// One device: a coordinator task plus a subscription to its events.
pub struct Node {
    pub endpoint: Endpoint,
    pub handle: CoordinatorHandle,
    pub events: broadcast::Receiver<CoordinatorEvent>,
    shutdown: broadcast::Sender<()>,
}

impl Node {
    pub fn spawn(hub: &MemoryHub, n: u8, settings: CoordinatorSettings) -> Self {
        Self::spawn_with(hub, n, settings, None)
    }

    pub fn spawn_with(
        hub: &MemoryHub,
        n: u8,
        settings: CoordinatorSettings,
        learning: Option<LearningPipeline>,
    ) -> Self {
        let (transport, transport_rx) = hub.join(endpoint(n));
        let coordinator = SessionCoordinator::new(Arc::new(transport), settings, learning);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (task, handle) = CoordinatorTask::new(coordinator, transport_rx, shutdown_rx);
        let events = handle.subscribe();
        task.spawn();
        Self {
            endpoint: endpoint(n),
            handle,
            events,
            shutdown,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.endpoint.id
    }

    /// Skip events until one matches.
    pub async fn wait_for(&mut self, pred: impl Fn(&CoordinatorEvent) -> bool) -> CoordinatorEvent {
        loop {
            match self.events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(e) => panic!("{} event stream ended: {e}", self.endpoint),
            }
        }
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Connect `from` to `to` through a full invite/accept round.
pub async fn connect(from: &mut Node, to: &mut Node) {
    if !from.handle.status().await.unwrap().browsing {
        from.handle.start_browsing().await.unwrap();
    }
    if !to.handle.status().await.unwrap().advertising {
        to.handle.start_advertising().await.unwrap();
    }
    let target = to.endpoint.clone();
    from.wait_for(|e| matches!(e, CoordinatorEvent::PeerFound { peer } if *peer == target))
        .await;

    from.handle.select(to.id()).await.unwrap();
    to.wait_for(|e| matches!(e, CoordinatorEvent::PermissionRequested { .. }))
        .await;
    assert_eq!(to.handle.respond(true).await, Ok(from.endpoint.clone()));

    let target = to.endpoint.clone();
    from.wait_for(|e| matches!(e, CoordinatorEvent::Joined { peer } if *peer == target))
        .await;
    let source = from.endpoint.clone();
    to.wait_for(|e| matches!(e, CoordinatorEvent::Joined { peer } if *peer == source))
        .await;
}

/// Scratch directory for one test, removed on drop.
pub struct TempDir(pub PathBuf);

impl TempDir {
    pub fn new(tag: &str) -> Self {
        let path =
            std::env::temp_dir().join(format!("nearguard-it-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        Self(path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
