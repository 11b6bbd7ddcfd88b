use crate::*;

use nearguard_services::{CoordinatorEvent, CoordinatorSettings, MemoryHub};

fn directory_ids(status: &nearguard_services::StatusSnapshot) -> Vec<EndpointId> {
    status.directory.iter().map(|p| p.endpoint.id).collect()
}

/// Found X, found Y, lost X leaves only Y in the directory.
#[tokio::test]
async fn test_lost_peer_leaves_directory() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let x = Node::spawn(&hub, 2, CoordinatorSettings::default());
    let y = Node::spawn(&hub, 3, CoordinatorSettings::default());

    a.handle.start_browsing().await.unwrap();
    x.handle.start_advertising().await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerFound { peer } if peer.id == x.id()))
        .await;
    y.handle.start_advertising().await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerFound { peer } if peer.id == y.id()))
        .await;

    x.handle.stop_advertising().await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerLost { peer } if peer.id == x.id()))
        .await;

    let status = a.handle.status().await.unwrap();
    assert_eq!(directory_ids(&status), vec![y.id()]);
}

/// Restarting browsing starts from an empty directory and refills it with
/// whoever is still advertising.
#[tokio::test]
async fn test_browse_restart_rebuilds_directory() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let x = Node::spawn(&hub, 2, CoordinatorSettings::default());
    let y = Node::spawn(&hub, 3, CoordinatorSettings::default());

    x.handle.start_advertising().await.unwrap();
    y.handle.start_advertising().await.unwrap();
    a.handle.start_browsing().await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerFound { peer } if peer.id == y.id()))
        .await;

    a.handle.stop_browsing().await.unwrap();
    x.handle.stop_advertising().await.unwrap();
    // Stopping twice is harmless.
    a.handle.stop_browsing().await.unwrap();

    a.handle.start_browsing().await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerFound { peer } if peer.id == y.id()))
        .await;

    let status = a.handle.status().await.unwrap();
    assert!(status.browsing);
    assert_eq!(directory_ids(&status), vec![y.id()]);
}

/// A device that walks away disappears from the directory.
#[tokio::test]
async fn test_vanished_peer_is_lost() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let x = Node::spawn(&hub, 2, CoordinatorSettings::default());

    x.handle.start_advertising().await.unwrap();
    a.handle.start_browsing().await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerFound { .. }))
        .await;

    hub.vanish(&x.id());
    a.wait_for(|e| matches!(e, CoordinatorEvent::PeerLost { peer } if peer.id == x.id()))
        .await;
    assert!(a.handle.status().await.unwrap().directory.is_empty());
}
