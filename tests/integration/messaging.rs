use std::time::Duration;

use crate::*;

use nearguard_core::config::SendMode;
use nearguard_services::{
    CoordinatorError, CoordinatorEvent, CoordinatorSettings, MemoryHub, SendFailure,
};

#[tokio::test]
async fn test_send_without_sessions_fails() {
    let hub = MemoryHub::new();
    let a = Node::spawn(&hub, 1, CoordinatorSettings::default());

    assert_eq!(
        a.handle.send("hello").await,
        Err(CoordinatorError::SendFailed(SendFailure::NoConnectedPeers))
    );
    assert!(a.handle.messages(0).await.unwrap().is_empty());
}

/// Messages from one sender land in the order they were sent, and the
/// sender's stream carries its own echoes.
#[tokio::test]
async fn test_messages_keep_receipt_order() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;

    for text in ["one", "two", "three"] {
        b.handle.send(text).await.unwrap();
    }
    a.wait_for(|e| matches!(e, CoordinatorEvent::Message { message } if message.text == "three"))
        .await;

    let received: Vec<String> = a
        .handle
        .messages(0)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(received, vec!["one", "two", "three"]);

    let echoes = b.handle.messages(0).await.unwrap();
    assert_eq!(echoes.len(), 3);
    assert!(echoes.iter().all(|m| m.sender == b.endpoint));
    assert!(echoes.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[tokio::test]
async fn test_messages_since_skips_earlier_entries() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;

    a.handle.send("first").await.unwrap();
    let second = a.handle.send("second").await.unwrap();

    let tail = a.handle.messages(second.seq).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].text, "second");
}

/// Active mode sends only to the most recently joined peer.
#[tokio::test]
async fn test_active_mode_targets_latest_partner() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    let mut c = Node::spawn(&hub, 3, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;
    connect(&mut a, &mut c).await;

    assert_eq!(a.handle.status().await.unwrap().active, Some(c.endpoint.clone()));
    a.handle.send("just you").await.unwrap();
    c.wait_for(|e| matches!(e, CoordinatorEvent::Message { .. }))
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(b.handle.messages(0).await.unwrap().is_empty());

    // Switching back to B redirects the next message.
    a.handle.select(b.id()).await.unwrap();
    a.handle.send("now you").await.unwrap();
    b.wait_for(|e| matches!(e, CoordinatorEvent::Message { message } if message.text == "now you"))
        .await;
}

#[tokio::test]
async fn test_broadcast_mode_reaches_every_partner() {
    let hub = MemoryHub::new();
    let broadcast = CoordinatorSettings {
        send_mode: SendMode::Broadcast,
        ..CoordinatorSettings::default()
    };
    let mut a = Node::spawn(&hub, 1, broadcast);
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    let mut c = Node::spawn(&hub, 3, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;
    connect(&mut a, &mut c).await;

    a.handle.send("everyone").await.unwrap();
    for n in [&mut b, &mut c] {
        n.wait_for(|e| matches!(e, CoordinatorEvent::Message { message } if message.text == "everyone"))
            .await;
    }
}

/// Losing the active partner leaves other sessions up but active mode has
/// nobody to talk to.
#[tokio::test]
async fn test_active_mode_needs_an_active_partner() {
    let hub = MemoryHub::new();
    let mut a = Node::spawn(&hub, 1, CoordinatorSettings::default());
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    let mut c = Node::spawn(&hub, 3, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;
    connect(&mut a, &mut c).await;

    c.handle.disconnect(a.id()).await.unwrap();
    let target = c.endpoint.clone();
    a.wait_for(|e| matches!(e, CoordinatorEvent::ActiveCleared { peer } if *peer == target))
        .await;

    assert_eq!(
        a.handle.send("anyone?").await,
        Err(CoordinatorError::SendFailed(SendFailure::NoActivePeer))
    );
}
