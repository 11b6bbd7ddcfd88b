//! Chat-to-filter loop: a domain typed in a conversation ends up in the
//! shared store and the filter agent, reading the same directory through its
//! own store handle, starts dropping it.

use crate::*;

use nearguard_core::config::FailMode;
use nearguard_core::Verdict;
use nearguard_filterd::{FilterHook, FlowDescriptor};
use nearguard_services::{CoordinatorEvent, CoordinatorSettings, MemoryHub, PolicyStore};

fn learner(dir: &TempDir) -> LearningPipeline {
    let store = PolicyStore::open(dir.0.clone()).unwrap();
    LearningPipeline::new(store, &[".com".to_string()])
}

fn filter_agent(dir: &TempDir) -> FilterHook {
    FilterHook::new(
        PolicyStore::open(dir.0.clone()).unwrap(),
        vec!["youtube.com".into(), "www.youtube.com".into()],
        vec!["nearguardd".into()],
        FailMode::Open,
    )
}

fn flow(host: &str) -> FlowDescriptor {
    FlowDescriptor {
        host: Some(host.into()),
        source: Some("browser".into()),
    }
}

#[tokio::test]
async fn test_inbound_domain_is_learned_once() {
    let dir = TempDir::new("learn-inbound");
    let hub = MemoryHub::new();
    let mut a = Node::spawn_with(&hub, 1, CoordinatorSettings::default(), Some(learner(&dir)));
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;

    let agent = filter_agent(&dir);
    assert_eq!(agent.handle_new_flow(&flow("ads.spam.com")), Verdict::Allow);

    b.handle.send("spam.com").await.unwrap();
    let learned = a
        .wait_for(|e| matches!(e, CoordinatorEvent::DomainLearned { .. }))
        .await;
    assert!(matches!(learned, CoordinatorEvent::DomainLearned { domain } if domain == "spam.com"));
    assert_eq!(agent.handle_new_flow(&flow("ads.spam.com")), Verdict::Drop);

    // Same domain again, different case: nothing new is stored.
    b.handle.send("SPAM.com").await.unwrap();
    a.wait_for(|e| matches!(e, CoordinatorEvent::Message { message } if message.text == "SPAM.com"))
        .await;

    let store = PolicyStore::open(dir.0.clone()).unwrap();
    assert_eq!(store.read_blocked_domains().unwrap(), vec!["spam.com".to_string()]);
}

#[tokio::test]
async fn test_local_echo_is_learned_and_chatter_is_not() {
    let dir = TempDir::new("learn-echo");
    let hub = MemoryHub::new();
    let mut a = Node::spawn_with(&hub, 1, CoordinatorSettings::default(), Some(learner(&dir)));
    let mut b = Node::spawn(&hub, 2, CoordinatorSettings::default());
    connect(&mut a, &mut b).await;

    a.handle.send("see you at 5").await.unwrap();
    a.handle.send("check out this .com").await.unwrap();
    a.handle.send("  Example.COM ").await.unwrap();
    let learned = a
        .wait_for(|e| matches!(e, CoordinatorEvent::DomainLearned { .. }))
        .await;
    assert!(matches!(learned, CoordinatorEvent::DomainLearned { domain } if domain == "example.com"));

    let store = PolicyStore::open(dir.0.clone()).unwrap();
    assert_eq!(store.read_blocked_domains().unwrap(), vec!["example.com".to_string()]);
    assert_eq!(
        filter_agent(&dir).handle_new_flow(&flow("www.example.com")),
        Verdict::Drop
    );
}

#[tokio::test]
async fn test_filter_switch_is_shared() {
    let dir = TempDir::new("learn-switch");
    let daemon_side = PolicyStore::open(dir.0.clone()).unwrap();
    let agent = filter_agent(&dir);

    assert_eq!(agent.handle_new_flow(&flow("m.youtube.com")), Verdict::Drop);
    daemon_side.write_enabled(false).unwrap();
    assert_eq!(agent.handle_new_flow(&flow("m.youtube.com")), Verdict::Allow);
    daemon_side.write_enabled(true).unwrap();
    assert_eq!(agent.handle_new_flow(&flow("m.youtube.com")), Verdict::Drop);

    // The daemon's own traffic is never filtered.
    let own = FlowDescriptor {
        host: Some("m.youtube.com".into()),
        source: Some("nearguardd".into()),
    };
    assert_eq!(agent.handle_new_flow(&own), Verdict::Allow);
}
