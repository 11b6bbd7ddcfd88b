//! nearguardd: nearby-peer chat daemon that feeds the shared blocklist.

use std::net::SocketAddrV6;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use nearguard_core::config::NearguardConfig;
use nearguard_core::Endpoint;
use nearguard_services::transport::event_channel;
use nearguard_services::{
    CoordinatorEvent, CoordinatorSettings, CoordinatorTask, LearningPipeline, PolicyStore,
    SessionCoordinator, Transport,
};

mod lan;

use lan::{announce, listener, session, LanTransport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = NearguardConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = NearguardConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NearguardConfig::default()
    });

    let interface = std::env::args()
        .nth(1)
        .or_else(|| Some(config.network.interface.clone()).filter(|i| !i.is_empty()))
        .context("no network interface given (argument or network.interface)")?;
    tracing::info!(interface, "nearguardd starting");

    let interface_index = announce::if_index(&interface)?;
    let announce_port = config.network.announce_port;

    let local_link_addr = announce::link_local_addr(interface_index, announce_port)?;
    tracing::info!(addr = %local_link_addr, "local link-local address");

    // Identity
    let local = Endpoint::load_or_create(
        &config.identity.endpoint_path,
        &config.identity.display_name,
    )
    .context("failed to load endpoint identity")?;
    tracing::info!(endpoint = %local, id = %local.id, "identity ready");

    // Policy store, shared with the filter process
    let policy = PolicyStore::open(config.policy.store_dir.clone())
        .context("failed to open policy store")?;
    tracing::info!(dir = %config.policy.store_dir.display(), "policy store opened");

    let learning = config.learning.enabled.then(|| {
        tracing::info!(suffixes = ?config.learning.suffixes, "domain learning enabled");
        LearningPipeline::new(policy.clone(), &config.learning.suffixes)
    });

    // Session socket
    let session_socket = Arc::new(
        UdpSocket::bind(SocketAddrV6::new(local_link_addr, 0, 0, interface_index))
            .await
            .context("failed to bind session socket")?,
    );

    let (event_tx, event_rx) = event_channel();
    let lan = Arc::new(LanTransport::new(
        local.clone(),
        config.network.service_type.clone(),
        session_socket,
        event_tx,
    ));
    tracing::info!(
        service = %lan.service(),
        port = lan.session_port()?,
        "LAN transport ready"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Coordinator ──────────────────────────────────────────────────────────

    let settings = CoordinatorSettings::from_config(&config.session);
    tracing::info!(
        send_mode = ?settings.send_mode,
        busy_policy = ?settings.busy_policy,
        invite_timeout_secs = settings.invite_timeout.as_secs(),
        "session settings"
    );
    let coordinator = SessionCoordinator::new(
        lan.clone() as Arc<dyn Transport>,
        settings,
        learning,
    );
    let (task, coordinator_handle) =
        CoordinatorTask::new(coordinator, event_rx, shutdown_tx.subscribe());

    let event_logger = {
        let mut events = coordinator_handle.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let coordinator_task = task.spawn();

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let announce_task = {
        let lan = lan.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                announce::announce_loop(lan, interface_index, announce_port, shutdown).await
            {
                tracing::error!(error = %e, "announcer failed");
            }
        })
    };

    let listener_task = {
        let lan = lan.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                listener::listener_loop(lan, interface_index, announce_port, shutdown).await
            {
                tracing::error!(error = %e, "announcement listener failed");
            }
        })
    };

    let expiry_task = tokio::spawn(listener::expiry_loop(lan.clone(), shutdown_tx.subscribe()));

    let session_task = tokio::spawn(session::frame_loop(lan.clone(), shutdown_tx.subscribe()));

    // Discovery runs from startup; either side can be toggled over the API.
    if let Err(e) = coordinator_handle.start_advertising().await {
        tracing::warn!(error = %e, "failed to start advertising");
    }
    if let Err(e) = coordinator_handle.start_browsing().await {
        tracing::warn!(error = %e, "failed to start browsing");
    }

    // Control API
    let api_port = config.network.api_port;
    let api_task = {
        let state = nearguard_api::ApiState {
            coordinator: coordinator_handle,
            policy,
            default_domains: Arc::new(config.policy.default_domains.clone()),
            local,
            shutdown_tx: shutdown_tx.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = nearguard_api::serve(state, api_port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = coordinator_task    => tracing::error!("coordinator exited: {:?}", r),
        r = announce_task       => tracing::error!("announcer exited: {:?}", r),
        r = listener_task       => tracing::error!("listener exited: {:?}", r),
        r = expiry_task         => tracing::error!("expiry task exited: {:?}", r),
        r = session_task        => tracing::error!("session receiver exited: {:?}", r),
        r = api_task            => tracing::error!("API server exited: {:?}", r),
        r = event_logger        => tracing::error!("event logger exited: {:?}", r),
    }

    // Let the coordinator send byes before the runtime goes away.
    let _ = shutdown_tx.send(());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    Ok(())
}

fn log_event(event: &CoordinatorEvent) {
    match event {
        CoordinatorEvent::PeerFound { peer } => tracing::info!(peer = %peer, "peer found"),
        CoordinatorEvent::PeerLost { peer } => tracing::info!(peer = %peer, "peer lost"),
        CoordinatorEvent::StateChanged { peer, state } => {
            tracing::info!(peer = %peer, state = ?state, "peer state changed")
        }
        CoordinatorEvent::PermissionRequested { request } => {
            tracing::info!(from = %request.from, "permission requested")
        }
        CoordinatorEvent::InvitationDeclined { from, reason } => {
            tracing::info!(from = %from, reason = ?reason, "invitation declined")
        }
        CoordinatorEvent::PermissionReplaced { previous, by } => {
            tracing::info!(previous = %previous, by = %by, "pending request replaced")
        }
        CoordinatorEvent::Joined { peer } => tracing::info!(peer = %peer, "conversation joined"),
        CoordinatorEvent::ActiveCleared { peer } => {
            tracing::info!(peer = %peer, "active peer cleared")
        }
        CoordinatorEvent::Message { message } => {
            tracing::debug!(from = %message.sender, bytes = message.text.len(), "message")
        }
        CoordinatorEvent::DomainLearned { domain } => {
            tracing::info!(domain = %domain, "domain added to blocklist")
        }
        CoordinatorEvent::Failure { error } => tracing::warn!(error = %error, "coordinator failure"),
    }
}
