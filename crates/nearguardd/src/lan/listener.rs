//! Announcement listener.
//!
//! Joins the ff02::1 multicast group and feeds `Announce` frames from nearby
//! peers into the transport's sightings. A separate expiry task reports
//! peers that went quiet.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use nearguard_core::wire::{Frame, MAX_FRAME_BYTES, MULTICAST_ADDR, PEER_TTL_SECS, WIRE_VERSION};

use super::LanTransport;

/// Listen for announcements until shutdown.
pub async fn listener_loop(
    lan: Arc<LanTransport>,
    interface_index: u32,
    announce_port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let socket = make_listener_socket(interface_index, announce_port)
        .context("failed to create multicast listener socket")?;
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

    let mut buf = vec![0u8; MAX_FRAME_BYTES];

    tracing::info!(port = announce_port, "announcement listener starting");

    loop {
        let (len, src) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("announcement listener shutting down");
                return Ok(());
            }
            r = socket.recv_from(&mut buf) => match r {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                    continue;
                }
            },
        };

        let SocketAddr::V6(src) = src else {
            tracing::warn!("received IPv4 datagram on IPv6 socket, ignoring");
            continue;
        };

        match Frame::decode(&buf[..len]) {
            Ok(Frame::Announce {
                version,
                service,
                endpoint,
                port,
            }) => {
                if version != WIRE_VERSION || service != lan.service() {
                    tracing::trace!(version, service = %service, "foreign announcement ignored");
                    continue;
                }
                let addr = SocketAddrV6::new(*src.ip(), port, 0, interface_index);
                lan.observe_announcement(endpoint, SocketAddr::V6(addr));
            }
            Ok(_) => tracing::trace!(src = %src, "non-announcement on multicast group ignored"),
            Err(e) => tracing::trace!(src = %src, error = %e, "failed to parse announcement"),
        }
    }
}

/// Report peers not heard from within the TTL.
pub async fn expiry_loop(lan: Arc<LanTransport>, mut shutdown: broadcast::Receiver<()>) {
    let ttl = Duration::from_secs(PEER_TTL_SECS);
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = interval.tick() => {
                let removed = lan.expire_sightings(ttl);
                if removed > 0 {
                    tracing::debug!(removed, "expired peer sightings");
                }
            }
        }
    }
}

/// Create a UDP socket joined to the ff02::1 multicast group.
fn make_listener_socket(interface_index: u32, port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_only_v6(true).context("IPV6_V6ONLY")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    socket.bind(&bind_addr.into()).context("bind()")?;

    let multicast: Ipv6Addr = MULTICAST_ADDR
        .parse()
        .context("invalid multicast address")?;
    socket
        .join_multicast_v6(&multicast, interface_index)
        .context("IPV6_JOIN_GROUP")?;

    Ok(socket.into())
}
