//! Presence announcements.
//!
//! While the transport is advertising, an `Announce` frame goes to the
//! link-local multicast group every `ANNOUNCE_INTERVAL_SECS` so nearby
//! peers can find us and learn our session port.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::broadcast;
use tokio::time;

use nearguard_core::wire::{Frame, ANNOUNCE_INTERVAL_SECS, MULTICAST_ADDR, WIRE_VERSION};
use nearguard_services::Transport;

use super::LanTransport;

/// Send announcements until shutdown.
pub async fn announce_loop(
    lan: Arc<LanTransport>,
    interface_index: u32,
    announce_port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let socket = make_multicast_socket(interface_index)
        .context("failed to create multicast announce socket")?;

    let multicast: Ipv6Addr = MULTICAST_ADDR
        .parse()
        .context("invalid multicast address")?;
    let dest = SocketAddrV6::new(multicast, announce_port, 0, interface_index);

    let frame = Frame::Announce {
        version: WIRE_VERSION,
        service: lan.service().to_string(),
        endpoint: lan.local().clone(),
        port: lan.session_port().context("session socket has no port")?,
    };
    let bytes = frame.encode().context("failed to encode announcement")?;

    let mut interval = time::interval(Duration::from_secs(ANNOUNCE_INTERVAL_SECS));

    tracing::info!(
        interface_index,
        port = announce_port,
        interval_secs = ANNOUNCE_INTERVAL_SECS,
        "announcer starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("announcer shutting down");
                return Ok(());
            }
            _ = interval.tick() => {
                if !lan.is_advertising() {
                    continue;
                }
                match socket.send_to(&bytes, &dest.into()) {
                    Ok(n) => tracing::trace!(bytes = n, "announcement sent"),
                    Err(e) => tracing::warn!(error = %e, "announcement send failed"),
                }
            }
        }
    }
}

/// Create a UDP socket suitable for sending IPv6 multicast.
fn make_multicast_socket(interface_index: u32) -> Result<Socket> {
    let socket =
        Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket
        .set_multicast_if_v6(interface_index)
        .context("IPV6_MULTICAST_IF")?;
    // Link-local only.
    socket
        .set_multicast_hops_v6(1)
        .context("IPV6_MULTICAST_HOPS")?;

    Ok(socket)
}

/// Get the OS interface index for a named network interface.
pub fn if_index(name: &str) -> Result<u32> {
    let name_cstr = std::ffi::CString::new(name).context("interface name contains null byte")?;
    // SAFETY: `name_cstr` is a valid NUL-terminated string for the call.
    let index = unsafe { libc::if_nametoindex(name_cstr.as_ptr()) };
    if index == 0 {
        anyhow::bail!("interface '{}' not found", name);
    }
    Ok(index)
}

/// The link-local IPv6 address the OS would use on `interface_index`.
pub fn link_local_addr(interface_index: u32, announce_port: u16) -> Result<Ipv6Addr> {
    let probe = std::net::UdpSocket::bind("[::]:0").context("probe bind")?;
    let multicast: Ipv6Addr = MULTICAST_ADDR
        .parse()
        .context("invalid multicast address")?;
    probe
        .connect(SocketAddrV6::new(multicast, announce_port, 0, interface_index))
        .context("probe connect")?;
    match probe.local_addr()? {
        std::net::SocketAddr::V6(v6) => Ok(*v6.ip()),
        _ => anyhow::bail!("expected IPv6 local address"),
    }
}
