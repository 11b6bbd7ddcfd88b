//! Peer listing, invitation, disconnect and discovery commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    id: String,
    name: String,
    state: String,
    active: bool,
}

#[derive(Deserialize)]
struct InviteResponse {
    peer: String,
    outcome: String,
}

#[derive(Deserialize)]
struct DisconnectResponse {
    peer: String,
}

#[derive(Deserialize)]
struct DiscoveryResponse {
    advertising: bool,
    browsing: bool,
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Nearby Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let marker = if p.active { "★" } else { " " };
        println!("  {} {:<20} {:<16} {}", marker, p.name, p.state, p.id);
    }

    Ok(())
}

pub async fn cmd_invite(port: u16, id: &str) -> Result<()> {
    let resp: InviteResponse =
        post_json(&format!("{}/peers/{}/invite", base_url(port), id)).await?;
    match resp.outcome.as_str() {
        "joined" => println!("✓ Now talking to {}", resp.peer),
        "inviting" => println!("Invitation sent to {}", resp.peer),
        _ => println!("Invitation to {} already in flight", resp.peer),
    }
    Ok(())
}

pub async fn cmd_disconnect(port: u16, id: &str) -> Result<()> {
    let resp: DisconnectResponse =
        post_json(&format!("{}/peers/{}/disconnect", base_url(port), id)).await?;
    println!("Disconnected from {}", resp.peer);
    Ok(())
}

/// `side` is `advertising` or `browsing`; `action` is `start` or `stop`.
pub async fn cmd_discovery(port: u16, side: &str, action: &str) -> Result<()> {
    let resp: DiscoveryResponse =
        post_json(&format!("{}/discovery/{}/{}", base_url(port), side, action)).await?;
    println!(
        "advertising: {}  browsing: {}",
        if resp.advertising { "on" } else { "off" },
        if resp.browsing { "on" } else { "off" }
    );
    Ok(())
}
