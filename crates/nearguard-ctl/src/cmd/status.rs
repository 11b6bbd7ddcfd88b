//! Daemon status and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EndpointJson {
    pub id: String,
    pub name: String,
}

impl EndpointJson {
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    local: EndpointJson,
    send_mode: String,
    busy_policy: String,
    invite_timeout_secs: u64,
    advertising: bool,
    browsing: bool,
    directory: Vec<serde_json::Value>,
    sessions: Vec<SessionInfo>,
    joined: Vec<EndpointJson>,
    active: Option<EndpointJson>,
    pending: Option<PendingInfo>,
    message_count: usize,
}

#[derive(Deserialize)]
struct SessionInfo {
    endpoint: EndpointJson,
    state: String,
    state_secs: u64,
}

#[derive(Deserialize)]
struct PendingInfo {
    from: EndpointJson,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    let on_off = |b: bool| if b { "on" } else { "off" };

    println!("═══════════════════════════════════════");
    println!("  Nearguard Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Endpoint        : {} ({})", resp.local.name, resp.local.short_id());
    println!("  Advertising     : {}", on_off(resp.advertising));
    println!("  Browsing        : {}", on_off(resp.browsing));
    println!("  Send mode       : {}", resp.send_mode);
    println!("  Busy policy     : {}", resp.busy_policy);
    println!("  Invite timeout  : {}s", resp.invite_timeout_secs);
    println!("  Peers visible   : {}", resp.directory.len());
    println!("  Joined          : {}", resp.joined.len());
    println!("  Messages        : {}", resp.message_count);
    match &resp.active {
        Some(a) => println!("  Active peer     : {} ({})", a.name, a.short_id()),
        None => println!("  Active peer     : none"),
    }
    if let Some(p) = &resp.pending {
        println!("  Pending request : {} ({})", p.from.name, p.from.short_id());
    }

    if resp.sessions.is_empty() {
        println!("\n  No sessions.");
    } else {
        println!("\n  Sessions:");
        for s in &resp.sessions {
            println!("  ┌─ {} ({})", s.endpoint.name, s.endpoint.short_id());
            println!("  │  state : {}", s.state);
            println!("  └─ since : {}s", s.state_secs);
        }
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse =
        post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
