//! Inbound invitation commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};
use super::status::EndpointJson;

#[derive(Deserialize)]
struct PermissionResponse {
    pending: Option<PendingInfo>,
}

#[derive(Deserialize)]
struct PendingInfo {
    from: EndpointJson,
    received_at: u64,
}

#[derive(Serialize)]
struct PermissionDecision {
    accept: bool,
}

#[derive(Deserialize)]
struct DecisionResponse {
    peer: String,
    name: String,
    accepted: bool,
}

pub async fn cmd_permission(port: u16) -> Result<()> {
    let resp: PermissionResponse = get_json(&format!("{}/permission", base_url(port))).await?;
    match resp.pending {
        Some(p) => {
            println!("{} ({}) wants to chat", p.from.name, p.from.id);
            println!("  received at {} ms", p.received_at);
            println!("  answer with: nearguard-ctl permission accept|reject");
        }
        None => println!("No pending invitation."),
    }
    Ok(())
}

pub async fn cmd_permission_respond(port: u16, accept: bool) -> Result<()> {
    let resp: DecisionResponse = post_json_body(
        &format!("{}/permission", base_url(port)),
        &PermissionDecision { accept },
    )
    .await?;
    if resp.accepted {
        println!("✓ Accepted {} ({})", resp.name, resp.peer);
    } else {
        println!("✗ Rejected {} ({})", resp.name, resp.peer);
    }
    Ok(())
}
