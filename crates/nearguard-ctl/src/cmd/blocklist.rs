//! Blocklist editing commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, get_json, post_json_body, put_json_body};

#[derive(Deserialize)]
struct BlocklistResponse {
    defaults: Vec<String>,
    stored: Vec<String>,
}

#[derive(Serialize)]
struct AddRequest {
    domain: String,
}

#[derive(Deserialize)]
struct AddResponse {
    domain: String,
    added: bool,
}

#[derive(Deserialize)]
struct RemoveResponse {
    removed: String,
}

#[derive(Serialize)]
struct ReplaceRequest {
    domains: Vec<String>,
}

fn print_list(resp: &BlocklistResponse) {
    println!("═══════════════════════════════════════");
    println!("  Blocklist");
    println!("═══════════════════════════════════════");
    for d in &resp.defaults {
        println!("    -  {}  (built-in)", d);
    }
    if resp.stored.is_empty() {
        println!("\n  No stored entries.");
    }
    for (i, d) in resp.stored.iter().enumerate() {
        let shown = if d.is_empty() { "(empty)" } else { d.as_str() };
        println!("  {:>3}  {}", i, shown);
    }
}

pub async fn cmd_blocklist(port: u16) -> Result<()> {
    let resp: BlocklistResponse = get_json(&format!("{}/blocklist", base_url(port))).await?;
    print_list(&resp);
    Ok(())
}

pub async fn cmd_blocklist_add(port: u16, domain: &str) -> Result<()> {
    let resp: AddResponse = post_json_body(
        &format!("{}/blocklist/add", base_url(port)),
        &AddRequest {
            domain: domain.to_string(),
        },
    )
    .await?;
    if resp.added {
        println!("✓ Blocked {}", resp.domain);
    } else {
        println!("{} is already blocked", resp.domain);
    }
    Ok(())
}

pub async fn cmd_blocklist_remove(port: u16, index: usize) -> Result<()> {
    let resp: RemoveResponse =
        delete_json(&format!("{}/blocklist/{}", base_url(port), index)).await?;
    println!("✓ Removed {}", resp.removed);
    Ok(())
}

pub async fn cmd_blocklist_replace(port: u16, domains: &[&str]) -> Result<()> {
    let req = ReplaceRequest {
        domains: domains.iter().map(|d| d.to_string()).collect(),
    };
    let resp: BlocklistResponse =
        put_json_body(&format!("{}/blocklist", base_url(port)), &req).await?;
    print_list(&resp);
    Ok(())
}
