//! Filter switch and host check commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};

#[derive(Serialize, Deserialize)]
struct FilterState {
    enabled: bool,
}

#[derive(Deserialize)]
struct CheckResponse {
    host: String,
    verdict: String,
    matched: Option<String>,
}

pub async fn cmd_filter(port: u16) -> Result<()> {
    let resp: FilterState = get_json(&format!("{}/filter", base_url(port))).await?;
    println!("filter: {}", if resp.enabled { "on" } else { "off" });
    Ok(())
}

pub async fn cmd_filter_set(port: u16, enabled: bool) -> Result<()> {
    let resp: FilterState =
        post_json_body(&format!("{}/filter", base_url(port)), &FilterState { enabled }).await?;
    println!("filter: {}", if resp.enabled { "on" } else { "off" });
    Ok(())
}

pub async fn cmd_filter_check(port: u16, host: &str) -> Result<()> {
    let resp: CheckResponse =
        get_json(&format!("{}/filter/check?host={}", base_url(port), host)).await?;
    match resp.matched {
        Some(m) => println!("{} → {} (matches {})", resp.host, resp.verdict, m),
        None => println!("{} → {}", resp.host, resp.verdict),
    }
    Ok(())
}
