//! Messaging commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<MessageJson>,
}

#[derive(Deserialize)]
struct MessageJson {
    seq: u64,
    from_name: String,
    mine: bool,
    text: String,
}

#[derive(Serialize)]
struct SendMessageRequest {
    text: String,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    seq: u64,
    timestamp: u64,
}

pub async fn cmd_messages(port: u16, since: u64) -> Result<()> {
    let resp: MessagesResponse =
        get_json(&format!("{}/messages?since={}", base_url(port), since)).await?;

    if resp.messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Messages ({})", resp.messages.len());
    println!("═══════════════════════════════════════");

    for m in &resp.messages {
        let who = if m.mine { "me" } else { m.from_name.as_str() };
        println!("  {:>4}  {:<16} {}", m.seq, who, m.text);
    }

    Ok(())
}

pub async fn cmd_send(port: u16, text: &str) -> Result<()> {
    let resp: SendMessageResponse = post_json_body(
        &format!("{}/messages/send", base_url(port)),
        &SendMessageRequest {
            text: text.to_string(),
        },
    )
    .await?;
    println!("✓ Sent (seq {}, at {} ms)", resp.seq, resp.timestamp);
    Ok(())
}
