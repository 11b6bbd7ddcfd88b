//! nearguard-ctl: command-line interface for the Nearguard daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::{blocklist, filter, messages, peers, permission, status};

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: nearguard-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                        Show daemon status and sessions");
    println!("  peers                         List nearby peers");
    println!("  invite <id>                   Invite a peer, or make it the active chat");
    println!("  disconnect <id>               End the session with a peer");
    println!("  discovery <advertising|browsing> <start|stop>");
    println!("  permission                    Show the pending invitation");
    println!("  permission accept|reject      Answer the pending invitation");
    println!("  messages [since]              Show the message stream");
    println!("  send <text...>                Send a message");
    println!("  blocklist                     Show blocked domains");
    println!("  blocklist add <domain>        Block a domain");
    println!("  blocklist remove <index>      Remove a stored entry");
    println!("  blocklist replace <d...>      Replace all stored entries");
    println!("  filter [on|off]               Show or switch the filter");
    println!("  filter check <host>           Show the verdict for a host");
    println!("  shutdown                      Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["shutdown"] => status::cmd_shutdown(port).await,
        ["peers"] => peers::cmd_peers(port).await,
        ["invite", id] => peers::cmd_invite(port, id).await,
        ["disconnect", id] => peers::cmd_disconnect(port, id).await,
        ["discovery", side, action] => peers::cmd_discovery(port, side, action).await,
        ["permission"] => permission::cmd_permission(port).await,
        ["permission", "accept"] => permission::cmd_permission_respond(port, true).await,
        ["permission", "reject"] => permission::cmd_permission_respond(port, false).await,
        ["messages"] => messages::cmd_messages(port, 0).await,
        ["messages", since] => {
            let since = since.parse().context("since must be a number")?;
            messages::cmd_messages(port, since).await
        }
        ["send", text @ ..] if !text.is_empty() => messages::cmd_send(port, &text.join(" ")).await,
        ["blocklist"] => blocklist::cmd_blocklist(port).await,
        ["blocklist", "add", domain] => blocklist::cmd_blocklist_add(port, domain).await,
        ["blocklist", "remove", index] => {
            let index = index.parse().context("index must be a number")?;
            blocklist::cmd_blocklist_remove(port, index).await
        }
        ["blocklist", "replace", domains @ ..] => {
            blocklist::cmd_blocklist_replace(port, domains).await
        }
        ["filter"] => filter::cmd_filter(port).await,
        ["filter", "on"] => filter::cmd_filter_set(port, true).await,
        ["filter", "off"] => filter::cmd_filter_set(port, false).await,
        ["filter", "check", host] => filter::cmd_filter_check(port, host).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
