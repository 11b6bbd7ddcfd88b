//! nearguard-filterd: background flow decision agent.
//!
//! Reads one flow per line on stdin (`host [source]`, `-` for no host) and
//! answers `allow` or `drop` on stdout, in order.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use nearguard_core::config::NearguardConfig;
use nearguard_core::Verdict;
use nearguard_filterd::{FilterHook, FlowDescriptor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = NearguardConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NearguardConfig::default()
    });

    let hook = FilterHook::from_config(&config.policy);
    tracing::info!(
        dir = %config.policy.store_dir.display(),
        fail_mode = ?config.policy.fail_mode,
        exempt = ?config.policy.exempt_sources,
        "filter agent ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut decided: u64 = 0;

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => match line.context("failed to read flow")? {
                Some(line) => line,
                None => break,
            },
        };

        let Some(flow) = FlowDescriptor::parse_line(&line) else {
            continue;
        };
        let answer = match hook.handle_new_flow(&flow) {
            Verdict::Allow => "allow\n",
            Verdict::Drop => "drop\n",
        };
        stdout.write_all(answer.as_bytes()).await?;
        stdout.flush().await?;
        decided += 1;
    }

    tracing::info!(decided, "filter agent exiting");
    Ok(())
}
