//! Watch a relay from the terminal.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use kubecast_core::{Message, RelayConfig};

use crate::output;

#[derive(Args)]
pub struct TailArgs {
    /// WebSocket URL (defaults to the configured server address and path)
    #[arg(long)]
    pub url: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print full payloads
    #[arg(long)]
    pub payload: bool,
}

fn resolve_url(args: &TailArgs, config_path: Option<&Path>) -> Result<String> {
    if let Some(url) = &args.url {
        return Ok(url.clone());
    }
    let config = RelayConfig::load(config_path).context("Failed to load configuration")?;
    Ok(format!(
        "ws://{}{}",
        config.server.bind_addr(),
        config.websocket.path
    ))
}

pub async fn execute(args: TailArgs, config_path: Option<&Path>) -> Result<()> {
    let url = resolve_url(&args, config_path)?;
    let (mut ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    println!("{} {}", "Connected to".dimmed(), url.cyan());

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(deadline);

    let mut received = 0usize;
    loop {
        tokio::select! {
            _ = &mut deadline => {
                ws.close(None).await.ok();
                break;
            }
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<Message>(text.as_str()) {
                        Ok(message) => output::print_message(&message, args.payload),
                        Err(e) => tracing::warn!(error = %e, "Unrecognized frame from relay"),
                    }
                    received += 1;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .unwrap_or_default();
                    println!("{} {}", "Relay closed the connection".yellow(), reason.dimmed());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                None => break,
            }
        }
    }

    println!("{}", format!("{} message(s) received", received).dimmed());
    Ok(())
}
