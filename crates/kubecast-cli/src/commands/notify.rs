//! Push a single event to a running relay.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kubecast_core::{notifier::EventNotifier, Message, MessageType};

#[derive(Args)]
pub struct NotifyArgs {
    /// Message type, e.g. TaskRunCreated
    pub tag: String,

    /// JSON payload
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Relay base URL (defaults to $KUBECAST_URL or http://127.0.0.1:9097)
    #[arg(long)]
    pub url: Option<String>,
}

fn build_message(args: &NotifyArgs) -> Result<Message> {
    let message_type: MessageType = args.tag.parse()?;
    let payload: serde_json::Value =
        serde_json::from_str(&args.payload).context("Payload is not valid JSON")?;
    Ok(Message::with_type(message_type, payload))
}

pub async fn execute(args: NotifyArgs) -> Result<()> {
    let message = build_message(&args)?;
    let notifier = match &args.url {
        Some(url) => EventNotifier::with_url(url),
        None => EventNotifier::new(),
    };

    let report = notifier
        .notify(&message)
        .await
        .with_context(|| format!("Failed to reach relay at {}", notifier.notify_url()))?;

    println!(
        "{} {} delivered={} dropped={} disconnected={}",
        "✓".green(),
        message.message_type().to_string().bold(),
        report["delivered"],
        report["dropped"],
        report["disconnected"]
    );
    Ok(())
}
