//! Relay server command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use kubecast_core::{OverflowPolicy, RelayConfig};
use kubecast_hub::Hub;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Overflow policy for slow clients (disconnect, drop_newest)
    #[arg(long)]
    pub overflow: Option<OverflowPolicy>,

    /// Also write logs to a file
    #[arg(long)]
    pub log: bool,

    /// Log file path (defaults to ./kubecast.log)
    #[arg(long, requires = "log")]
    pub log_file: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(&self, config: &mut RelayConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(policy) = self.overflow {
            config.hub.overflow_policy = policy;
        }
    }
}

pub async fn execute(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = RelayConfig::load(config_path).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    let addr = config.server.bind_addr();

    println!();
    println!("  {} {}", "Kubecast".cyan().bold(), "Relay Server".bold());
    println!();
    println!(
        "  {}  ws://{}{}",
        "WebSocket".green(),
        addr,
        config.websocket.path
    );
    println!(
        "  {}     http://{}/internal/notify",
        "Notify".green(),
        addr
    );
    println!("  {}     http://{}/health", "Health".green(), addr);
    println!(
        "  {}   {} (outbox {})",
        "Overflow".green(),
        overflow_label(config.hub.overflow_policy),
        config.hub.outbox_capacity
    );
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    let hub = Hub::new(&config.hub);
    kubecast_web::run_server(config, hub).await?;

    println!("  {}", "Relay stopped".dimmed());
    Ok(())
}

fn overflow_label(policy: OverflowPolicy) -> &'static str {
    match policy {
        OverflowPolicy::Disconnect => "disconnect",
        OverflowPolicy::DropNewest => "drop_newest",
    }
}
