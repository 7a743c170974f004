//! CLI command definitions and handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod notify;
pub mod serve;
pub mod tail;

/// Kubecast - resource event relay for Tekton dashboards
#[derive(Parser)]
#[command(name = "kubecast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "KUBECAST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve(serve::ServeArgs),

    /// Push one resource event to a running relay
    Notify(notify::NotifyArgs),

    /// Connect to a relay and print incoming events
    Tail(tail::TailArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.config.as_deref();

        match self.command {
            Commands::Serve(args) => serve::execute(args, config).await,
            Commands::Notify(args) => notify::execute(args).await,
            Commands::Tail(args) => tail::execute(args, config).await,
        }
    }
}
