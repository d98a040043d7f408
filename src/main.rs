use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use syncher::bus::InProcessBus;
use syncher::cli::{Cli, Commands};
use syncher::client::Client;
use syncher::config::{ClientConfig, ServerConfig};
use syncher::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            server_config,
            client_config,
            dirs,
        } => {
            let server_cfg = match server_config {
                Some(path) => ServerConfig::load(&path).context("loading server config")?,
                None => ServerConfig::default(),
            };
            let mut client_cfg = match client_config {
                Some(path) => ClientConfig::load(&path).context("loading client config")?,
                None => ClientConfig::default(),
            };
            if !dirs.is_empty() {
                client_cfg.sync_dirs = dirs;
            }

            run_node(server_cfg, client_cfg).await
        }
    }
}

/// Server and client over one in-process bus; external brokers plug in
/// at the Bus trait when processes are split across machines.
async fn run_node(server_cfg: ServerConfig, client_cfg: ClientConfig) -> Result<()> {
    let bus = InProcessBus::new();

    let server = Server::new(server_cfg, bus.clone()).context("starting server")?;
    server.start().await.context("subscribing server")?;

    let client = Client::new(client_cfg.clone(), bus);
    let (event_tx, event_rx) = client.queue();
    let _tasks = client.start(event_rx);

    #[cfg(feature = "watch")]
    let _watch = if client_cfg.sync_dirs.is_empty() {
        None
    } else {
        Some(
            syncher::client::watch::WatchService::start(&client_cfg.sync_dirs, event_tx.clone())
                .context("starting watch")?,
        )
    };

    #[cfg(not(feature = "watch"))]
    if !client_cfg.sync_dirs.is_empty() {
        tracing::warn!("sync_dirs configured but built without the `watch` feature");
    }

    // Keep the queue open so the batcher idles instead of shutting down.
    let _event_tx = event_tx;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
