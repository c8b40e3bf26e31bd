// headerproofd: batch chain headers into Merkle trees and serve proofs

use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use headerproof::{merkle::HashAlgorithm, server, Config, HeaderProofService};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "headerproofd")]
#[command(about = "Batch block headers into Merkle trees and serve inclusion proofs", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Headers per tree (overrides the config file)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Control plane listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// WebSocket URL of the node to follow at start-up
    #[arg(short, long)]
    node_url: Option<String>,

    /// Hash function: sha256 or blake3
    #[arg(long)]
    hash_algorithm: Option<HashAlgorithm>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(node_url) = self.node_url {
            config.node_url = Some(node_url);
        }
        if let Some(hash_algorithm) = self.hash_algorithm {
            config.hash_algorithm = hash_algorithm;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.into_config().context("invalid configuration")?;
    info!(
        batch_size = config.batch_size,
        hash_algorithm = %config.hash_algorithm,
        "starting headerproofd"
    );

    let service = HeaderProofService::new(config.clone())?;

    if let Some(url) = &config.node_url {
        // The control plane stays up so a later /connect can retry.
        if let Err(e) = service.connect(url).await {
            error!(%url, error = %e, "initial connection failed");
        }
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutting down");
                on_signal.cancel();
            }
            Err(e) => error!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    server::serve(service.clone(), config.listen_addr, shutdown)
        .await
        .context("control plane failed")?;
    service.disconnect().await;
    Ok(())
}
