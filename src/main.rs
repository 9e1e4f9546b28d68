use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bittorrent_core::{init::discover_peers, swarm, Config, TorrentMetadata};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Cli {
    /// Filepath to metainfo (`.torrent`) file
    metainfo: PathBuf,

    /// Port advertised to the tracker
    #[arg(long, default_value_t = 6881)]
    port: u16,

    /// Seconds allowed for each TCP connection attempt
    #[arg(long, default_value_t = 5)]
    dial_timeout: u64,

    /// Seconds allowed for each read from a peer
    #[arg(long, default_value_t = 10)]
    read_timeout: u64,

    /// Seconds allowed for the tracker announce
    #[arg(long, default_value_t = 15)]
    tracker_timeout: u64,

    /// Seconds allowed for the whole swarm attempt
    #[arg(long)]
    deadline: Option<u64>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            port: self.port,
            dial_timeout: Duration::from_secs(self.dial_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            tracker_timeout: Duration::from_secs(self.tracker_timeout),
            deadline: self.deadline.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let bytes = match std::fs::read(&cli.metainfo) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Unable to read metainfo file {:?}: {}", cli.metainfo, e);
            return ExitCode::FAILURE;
        }
    };
    let metadata = match TorrentMetadata::from_bytes(&bytes) {
        Ok(metadata) => Arc::new(metadata),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Loaded {} ({} bytes, {} pieces), info hash {}",
        String::from_utf8_lossy(&metadata.name),
        metadata.total_length,
        metadata.piece_count(),
        bittorrent_core::hex(&metadata.info_hash)
    );

    let peers = match discover_peers(&metadata, &config).await {
        Ok(peers) => peers,
        Err(e) => {
            error!("Peer discovery failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling peer sessions");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = swarm::connect(metadata, peers, &config, shutdown_rx).await;
    for session in &report.sessions {
        info!(
            peer = %session.addr,
            remote_peer_id = %session.client.remote_peer_id,
            choked = session.client.choked,
            "Session ready"
        );
    }
    if report.sessions.is_empty() {
        warn!("No peer completed the handshake");
    }
    ExitCode::SUCCESS
}
