use std::future::pending;
use std::net::SocketAddrV4;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::client::Client;
use crate::config::Config;
use crate::error::SessionError;
use crate::torrent::TorrentMetadata;
use crate::tracker::Peer;

/// Peer that completed the handshake and interest exchange, with its live socket
#[derive(Debug)]
pub struct Session {
    pub addr: SocketAddrV4,
    pub client: Client<TcpStream>,
}

/// Outcome of one swarm attempt
///
/// Zero sessions is a valid outcome; deciding whether that is fatal is left to the caller.
#[derive(Debug, Default)]
pub struct SwarmReport {
    pub sessions: Vec<Session>,
    pub failures: Vec<(SocketAddrV4, SessionError)>,
}

/// Start one session per peer and wait for all of them to finish
///
/// Sessions share only the read-only metadata and config. Setting `shutdown` to `true`, or
/// reaching `config.deadline`, ends every session still in progress.
pub async fn connect(
    metadata: Arc<TorrentMetadata>,
    peers: Vec<Peer>,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> SwarmReport {
    let config = Arc::new(config.clone());
    let deadline = config.deadline.map(|limit| Instant::now() + limit);

    let handles = peers
        .iter()
        .map(|peer| {
            let addr = peer.addr();
            let metadata = metadata.clone();
            let config = config.clone();
            let shutdown = shutdown.clone();
            let handle = tokio::spawn(async move {
                process(addr, metadata, config, shutdown, deadline).await
            });
            (addr, handle)
        })
        .collect::<Vec<_>>();

    let mut report = SwarmReport::default();
    for (addr, handle) in handles {
        match handle.await {
            Ok(Ok(client)) => report.sessions.push(Session { addr, client }),
            Ok(Err(e)) => report.failures.push((addr, e)),
            Err(e) => {
                warn!(peer = %addr, "Session task failed: {}", e);
                report.failures.push((addr, SessionError::Task(e.to_string())));
            }
        }
    }
    info!(
        "{} of {} peers ready",
        report.sessions.len(),
        report.sessions.len() + report.failures.len()
    );
    report
}

/// Resolve once the shutdown flag is raised; never resolves if the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        pending::<()>().await;
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

#[instrument(skip(metadata, config, shutdown, deadline))]
async fn process(
    addr: SocketAddrV4,
    metadata: Arc<TorrentMetadata>,
    config: Arc<Config>,
    mut shutdown: watch::Receiver<bool>,
    deadline: Option<Instant>,
) -> Result<Client<TcpStream>, SessionError> {
    let res = tokio::select! {
        res = establish(addr, &metadata, &config) => res,
        _ = cancelled(&mut shutdown) => Err(SessionError::Cancelled),
        _ = deadline_reached(deadline) => Err(SessionError::DeadlineExceeded),
    };
    if let Err(e) = &res {
        warn!("{}", e);
    }
    res
}

/// Dial, handshake and declare interest
async fn establish(
    addr: SocketAddrV4,
    metadata: &TorrentMetadata,
    config: &Config,
) -> Result<Client<TcpStream>, SessionError> {
    let socket = tokio::time::timeout(config.dial_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SessionError::ConnectTimeout)?
        .map_err(SessionError::Connect)?;
    info!("Established TCP connection");

    let mut client = Client::new(socket, metadata, config).await?;
    info!("Established peer protocol");

    client.exchange_interest().await?;
    info!(choked = client.choked, "Interest exchange complete");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpListener};
    use std::time::Duration;

    use super::*;
    use crate::handshake::Handshake;
    use crate::message::Message;
    use crate::{InfoHash, PeerId};

    const OUR_PEER_ID: PeerId = PeerId(*b"-ABC123-abcd12345678");
    const REMOTE_PEER_ID: PeerId = PeerId(*b"-DEF123-efgh12345678");
    const HANDSHAKE_BYTES_LEN: usize = 68;

    fn metadata() -> Arc<TorrentMetadata> {
        Arc::new(TorrentMetadata {
            announce: "http://a.b.org/announce".to_string(),
            name: bytes::Bytes::from_static(b"hello"),
            total_length: 128,
            piece_length: 64,
            piece_hashes: vec![[0xaa; 20], [0xbb; 20]],
            info_hash: [0x11; 20],
        })
    }

    fn config() -> Config {
        Config {
            peer_id: OUR_PEER_ID,
            dial_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn local_peer(listener: &TcpListener) -> Peer {
        Peer {
            ip: Ipv4Addr::LOCALHOST,
            port: listener.local_addr().unwrap().port(),
            peer_id: None,
        }
    }

    /// Fake peer answering one connection with the given info hash, then unchoking
    fn spawn_peer(info_hash: InfoHash) -> Peer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = local_peer(&listener);
        std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut handshake_buf = [0; HANDSHAKE_BYTES_LEN];
            socket.read_exact(&mut handshake_buf).unwrap();
            socket
                .write_all(&Handshake::new(info_hash, REMOTE_PEER_ID).serialise())
                .unwrap();
            let mut interested_buf = [0; 5];
            if socket.read_exact(&mut interested_buf).is_ok() {
                assert_eq!(&interested_buf[..], &Message::Interested.serialise()[..]);
                socket.write_all(&Message::Unchoke.serialise()).unwrap();
            }
        });
        peer
    }

    fn closed_peer() -> Peer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        local_peer(&listener)
    }

    #[tokio::test]
    async fn failing_peers_do_not_affect_healthy_session() {
        let good = spawn_peer([0x11; 20]);
        let mismatched = spawn_peer([0x22; 20]);
        let closed = closed_peer();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let report = connect(
            metadata(),
            vec![mismatched.clone(), good.clone(), closed.clone()],
            &config(),
            shutdown_rx,
        )
        .await;

        assert_eq!(report.sessions.len(), 1);
        let session = &report.sessions[0];
        assert_eq!(session.addr, good.addr());
        assert_eq!(session.client.remote_peer_id, REMOTE_PEER_ID);
        assert!(!session.client.choked);

        assert_eq!(report.failures.len(), 2);
        for (addr, e) in &report.failures {
            if *addr == mismatched.addr() {
                assert!(e.to_string().contains("Info hash mismatch"));
            } else {
                assert_eq!(*addr, closed.addr());
                assert!(matches!(e, SessionError::Connect(_)));
            }
        }
    }

    #[tokio::test]
    async fn zero_peers_is_an_empty_report() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let report = connect(metadata(), vec![], &config(), shutdown_rx).await;
        assert!(report.sessions.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_cancels_pending_sessions() {
        // Connections queue in the backlog but the peer never answers
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let silent = local_peer(&listener);
        let config = Config {
            read_timeout: Duration::from_secs(30),
            ..config()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            shutdown_tx.send(true).unwrap();
        });

        let report = connect(metadata(), vec![silent], &config, shutdown_rx).await;
        assert!(report.sessions.is_empty());
        assert!(matches!(report.failures[0].1, SessionError::Cancelled));
        drop(listener);
    }

    #[tokio::test]
    async fn deadline_ends_pending_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let silent = local_peer(&listener);
        let config = Config {
            read_timeout: Duration::from_secs(30),
            deadline: Some(Duration::from_millis(100)),
            ..config()
        };
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let report = connect(metadata(), vec![silent], &config, shutdown_rx).await;
        assert!(matches!(
            report.failures[0].1,
            SessionError::DeadlineExceeded
        ));
        drop(listener);
    }
}
