use std::time::Duration;

use crate::PeerId;

/// Runtime settings shared by peer discovery and every peer session
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier sent to the tracker and in every handshake
    pub peer_id: PeerId,
    /// Port advertised to the tracker; nothing listens on it
    pub port: u16,
    /// Bound on establishing a TCP connection to a peer
    pub dial_timeout: Duration,
    /// Bound on each handshake or message read
    pub read_timeout: Duration,
    /// Bound on the whole tracker announce
    pub tracker_timeout: Duration,
    /// Time allowed for the whole swarm attempt (None = no overall limit)
    pub deadline: Option<Duration>,
    /// Largest accepted frame length prefix
    pub max_frame_len: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_id: PeerId::generate(),
            port: 6881,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            tracker_timeout: Duration::from_secs(15),
            deadline: None,
            max_frame_len: 2 * 1024 * 1024, // 2 MiB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_generate_a_fresh_peer_id() {
        let first = Config::default();
        let second = Config::default();
        assert_eq!(first.port, 6881);
        assert_eq!(first.dial_timeout, Duration::from_secs(5));
        assert!(first.deadline.is_none());
        assert_ne!(first.peer_id, second.peer_id);
    }
}
