use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::Bytes;
use reqwest::Url;
use tracing::warn;

use crate::bencode_record;
use crate::error::{MappingError, TrackerError};
use crate::mapping::{from_bytes, FromBencode, ToBencode};
use crate::{BencodeType, InfoHash, PeerId};

const COMPACT_PEER_LEN: usize = 6;

/// GET request to tracker
pub struct Request {
    /// URL to make GET request to tracker
    pub url: Url,
}

/// Percent-encode every byte, for opaque binary query values
fn percent_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("%{:02x}", byte)).collect()
}

impl Request {
    /// Create announce request for a fresh download
    pub fn new(
        tracker_url: &str,
        peer_id: &PeerId,
        port: u16,
        info_hash: &InfoHash,
        left: u64,
    ) -> Result<Request, TrackerError> {
        let mut url = Url::parse(tracker_url)?;
        let mut query = url.query().map(|q| format!("{}&", q)).unwrap_or_default();
        query.push_str("info_hash=");
        query.push_str(&percent_encode(info_hash));
        query.push_str("&peer_id=");
        query.push_str(&percent_encode(peer_id.as_bytes()));
        url.set_query(Some(&query));
        url.query_pairs_mut()
            .append_pair("port", &port.to_string())
            .append_pair("uploaded", "0")
            .append_pair("downloaded", "0")
            .append_pair("left", &left.to_string())
            .append_pair("compact", "1");
        Ok(Request { url })
    }

    /// Send request and return response body
    pub async fn send(self, client: &reqwest::Client) -> Result<Bytes, TrackerError> {
        let response = client.get(self.url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

/// Peer of file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// IP address of peer
    pub ip: Ipv4Addr,
    /// Port of peer
    pub port: u16,
    /// Identifier reported by the tracker, only present in the non-compact form
    pub peer_id: Option<Bytes>,
}

impl Peer {
    /// Peer from a 6-byte compact entry: 4 IPv4 octets then a big-endian port
    fn from_compact(data: &[u8]) -> Peer {
        Peer {
            ip: Ipv4Addr::new(data[0], data[1], data[2], data[3]),
            port: u16::from_be_bytes([data[4], data[5]]),
            peer_id: None,
        }
    }

    pub fn addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

/// Entry of the non-compact peer list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerEntry {
    pub peer_id: Option<Bytes>,
    pub ip: String,
    pub port: u16,
}

bencode_record!(PeerEntry {
    peer_id => "peer id",
    ip => "ip",
    port => "port",
});

/// `peers` value of an announce response, in whichever form the tracker chose
#[derive(Debug, Clone, PartialEq)]
pub enum PeerList {
    Compact(Bytes),
    Dicts(Vec<PeerEntry>),
}

impl Default for PeerList {
    fn default() -> Self {
        PeerList::Compact(Bytes::new())
    }
}

impl FromBencode for PeerList {
    fn from_bencode(value: &BencodeType) -> Result<Self, MappingError> {
        match value {
            BencodeType::ByteString(_) => Bytes::from_bencode(value).map(PeerList::Compact),
            BencodeType::List(_) => Vec::<PeerEntry>::from_bencode(value).map(PeerList::Dicts),
            other => Err(MappingError::TypeMismatch {
                expected: "byte string or list",
                found: other.kind(),
            }),
        }
    }
}

impl ToBencode for PeerList {
    fn to_bencode(&self) -> Result<BencodeType, MappingError> {
        match self {
            PeerList::Compact(bytes) => bytes.to_bencode(),
            PeerList::Dicts(entries) => entries.to_bencode(),
        }
    }
}

/// Announce response dict as sent by the tracker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnounceResponse {
    pub failure_reason: Option<String>,
    pub warning_message: Option<String>,
    pub interval: u64,
    pub min_interval: Option<u64>,
    pub tracker_id: Option<Bytes>,
    pub complete: Option<u64>,
    pub incomplete: Option<u64>,
    pub peers: PeerList,
}

bencode_record!(AnnounceResponse {
    failure_reason => "failure reason",
    warning_message => "warning message",
    interval => "interval",
    min_interval => "min interval",
    tracker_id => "tracker id",
    complete => "complete",
    incomplete => "incomplete",
    peers => "peers",
});

/// Response from tracker
#[derive(Debug, PartialEq)]
pub enum Response {
    /// Failed query
    Failure(String),
    /// Successful query
    Success {
        /// Interval (in seconds) at which to reconnect to tracker to refresh peer list
        interval: u64,
        /// Minimum interval (in seconds) the tracker allows between announces
        min_interval: Option<u64>,
        /// Peers of file reported by tracker
        peers: Vec<Peer>,
    },
}

impl Response {
    /// Deserialise response message body
    pub fn deserialise(data: &[u8]) -> Result<Response, TrackerError> {
        let response: AnnounceResponse = from_bytes(data)?;
        if let Some(reason) = response.failure_reason.filter(|reason| !reason.is_empty()) {
            return Ok(Response::Failure(reason));
        }
        if let Some(warning) = &response.warning_message {
            warn!("Tracker warning: {}", warning);
        }

        let peers = match response.peers {
            PeerList::Compact(data) => parse_peers(&data)?,
            PeerList::Dicts(entries) => entries
                .into_iter()
                .filter_map(|entry| match entry.ip.parse::<Ipv4Addr>() {
                    Ok(ip) => Some(Peer {
                        ip,
                        port: entry.port,
                        peer_id: entry.peer_id,
                    }),
                    Err(_) => {
                        warn!("Skipping peer with non-IPv4 address: {}", entry.ip);
                        None
                    }
                })
                .collect(),
        };
        Ok(Response::Success {
            interval: response.interval,
            min_interval: response.min_interval,
            peers,
        })
    }

    /// Peers of a successful response, or the tracker's failure reason as an error
    pub fn into_peers(self) -> Result<Vec<Peer>, TrackerError> {
        match self {
            Response::Failure(reason) => Err(TrackerError::Failure(reason)),
            Response::Success { peers, .. } => Ok(peers),
        }
    }
}

/// Parse peers encoded in "compact" form
fn parse_peers(data: &[u8]) -> Result<Vec<Peer>, TrackerError> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TrackerError::MalformedPeers(data.len()));
    }
    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(Peer::from_compact)
        .collect())
}
