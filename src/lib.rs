use std::collections::HashMap;
use std::fmt;

use rand::distr::Alphanumeric;
use rand::Rng;

pub mod client;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod handshake;
pub mod init;
pub mod mapping;
pub mod message;
pub mod metainfo;
pub mod swarm;
pub mod torrent;
pub mod tracker;

pub use config::Config;
pub use decode::decode;
pub use encode::encode;
pub use mapping::{from_bytes, to_bytes, FromBencode, ToBencode};
pub use torrent::TorrentMetadata;

/// Protocol identifier sent in every handshake
pub const PSTR: &str = "BitTorrent protocol";

/// Size of a SHA1 digest, used for both piece hashes and the info hash
pub const SHA1_LEN: usize = 20;

/// SHA1 hash of the canonically encoded `info` dict
pub type InfoHash = [u8; SHA1_LEN];

/// Bencoded value
///
/// Dict keys are raw byte strings. The map carries no ordering; [`encode`] sorts keys when
/// emitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeType {
    ByteString(Vec<u8>),
    Integer(i64),
    List(Vec<BencodeType>),
    Dict(HashMap<Vec<u8>, BencodeType>),
}

impl BencodeType {
    /// Name of the variant, used in mapping errors
    pub fn kind(&self) -> &'static str {
        match self {
            BencodeType::ByteString(_) => "byte string",
            BencodeType::Integer(_) => "integer",
            BencodeType::List(_) => "list",
            BencodeType::Dict(_) => "dict",
        }
    }
}

impl From<&str> for BencodeType {
    fn from(value: &str) -> Self {
        BencodeType::ByteString(value.as_bytes().to_vec())
    }
}

impl From<i64> for BencodeType {
    fn from(value: i64) -> Self {
        BencodeType::Integer(value)
    }
}

const PEER_ID_PREFIX: &[u8; 8] = b"-BC0100-";

/// 20-byte identifier of a client instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Generate an Azureus-style id: client prefix followed by random alphanumerics
    pub fn generate() -> PeerId {
        let mut id = [0; 20];
        id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
        let mut rng = rand::rng();
        for byte in id[PEER_ID_PREFIX.len()..].iter_mut() {
            *byte = rng.sample(Alphanumeric);
        }
        PeerId(id)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Lowercase hex rendering of a digest, used in logs and error messages
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
