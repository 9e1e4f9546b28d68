use std::io;

use thiserror::Error;

/// Malformed bencode input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid integer format")]
    InvalidInteger,
    #[error("Invalid string format")]
    InvalidString,
    #[error("Dict key is not a byte string")]
    DictKeyNotString,
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Trailing data after value: {remaining} bytes")]
    TrailingData { remaining: usize },
    #[error("Unexpected byte: {0:#04x}")]
    UnexpectedByte(u8),
    #[error("Lists and dicts nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
}

/// Decoded value cannot be bound onto the target type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Integer {value} overflows {target}")]
    Overflow { value: i64, target: &'static str },
    #[error("Negative integer {value} for unsigned {target}")]
    Negative { value: i64, target: &'static str },
    #[error("Byte string is not valid UTF-8")]
    InvalidUtf8,
    #[error("Absent value has no bencode representation")]
    Absent,
    #[error("Invalid value for key `{key}`: {source}")]
    Field {
        key: &'static str,
        #[source]
        source: Box<MappingError>,
    },
}

impl MappingError {
    /// Attach the dict key whose value failed to map
    pub fn in_field(self, key: &'static str) -> MappingError {
        MappingError::Field {
            key,
            source: Box::new(self),
        }
    }
}

/// Failure to turn raw bytes into a typed value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BencodeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Invalid metainfo (`.torrent`) contents
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetainfoError {
    #[error("Invalid metainfo: {0}")]
    Bencode(#[from] BencodeError),
    #[error("Invalid metainfo, missing the following key: {0}")]
    MissingKey(&'static str),
    #[error("Invalid metainfo, piece length must be positive")]
    ZeroPieceLength,
    #[error("Invalid metainfo, pieces length {0} is not a multiple of 20")]
    PiecesLength(usize),
    #[error("Invalid metainfo, expected {expected} piece hashes but found {actual}")]
    PieceCount { expected: usize, actual: usize },
}

/// Peer discovery failed; fatal for the whole run
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid announce URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid tracker response: {0}")]
    Bencode(#[from] BencodeError),
    #[error("Tracker returned failure: {0}")]
    Failure(String),
    #[error("Malformed compact peer list: {0} bytes is not a multiple of 6")]
    MalformedPeers(usize),
}

/// Handshake could not be completed with a peer
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Handshake truncated while reading {field}")]
    Truncated { field: &'static str },
    #[error("Handshake protocol string is empty")]
    EmptyProtocol,
    #[error("Info hash mismatch: us={ours}, peer={theirs}")]
    InfoHashMismatch { ours: String, theirs: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Malformed length-prefixed peer message
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Stream ended inside a frame")]
    Truncated,
    #[error("Frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: u32, max: u32 },
    #[error("Invalid payload length {len} for message ID {id}")]
    InvalidPayload { id: u8, len: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Map an I/O error, turning a short read into [`FrameError::Truncated`]
    pub(crate) fn from_read(e: io::Error) -> FrameError {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => FrameError::Truncated,
            _ => FrameError::Io(e),
        }
    }
}

/// Failure of a single peer session; never escapes the swarm
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unable to establish TCP connection: {0}")]
    Connect(io::Error),
    #[error("Timed out establishing TCP connection")]
    ConnectTimeout,
    #[error("Unable to establish peer protocol: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("Peer message error: {0}")]
    Frame(#[from] FrameError),
    #[error("Timed out waiting for peer")]
    ReadTimeout,
    #[error("Session cancelled")]
    Cancelled,
    #[error("Swarm deadline exceeded")]
    DeadlineExceeded,
    #[error("Session task failed: {0}")]
    Task(String),
}
