use bytes::Bytes;

use crate::error::{BencodeError, MetainfoError};
use crate::metainfo::Metainfo;
use crate::{InfoHash, SHA1_LEN};

/// Validated torrent descriptor, shared read-only by every peer session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// URL of the tracker
    pub announce: String,
    /// Name of the file, raw bytes as found in the metainfo
    pub name: Bytes,
    /// Length of the file in bytes
    pub total_length: u64,
    /// Length of every piece but the last, in bytes
    pub piece_length: u64,
    /// SHA1 hash of each piece, in piece order
    pub piece_hashes: Vec<[u8; SHA1_LEN]>,
    /// SHA1 hash of `info` dict
    pub info_hash: InfoHash,
}

impl TorrentMetadata {
    /// Parse and validate the contents of a metainfo file
    pub fn from_bytes(data: &[u8]) -> Result<TorrentMetadata, MetainfoError> {
        TorrentMetadata::new(Metainfo::new(data)?)
    }

    /// Validate the piece layout and calculate SHA1 hash of `info` dict
    pub fn new(metainfo: Metainfo) -> Result<TorrentMetadata, MetainfoError> {
        let info = &metainfo.info;
        if info.piece_length == 0 {
            return Err(MetainfoError::ZeroPieceLength);
        }
        if info.pieces.len() % SHA1_LEN != 0 {
            return Err(MetainfoError::PiecesLength(info.pieces.len()));
        }

        let piece_hashes = info
            .pieces()
            .map(|chunk| {
                let mut hash = [0; SHA1_LEN];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect::<Vec<_>>();
        let expected = info.length.div_ceil(info.piece_length);
        if piece_hashes.len() as u64 != expected {
            return Err(MetainfoError::PieceCount {
                expected: expected as usize,
                actual: piece_hashes.len(),
            });
        }

        let info_hash = info
            .hash()
            .map_err(|e| MetainfoError::Bencode(BencodeError::Mapping(e)))?;

        Ok(TorrentMetadata {
            announce: metainfo.announce,
            name: metainfo.info.name,
            total_length: metainfo.info.length,
            piece_length: metainfo.info.piece_length,
            piece_hashes,
            info_hash,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

}
