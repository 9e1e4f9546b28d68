use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HandshakeError;
use crate::{hex, InfoHash, PeerId, PSTR, SHA1_LEN};

const RESERVED_LEN: usize = 8;

/// BitTorrent handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier
    pub pstr: Bytes,
    /// Extension bits, all zero when we send
    pub reserved: [u8; RESERVED_LEN],
    /// SHA1 hash of bencoded `info` dict of file
    pub info_hash: InfoHash,
    /// Identifier of peer
    pub peer_id: PeerId,
}

/// Read exactly `buf.len()` bytes, reporting a short read against `field`
async fn read_field<R>(reader: &mut R, buf: &mut [u8], field: &'static str) -> Result<(), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(HandshakeError::Truncated { field }),
        Err(e) => Err(HandshakeError::Io(e)),
    }
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Handshake {
        Handshake {
            pstr: Bytes::from_static(PSTR.as_bytes()),
            reserved: [0; RESERVED_LEN],
            info_hash,
            peer_id,
        }
    }

    /// Serialise handshake data
    pub fn serialise(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(49 + self.pstr.len());
        output.push(self.pstr.len() as u8);
        output.extend_from_slice(&self.pstr);
        output.extend_from_slice(&self.reserved);
        output.extend_from_slice(&self.info_hash);
        output.extend_from_slice(self.peer_id.as_bytes());
        output
    }

    /// Read a handshake field by field, each field with an exact read
    pub async fn read<R>(reader: &mut R) -> Result<Handshake, HandshakeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut pstr_len = [0; 1];
        read_field(reader, &mut pstr_len, "protocol length").await?;
        if pstr_len[0] == 0 {
            return Err(HandshakeError::EmptyProtocol);
        }
        let mut pstr = vec![0; pstr_len[0] as usize];
        read_field(reader, &mut pstr, "protocol").await?;
        let mut reserved = [0; RESERVED_LEN];
        read_field(reader, &mut reserved, "reserved bytes").await?;
        let mut info_hash = [0; SHA1_LEN];
        read_field(reader, &mut info_hash, "info hash").await?;
        let mut peer_id = [0; 20];
        read_field(reader, &mut peer_id, "peer id").await?;

        Ok(Handshake {
            pstr: Bytes::from(pstr),
            reserved,
            info_hash,
            peer_id: PeerId(peer_id),
        })
    }

    /// Check the peer is serving the same torrent
    pub fn verify(&self, info_hash: &InfoHash) -> Result<(), HandshakeError> {
        if &self.info_hash != info_hash {
            return Err(HandshakeError::InfoHashMismatch {
                ours: hex(info_hash),
                theirs: hex(&self.info_hash),
            });
        }
        Ok(())
    }

    /// Send our handshake, then read and verify the peer's
    ///
    /// The returned handshake has already been verified against ours; any error leaves the
    /// session rejected.
    pub async fn exchange<S>(&self, socket: &mut S) -> Result<Handshake, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        socket.write_all(&self.serialise()).await?;
        let theirs = Handshake::read(socket).await?;
        theirs.verify(&self.info_hash)?;
        Ok(theirs)
    }
}
