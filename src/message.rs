use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

const BITS_IN_BYTE: usize = 8;

const CHOKE_ID: u8 = 0x00;
const UNCHOKE_ID: u8 = 0x01;
const INTERESTED_ID: u8 = 0x02;
const NOT_INTERESTED_ID: u8 = 0x03;
const HAVE_ID: u8 = 0x04;
const BITFIELD_ID: u8 = 0x05;
const REQUEST_ID: u8 = 0x06;
const PIECE_ID: u8 = 0x07;
const CANCEL_ID: u8 = 0x08;

/// Wrapper type for bitfield message payload
///
/// Bit 7 of byte 0 is piece 0; indices past the end of the payload are never set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    data: Vec<u8>,
}

impl Bitfield {
    /// Create instance from bitfield message payload
    pub fn new(data: Vec<u8>) -> Bitfield {
        Bitfield { data }
    }

    /// Empty bitfield able to hold `pieces` entries
    pub fn with_pieces(pieces: usize) -> Bitfield {
        Bitfield {
            data: vec![0; pieces.div_ceil(BITS_IN_BYTE)],
        }
    }

    /// Check if the bitfield contains the piece with the given index
    pub fn has_piece(&self, idx: usize) -> bool {
        let offset = idx % BITS_IN_BYTE;
        match self.data.get(idx / BITS_IN_BYTE) {
            Some(byte) => (byte >> (BITS_IN_BYTE - 1 - offset)) & 1 == 1,
            None => false,
        }
    }

    /// Set the bit that corresponds to the given piece index; `false` if out of range
    pub fn set_piece(&mut self, idx: usize) -> bool {
        let offset = idx % BITS_IN_BYTE;
        match self.data.get_mut(idx / BITS_IN_BYTE) {
            Some(byte) => {
                *byte |= 1 << (BITS_IN_BYTE - 1 - offset);
                true
            }
            None => false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Length-prefixed unit of the peer wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Zero length prefix, no id or payload
    KeepAlive,
    Message { id: u8, payload: Bytes },
}

impl Frame {
    /// Read one frame; the length prefix may not exceed `max_len`
    pub async fn read<R>(reader: &mut R, max_len: u32) -> Result<Frame, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let len = reader.read_u32().await.map_err(FrameError::from_read)?;
        if len == 0 {
            return Ok(Frame::KeepAlive);
        }
        if len > max_len {
            return Err(FrameError::TooLarge { len, max: max_len });
        }

        let id = reader.read_u8().await.map_err(FrameError::from_read)?;
        let mut payload = vec![0; len as usize - 1];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(FrameError::from_read)?;
        Ok(Frame::Message {
            id,
            payload: Bytes::from(payload),
        })
    }

    /// Serialise frame to raw bytes, length prefix first
    pub fn serialise(&self) -> Vec<u8> {
        match self {
            Frame::KeepAlive => u32::to_be_bytes(0).to_vec(),
            Frame::Message { id, payload } => {
                let mut buf = BytesMut::with_capacity(5 + payload.len());
                buf.put_u32(1 + payload.len() as u32);
                buf.put_u8(*id);
                buf.put_slice(payload);
                buf.to_vec()
            }
        }
    }

    pub async fn write<W>(&self, writer: &mut W) -> Result<(), FrameError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.serialise()).await?;
        Ok(())
    }
}

/// Peer message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    /// Index of piece the sender has completed and checked the hash of
    Have(u32),
    /// Describes which pieces (by index) the sender has
    Bitfield(Bitfield),
    /// Request a subset of a piece (a block)
    Request { index: u32, begin: u32, length: u32 },
    /// Send a subset of a piece (a block)
    Piece { index: u32, begin: u32, block: Bytes },
    /// Cancel a request for a block
    Cancel { index: u32, begin: u32, length: u32 },
    /// Message ID this client does not interpret
    Unknown { id: u8, payload: Bytes },
}

/// Big-endian u32 words of a fixed-size payload
fn words<const N: usize>(id: u8, payload: &[u8]) -> Result<[u32; N], FrameError> {
    if payload.len() != N * 4 {
        return Err(FrameError::InvalidPayload {
            id,
            len: payload.len(),
        });
    }
    let mut words = [0; N];
    for (word, chunk) in words.iter_mut().zip(payload.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(words)
}

fn empty(id: u8, payload: &[u8], message: Message) -> Result<Message, FrameError> {
    if !payload.is_empty() {
        return Err(FrameError::InvalidPayload {
            id,
            len: payload.len(),
        });
    }
    Ok(message)
}

impl TryFrom<Frame> for Message {
    type Error = FrameError;

    fn try_from(frame: Frame) -> Result<Message, FrameError> {
        let (id, payload) = match frame {
            Frame::KeepAlive => return Ok(Message::KeepAlive),
            Frame::Message { id, payload } => (id, payload),
        };

        match id {
            CHOKE_ID => empty(id, &payload, Message::Choke),
            UNCHOKE_ID => empty(id, &payload, Message::Unchoke),
            INTERESTED_ID => empty(id, &payload, Message::Interested),
            NOT_INTERESTED_ID => empty(id, &payload, Message::NotInterested),
            HAVE_ID => {
                let [index] = words::<1>(id, &payload)?;
                Ok(Message::Have(index))
            }
            BITFIELD_ID => Ok(Message::Bitfield(Bitfield::new(payload.to_vec()))),
            REQUEST_ID => {
                let [index, begin, length] = words::<3>(id, &payload)?;
                Ok(Message::Request {
                    index,
                    begin,
                    length,
                })
            }
            PIECE_ID => {
                if payload.len() < 8 {
                    return Err(FrameError::InvalidPayload {
                        id,
                        len: payload.len(),
                    });
                }
                let [index, begin] = words::<2>(id, &payload[..8])?;
                Ok(Message::Piece {
                    index,
                    begin,
                    block: payload.slice(8..),
                })
            }
            CANCEL_ID => {
                let [index, begin, length] = words::<3>(id, &payload)?;
                Ok(Message::Cancel {
                    index,
                    begin,
                    length,
                })
            }
            _ => Ok(Message::Unknown { id, payload }),
        }
    }
}

fn message_frame(id: u8, words: &[u32], tail: &[u8]) -> Frame {
    let mut payload = BytesMut::with_capacity(words.len() * 4 + tail.len());
    for word in words {
        payload.put_u32(*word);
    }
    payload.put_slice(tail);
    Frame::Message {
        id,
        payload: payload.freeze(),
    }
}

impl From<&Message> for Frame {
    fn from(message: &Message) -> Frame {
        match message {
            Message::KeepAlive => Frame::KeepAlive,
            Message::Choke => message_frame(CHOKE_ID, &[], &[]),
            Message::Unchoke => message_frame(UNCHOKE_ID, &[], &[]),
            Message::Interested => message_frame(INTERESTED_ID, &[], &[]),
            Message::NotInterested => message_frame(NOT_INTERESTED_ID, &[], &[]),
            Message::Have(index) => message_frame(HAVE_ID, &[*index], &[]),
            Message::Bitfield(bitfield) => message_frame(BITFIELD_ID, &[], bitfield.as_bytes()),
            Message::Request {
                index,
                begin,
                length,
            } => message_frame(REQUEST_ID, &[*index, *begin, *length], &[]),
            Message::Piece {
                index,
                begin,
                block,
            } => message_frame(PIECE_ID, &[*index, *begin], block),
            Message::Cancel {
                index,
                begin,
                length,
            } => message_frame(CANCEL_ID, &[*index, *begin, *length], &[]),
            Message::Unknown { id, payload } => Frame::Message {
                id: *id,
                payload: payload.clone(),
            },
        }
    }
}

impl Message {
    /// Read one frame from the socket and interpret it as a [`Message`]
    pub async fn deserialise<R>(reader: &mut R, max_len: u32) -> Result<Message, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        Message::try_from(Frame::read(reader, max_len).await?)
    }

    /// Serialise [`Message`] to raw bytes
    pub fn serialise(&self) -> Vec<u8> {
        Frame::from(self).serialise()
    }
}
