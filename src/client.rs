use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::config::Config;
use crate::error::SessionError;
use crate::handshake::Handshake;
use crate::message::{Bitfield, Frame, Message};
use crate::torrent::TorrentMetadata;
use crate::PeerId;

/// Connected peer whose handshake has been verified
///
/// Owns the socket exclusively. The choke state starts as choked and follows every choke or
/// unchoke received; bitfield and have messages are folded into [`Client::bitfield`].
#[derive(Debug)]
pub struct Client<T> {
    socket: T,
    /// Identifier the peer sent in its handshake
    pub remote_peer_id: PeerId,
    /// Whether the peer is currently choking us
    pub choked: bool,
    /// Pieces the peer has announced
    pub bitfield: Option<Bitfield>,
    /// Most recent message received from the peer
    pub last_message: Option<Message>,
    piece_count: usize,
    read_timeout: Duration,
    max_frame_len: u32,
}

/// Run a read under the session's read timeout
async fn bounded<F, O>(limit: Duration, read: F) -> Result<O, SessionError>
where
    F: Future<Output = Result<O, SessionError>>,
{
    tokio::time::timeout(limit, read)
        .await
        .map_err(|_| SessionError::ReadTimeout)?
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send handshake and verify the peer's response
    pub async fn new(
        mut socket: T,
        metadata: &TorrentMetadata,
        config: &Config,
    ) -> Result<Client<T>, SessionError> {
        let ours = Handshake::new(metadata.info_hash, config.peer_id);
        let theirs = bounded(config.read_timeout, async {
            ours.exchange(&mut socket).await.map_err(SessionError::from)
        })
        .await?;
        debug!("Peer handshake verified, remote peer id {}", theirs.peer_id);

        Ok(Client {
            socket,
            remote_peer_id: theirs.peer_id,
            choked: true,
            bitfield: None,
            last_message: None,
            piece_count: metadata.piece_count(),
            read_timeout: config.read_timeout,
            max_frame_len: config.max_frame_len,
        })
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        Frame::from(message).write(&mut self.socket).await?;
        Ok(())
    }

    /// Receive the next message and fold it into the session state
    pub async fn receive(&mut self) -> Result<Message, SessionError> {
        let max_frame_len = self.max_frame_len;
        let socket = &mut self.socket;
        let message = bounded(self.read_timeout, async move {
            Message::deserialise(socket, max_frame_len)
                .await
                .map_err(SessionError::from)
        })
        .await?;

        match &message {
            Message::Choke => self.choked = true,
            Message::Unchoke => self.choked = false,
            Message::Bitfield(bitfield) => self.bitfield = Some(bitfield.clone()),
            Message::Have(index) => {
                let piece_count = self.piece_count;
                let bitfield = self
                    .bitfield
                    .get_or_insert_with(|| Bitfield::with_pieces(piece_count));
                if !bitfield.set_piece(*index as usize) {
                    debug!("Ignoring have for out of range piece {}", index);
                }
            }
            _ => {}
        }
        self.last_message = Some(message.clone());
        Ok(message)
    }

    /// Declare interest and await the peer's reply under the read timeout
    ///
    /// Exactly one message is read and folded into the session state. An unchoke is the
    /// expected reply, but whatever arrives ends the exchange and is left in
    /// [`Client::last_message`].
    pub async fn exchange_interest(&mut self) -> Result<Message, SessionError> {
        self.send(&Message::Interested).await?;
        let reply = self.receive().await?;
        if !matches!(reply, Message::Unchoke) {
            debug!("Peer answered interest with {:?}", reply);
        }
        Ok(reply)
    }

    /// Hand the socket to a later stage of the protocol
    pub fn into_socket(self) -> T {
        self.socket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::{FrameError, HandshakeError};
    use crate::{hex, InfoHash};

    const OUR_PEER_ID: PeerId = PeerId(*b"-ABC123-abcd12345678");
    const REMOTE_PEER_ID: PeerId = PeerId(*b"-DEF123-efgh12345678");

    fn metadata() -> TorrentMetadata {
        let info_hash: InfoHash = std::array::from_fn(|idx| idx as u8);
        TorrentMetadata {
            announce: "http://a.b.org/announce".to_string(),
            name: bytes::Bytes::from_static(b"file"),
            total_length: 640,
            piece_length: 64,
            piece_hashes: vec![[0; 20]; 10],
            info_hash,
        }
    }

    fn config() -> Config {
        Config {
            peer_id: OUR_PEER_ID,
            read_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn return_error_if_incorrect_info_hash_in_handshake_response() {
        let incorrect_info_hash: InfoHash = std::array::from_fn(|idx| idx as u8 + 1);
        let expected_initial_handshake = Handshake::new(metadata().info_hash, OUR_PEER_ID);
        let bad_response_handshake = Handshake::new(incorrect_info_hash, REMOTE_PEER_ID);

        let mock_socket = tokio_test::io::Builder::new()
            .write(&expected_initial_handshake.serialise())
            .read(&bad_response_handshake.serialise())
            .build();
        let res = Client::new(mock_socket, &metadata(), &config()).await;

        let expected_err_msg = format!(
            "Unable to establish peer protocol: Info hash mismatch: us={}, peer={}",
            hex(&metadata().info_hash),
            hex(&incorrect_info_hash),
        );
        assert!(res.is_err_and(|val| val.to_string() == expected_err_msg));
    }

    #[tokio::test]
    async fn interest_exchange_ends_on_unchoke() {
        let initial_handshake = Handshake::new(metadata().info_hash, OUR_PEER_ID);
        let response_handshake = Handshake::new(metadata().info_hash, REMOTE_PEER_ID);
        let mock_socket = tokio_test::io::Builder::new()
            .write(&initial_handshake.serialise())
            .read(&response_handshake.serialise())
            .write(&Message::Interested.serialise())
            .read(&Message::Unchoke.serialise())
            .build();

        let mut client = Client::new(mock_socket, &metadata(), &config())
            .await
            .unwrap();
        assert_eq!(client.remote_peer_id, REMOTE_PEER_ID);
        assert!(client.choked);

        let reply = client.exchange_interest().await.unwrap();
        assert_eq!(reply, Message::Unchoke);
        assert!(!client.choked);
        assert_eq!(client.last_message, Some(Message::Unchoke));
    }

    #[tokio::test]
    async fn interest_exchange_reads_only_one_reply() {
        let initial_handshake = Handshake::new(metadata().info_hash, OUR_PEER_ID);
        let response_handshake = Handshake::new(metadata().info_hash, REMOTE_PEER_ID);
        let mock_socket = tokio_test::io::Builder::new()
            .write(&initial_handshake.serialise())
            .read(&response_handshake.serialise())
            .write(&Message::Interested.serialise())
            .read(&Message::Bitfield(Bitfield::new(vec![0b10000000, 0x00])).serialise())
            .read(&Message::Have(9).serialise())
            .build();

        let mut client = Client::new(mock_socket, &metadata(), &config())
            .await
            .unwrap();
        let reply = client.exchange_interest().await.unwrap();
        assert!(matches!(reply, Message::Bitfield(_)));
        assert!(client.choked);

        // Later messages are still folded in by the caller's own reads
        assert_eq!(client.receive().await.unwrap(), Message::Have(9));
        let bitfield = client.bitfield.as_ref().unwrap();
        assert!(bitfield.has_piece(0));
        assert!(bitfield.has_piece(9));
        assert!(!bitfield.has_piece(1));
    }

    #[tokio::test]
    async fn have_before_bitfield_creates_sized_bitfield() {
        let initial_handshake = Handshake::new(metadata().info_hash, OUR_PEER_ID);
        let response_handshake = Handshake::new(metadata().info_hash, REMOTE_PEER_ID);
        let mock_socket = tokio_test::io::Builder::new()
            .write(&initial_handshake.serialise())
            .read(&response_handshake.serialise())
            .write(&Message::Interested.serialise())
            .read(&Message::Have(3).serialise())
            .build();

        let mut client = Client::new(mock_socket, &metadata(), &config())
            .await
            .unwrap();
        client.exchange_interest().await.unwrap();
        assert!(client.choked);
        assert_eq!(client.last_message, Some(Message::Have(3)));
        assert!(client.bitfield.unwrap().has_piece(3));
    }

    #[tokio::test]
    async fn interest_exchange_returns_while_peer_keeps_sending_keep_alives() {
        let (socket, mut peer) = tokio::io::duplex(1024);
        let info_hash = metadata().info_hash;
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut handshake_buf = [0; 68];
            peer.read_exact(&mut handshake_buf).await.unwrap();
            peer.write_all(&Handshake::new(info_hash, REMOTE_PEER_ID).serialise())
                .await
                .unwrap();
            let mut interested_buf = [0; 5];
            peer.read_exact(&mut interested_buf).await.unwrap();
            while peer.write_all(&Message::KeepAlive.serialise()).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let mut client = Client::new(socket, &metadata(), &config()).await.unwrap();
        let res = tokio::time::timeout(Duration::from_secs(2), client.exchange_interest()).await;
        assert!(matches!(res, Ok(Ok(Message::KeepAlive))));
        assert!(client.choked);
    }

    #[tokio::test]
    async fn return_error_if_stream_closes_during_interest_exchange() {
        let initial_handshake = Handshake::new(metadata().info_hash, OUR_PEER_ID);
        let response_handshake = Handshake::new(metadata().info_hash, REMOTE_PEER_ID);
        let mock_socket = tokio_test::io::Builder::new()
            .write(&initial_handshake.serialise())
            .read(&response_handshake.serialise())
            .write(&Message::Interested.serialise())
            .read(&[0x00, 0x00, 0x00, 0x05, 0x04])
            .build();

        let mut client = Client::new(mock_socket, &metadata(), &config())
            .await
            .unwrap();
        let res = client.exchange_interest().await;
        assert!(matches!(
            res,
            Err(SessionError::Frame(FrameError::Truncated))
        ));
    }

    #[tokio::test]
    async fn return_error_if_peer_handshake_truncated() {
        let initial_handshake = Handshake::new(metadata().info_hash, OUR_PEER_ID);
        let response_handshake = Handshake::new(metadata().info_hash, REMOTE_PEER_ID);
        let mock_socket = tokio_test::io::Builder::new()
            .write(&initial_handshake.serialise())
            .read(&response_handshake.serialise()[..60])
            .build();
        let res = Client::new(mock_socket, &metadata(), &config()).await;
        assert!(matches!(
            res,
            Err(SessionError::Handshake(HandshakeError::Truncated { field: "peer id" }))
        ));
    }

    #[tokio::test]
    async fn return_error_if_peer_never_answers_handshake() {
        let (socket, _peer) = tokio::io::duplex(1024);
        let res = Client::new(socket, &metadata(), &config()).await;
        assert!(matches!(res, Err(SessionError::ReadTimeout)));
    }
}
