// Path: crates/api/src/transport.rs
//! The gossip transport collaborator.
//!
//! The real P2P service lives outside the core; the core only assumes framed
//! message delivery with two priorities. Frames are `[type: 1 byte]
//! [length: 4 bytes big-endian][payload]`.

use kaon_types::error::TransportError;
use tokio::sync::mpsc;

/// Delivery priority of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Head-of-line delivery: new blocks and locally admitted transactions.
    Urgent,
    /// Everything else.
    Normal,
}

/// The 1-byte wire type of a gossip message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// A full, freshly produced block.
    NewBlock = 1,
    /// The head hash of a newly produced block.
    NewBlockHash = 2,
    /// A peer's current chain height announcement.
    SyncHeight = 3,
    /// A request for block hashes in a number range.
    BlockHashQuery = 4,
    /// A response listing block hashes for a queried range.
    BlockHashResponse = 5,
    /// A request for one full block by head hash.
    BlockRequest = 6,
    /// A gossiped transaction.
    Tx = 7,
}

impl MessageType {
    /// Decodes the wire byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::NewBlock,
            2 => Self::NewBlockHash,
            3 => Self::SyncHeight,
            4 => Self::BlockHashQuery,
            5 => Self::BlockHashResponse,
            6 => Self::BlockRequest,
            7 => Self::Tx,
            _ => return None,
        })
    }
}

/// An inbound gossip message, tagged with the peer that delivered it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// The delivering peer's identity string.
    pub from: String,
    /// The message type.
    pub mtype: MessageType,
    /// The opaque payload (canonically encoded by the sender).
    pub payload: Vec<u8>,
}

/// The outbound half of the gossip collaborator.
pub trait Transport: Send + Sync {
    /// Broadcasts a message to all connected peers.
    fn broadcast(
        &self,
        mtype: MessageType,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), TransportError>;

    /// Sends a message to one peer.
    fn send(
        &self,
        peer: &str,
        mtype: MessageType,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), TransportError>;

    /// The peers currently considered connected and healthy.
    fn peers(&self) -> Vec<String>;
}

/// Encodes a frame: type byte, big-endian u32 length, payload.
pub fn encode_frame(mtype: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + payload.len());
    out.push(mtype as u8);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decodes a frame produced by [`encode_frame`]. Returns the message type,
/// the payload, and the number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Option<(MessageType, &[u8], usize)> {
    if buf.len() < 5 {
        return None;
    }
    let mtype = MessageType::from_byte(buf[0])?;
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let total = 5 + len;
    if buf.len() < total {
        return None;
    }
    Some((mtype, &buf[5..total], total))
}

/// An in-process transport that loops every broadcast back into a channel.
/// Backs single-process wiring and multi-node simulation tests.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(MessageType, Vec<u8>, Priority)>,
    peer_ids: Vec<String>,
}

impl ChannelTransport {
    /// Creates the transport and the receiving end of its loopback channel.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<(MessageType, Vec<u8>, Priority)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                peer_ids: Vec::new(),
            },
            rx,
        )
    }

    /// Sets the peer list reported by `peers()`.
    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peer_ids = peers;
        self
    }
}

impl Transport for ChannelTransport {
    fn broadcast(
        &self,
        mtype: MessageType,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), TransportError> {
        self.tx
            .send((mtype, payload, priority))
            .map_err(|_| TransportError::ChannelFull)
    }

    fn send(
        &self,
        _peer: &str,
        mtype: MessageType,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), TransportError> {
        self.broadcast(mtype, payload, priority)
    }

    fn peers(&self) -> Vec<String> {
        self.peer_ids.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let payload = b"hello kaon".to_vec();
        let frame = encode_frame(MessageType::NewBlock, &payload);
        let (mtype, got, consumed) = decode_frame(&frame).unwrap();
        assert_eq!(mtype, MessageType::NewBlock);
        assert_eq!(got, payload.as_slice());
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn frame_rejects_short_or_unknown() {
        assert!(decode_frame(&[1, 0, 0]).is_none());
        let bad_type = encode_frame(MessageType::Tx, b"x");
        let mut bad = bad_type.clone();
        bad[0] = 0xEE;
        assert!(decode_frame(&bad).is_none());
        // Truncated payload.
        assert!(decode_frame(&bad_type[..bad_type.len() - 1]).is_none());
    }

    #[tokio::test]
    async fn channel_transport_loops_back() {
        let (transport, mut rx) = ChannelTransport::new();
        transport
            .broadcast(MessageType::Tx, vec![1, 2, 3], Priority::Urgent)
            .unwrap();
        let (mtype, payload, priority) = rx.recv().await.unwrap();
        assert_eq!(mtype, MessageType::Tx);
        assert_eq!(payload, vec![1, 2, 3]);
        assert_eq!(priority, Priority::Urgent);
    }
}
